//! Materials

use crate::error::SceneError;
use crate::object::*;
use rcore::geometry::Vector3f;
use rcore::math::Float;
use rcore::spectrum::Spectrum;

/// Default refractive index of `glass`.
pub const GLASS_INDEX: Float = 1.52;

/// Material parameters derived from a material record.
#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    Plastic {
        color: Spectrum,
        specularity: Float,
        roughness: Float,
    },
    Metal {
        color: Spectrum,
        specularity: Float,
        roughness: Float,
    },
    Trans {
        color: Spectrum,
        specularity: Float,
        roughness: Float,
        transmissivity: Float,
        trans_specular: Float,
    },
    Glass {
        transmission: Spectrum,
        index: Float,
    },
    Mirror {
        color: Spectrum,
    },
    Light {
        color: Spectrum,
    },
    Glow {
        color: Spectrum,
        max_radius: Float,
    },
    Illum {
        color: Spectrum,
    },
    /// Data driven material. The BSDF is loaded from `path` and oriented
    /// with `up`.
    ABsdf {
        path: String,
        up: Vector3f,
        diffuse: Spectrum,
    },
}

impl Material {
    /// Build the material for a material record. Returns `None` for surfaces.
    ///
    /// * `rec` - The record.
    pub fn from_record(rec: &ObjectRecord) -> Result<Option<Self>, SceneError> {
        let a = &rec.rargs;
        let rgb = |i: usize| Spectrum::rgb(a[i], a[i + 1], a[i + 2]);

        let m = match rec.kind {
            ObjectKind::Plastic => Self::Plastic {
                color: rgb(0),
                specularity: a[3],
                roughness: a[4],
            },
            ObjectKind::Metal => Self::Metal {
                color: rgb(0),
                specularity: a[3],
                roughness: a[4],
            },
            ObjectKind::Trans => Self::Trans {
                color: rgb(0),
                specularity: a[3],
                roughness: a[4],
                transmissivity: a[5],
                trans_specular: a[6],
            },
            ObjectKind::Glass => Self::Glass {
                transmission: rgb(0),
                index: a.get(3).copied().unwrap_or(GLASS_INDEX),
            },
            ObjectKind::Mirror => Self::Mirror { color: rgb(0) },
            ObjectKind::Light => Self::Light { color: rgb(0) },
            ObjectKind::Glow => Self::Glow {
                color: rgb(0),
                max_radius: a[3],
            },
            ObjectKind::Illum => Self::Illum { color: rgb(0) },
            ObjectKind::ABsdf => {
                let up = if rec.sargs.len() == 4 {
                    let mut v = [0.0; 3];
                    for (i, s) in rec.sargs[1..].iter().enumerate() {
                        v[i] = s.parse::<Float>().map_err(|_| SceneError::BadArguments {
                            id: rec.name.clone(),
                            kind: rec.kind,
                            reason: format!("up vector component '{}' is not a number", s),
                        })?;
                    }
                    Vector3f::from(v)
                } else {
                    Vector3f::new(0.0, 0.0, 1.0)
                };
                Self::ABsdf {
                    path: rec.sargs[0].clone(),
                    up,
                    diffuse: if a.len() >= 3 { rgb(0) } else { Spectrum::ZERO },
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(m))
    }

    /// Returns the emitted radiance for emitting materials.
    pub fn emission(&self) -> Option<Spectrum> {
        match self {
            Self::Light { color } | Self::Glow { color, .. } | Self::Illum { color } => Some(*color),
            _ => None,
        }
    }

    /// Returns true for materials whose surfaces are sampled by shadow rays.
    pub fn is_light_source(&self) -> bool {
        matches!(self, Self::Light { .. } | Self::Illum { .. })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
