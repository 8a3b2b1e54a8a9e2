//! Object Records

use crate::error::SceneError;
use rcore::math::Float;
use std::fmt;

/// Index of an object record in its scene.
pub type ObjId = u32;

/// The closed set of primitive kinds. The discriminant is the type tag stored
/// in octree files.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectKind {
    Sphere = 1,
    Bubble = 2,
    Polygon = 3,
    Ring = 4,
    Cylinder = 5,
    Tube = 6,
    Source = 7,
    Plastic = 16,
    Metal = 17,
    Trans = 18,
    Glass = 19,
    Mirror = 20,
    Light = 21,
    Glow = 22,
    Illum = 23,
    ABsdf = 24,
}

/// All kinds, in tag order.
pub const OBJECT_KINDS: [ObjectKind; 16] = [
    ObjectKind::Sphere,
    ObjectKind::Bubble,
    ObjectKind::Polygon,
    ObjectKind::Ring,
    ObjectKind::Cylinder,
    ObjectKind::Tube,
    ObjectKind::Source,
    ObjectKind::Plastic,
    ObjectKind::Metal,
    ObjectKind::Trans,
    ObjectKind::Glass,
    ObjectKind::Mirror,
    ObjectKind::Light,
    ObjectKind::Glow,
    ObjectKind::Illum,
    ObjectKind::ABsdf,
];

impl ObjectKind {
    /// Returns the type tag.
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Returns the kind for a type tag.
    ///
    /// * `tag` - The type tag.
    pub fn from_tag(tag: u8) -> Result<Self, SceneError> {
        OBJECT_KINDS
            .iter()
            .find(|k| k.tag() == tag)
            .copied()
            .ok_or(SceneError::UnknownTag(tag))
    }

    /// Returns the kind for a scene description keyword.
    ///
    /// * `name` - The keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        OBJECT_KINDS.iter().find(|k| k.name() == name).copied()
    }

    /// Returns the scene description keyword.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sphere => "sphere",
            Self::Bubble => "bubble",
            Self::Polygon => "polygon",
            Self::Ring => "ring",
            Self::Cylinder => "cylinder",
            Self::Tube => "tube",
            Self::Source => "source",
            Self::Plastic => "plastic",
            Self::Metal => "metal",
            Self::Trans => "trans",
            Self::Glass => "glass",
            Self::Mirror => "mirror",
            Self::Light => "light",
            Self::Glow => "glow",
            Self::Illum => "illum",
            Self::ABsdf => "aBSDF",
        }
    }

    /// Returns true for geometric surfaces, including distant sources.
    pub fn is_surface(&self) -> bool {
        self.tag() < 16
    }

    /// Returns true for materials.
    pub fn is_material(&self) -> bool {
        !self.is_surface()
    }

    /// Returns true for materials that emit light.
    pub fn is_emitter(&self) -> bool {
        matches!(self, Self::Light | Self::Glow | Self::Illum)
    }

    /// Validates argument counts.
    ///
    /// * `id`    - Identifier used in error messages.
    /// * `sargs` - String arguments.
    /// * `rargs` - Real arguments.
    pub fn check_args(&self, id: &str, sargs: &[String], rargs: &[Float]) -> Result<(), SceneError> {
        let (s_ok, r_ok, expect) = match self {
            Self::Sphere | Self::Bubble => (sargs.is_empty(), rargs.len() == 4, "0 strings, 4 reals"),
            Self::Polygon => (
                sargs.is_empty(),
                rargs.len() >= 9 && rargs.len() % 3 == 0,
                "0 strings, 3n reals with n >= 3",
            ),
            Self::Ring => (sargs.is_empty(), rargs.len() == 8, "0 strings, 8 reals"),
            Self::Cylinder | Self::Tube => (sargs.is_empty(), rargs.len() == 7, "0 strings, 7 reals"),
            Self::Source => (sargs.is_empty(), rargs.len() == 4, "0 strings, 4 reals"),
            Self::Plastic | Self::Metal => (sargs.is_empty(), rargs.len() == 5, "0 strings, 5 reals"),
            Self::Trans => (sargs.is_empty(), rargs.len() == 7, "0 strings, 7 reals"),
            Self::Glass => (
                sargs.is_empty(),
                rargs.len() == 3 || rargs.len() == 4,
                "0 strings, 3 or 4 reals",
            ),
            Self::Mirror | Self::Illum => (sargs.len() <= 1, rargs.len() == 3, "0 or 1 strings, 3 reals"),
            Self::Light => (sargs.is_empty(), rargs.len() == 3, "0 strings, 3 reals"),
            Self::Glow => (sargs.is_empty(), rargs.len() == 4, "0 strings, 4 reals"),
            Self::ABsdf => (
                sargs.len() == 1 || sargs.len() == 4,
                matches!(rargs.len(), 0 | 3 | 6 | 9),
                "1 or 4 strings, 0, 3, 6 or 9 reals",
            ),
        };

        if !s_ok || !r_ok {
            return Err(SceneError::BadArguments {
                id: id.to_string(),
                kind: *self,
                reason: format!(
                    "expected {}, got {} strings and {} reals",
                    expect,
                    sargs.len(),
                    rargs.len()
                ),
            });
        }
        if let Some(v) = rargs.iter().find(|v| !v.is_finite()) {
            return Err(SceneError::BadArguments {
                id: id.to_string(),
                kind: *self,
                reason: format!("non-finite argument {}", v),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One scene object: a surface or a material.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRecord {
    /// Index of the record in its scene.
    pub id: ObjId,

    /// The modifier or `None` for `void`.
    pub modifier: Option<ObjId>,

    /// Primitive kind.
    pub kind: ObjectKind,

    /// Identifier.
    pub name: String,

    /// String arguments.
    pub sargs: Vec<String>,

    /// Real arguments.
    pub rargs: Vec<Float>,
}

impl ObjectRecord {
    /// Create a new object record after validating its arguments.
    ///
    /// * `id`       - Index of the record in its scene.
    /// * `modifier` - The modifier or `None` for `void`.
    /// * `kind`     - Primitive kind.
    /// * `name`     - Identifier.
    /// * `sargs`    - String arguments.
    /// * `rargs`    - Real arguments.
    pub fn new(
        id: ObjId,
        modifier: Option<ObjId>,
        kind: ObjectKind,
        name: &str,
        sargs: Vec<String>,
        rargs: Vec<Float>,
    ) -> Result<Self, SceneError> {
        kind.check_args(name, &sargs, &rargs)?;
        Ok(Self {
            id,
            modifier,
            kind,
            name: name.to_string(),
            sargs,
            rargs,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_and_names_are_bijective() {
        for kind in OBJECT_KINDS.iter() {
            assert_eq!(ObjectKind::from_tag(kind.tag()).unwrap(), *kind);
            assert_eq!(ObjectKind::from_name(kind.name()), Some(*kind));
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        for tag in [0_u8, 8, 15, 25, 255] {
            assert!(matches!(ObjectKind::from_tag(tag), Err(SceneError::UnknownTag(t)) if t == tag));
        }
        assert_eq!(ObjectKind::from_name("mesh"), None);
    }

    #[test]
    fn argument_counts_are_checked() {
        assert!(ObjectRecord::new(0, None, ObjectKind::Sphere, "ball", vec![], vec![0.0; 4]).is_ok());
        assert!(ObjectRecord::new(0, None, ObjectKind::Sphere, "ball", vec![], vec![0.0; 3]).is_err());
        assert!(ObjectRecord::new(0, None, ObjectKind::Polygon, "quad", vec![], vec![0.0; 12]).is_ok());
        assert!(ObjectRecord::new(0, None, ObjectKind::Polygon, "bad", vec![], vec![0.0; 6]).is_err());
        assert!(ObjectRecord::new(0, None, ObjectKind::Light, "l", vec![], vec![1.0, Float::NAN, 1.0]).is_err());
    }

    #[test]
    fn surfaces_and_materials_are_disjoint() {
        for kind in OBJECT_KINDS.iter() {
            assert_ne!(kind.is_surface(), kind.is_material());
        }
        assert!(ObjectKind::Glow.is_emitter());
        assert!(!ObjectKind::Mirror.is_emitter());
    }
}
