//! BSDF Data

use crate::error::BsdfError;
use crate::fourier::*;
use crate::klems::*;
use bitflags::bitflags;
use rcore::binio::*;
use rcore::geometry::Vector3f;
use rcore::math::*;
use rcore::rng::{RNG, ONE_MINUS_EPSILON};
use rcore::spectrum::Spectrum;
use std::io::{BufReader, Read};

bitflags! {
    /// Selects the parts of a BSDF for hemispherical queries and sampling.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct SampleFlags: u8 {
        /// Scattering back into the incident hemisphere.
        const REFLECT = 0b0001;

        /// Scattering through the surface.
        const TRANSMIT = 0b0010;

        /// The Lambertian part.
        const DIFFUSE = 0b0100;

        /// The non-diffuse (tabulated) part.
        const SPECULAR = 0b1000;
    }
}

/// Tabulated scattering data.
#[derive(Clone, Debug, PartialEq)]
pub enum BsdfModel {
    /// Klems matrices with Lambertian parts per component in `COMPONENTS`
    /// order.
    Klems {
        bsdf: KlemsBsdf,
        lambertian: [Spectrum; 4],
    },

    /// Fourier series over zenith cosine pairs.
    Fourier(FourierTable),
}

/// Loaded BSDF, immutable after load.
#[derive(Clone, Debug, PartialEq)]
pub struct BsdfData {
    /// Name of the source, usually its path.
    pub name: String,

    /// The data.
    pub model: BsdfModel,
}

/// Part of a BSDF selected for sampling.
#[derive(Copy, Clone, Debug)]
enum Lobe {
    Diffuse(Component),
    Matrix(Component),
    Grid(bool),
}

impl BsdfData {
    /// Create from a model.
    ///
    /// * `name`  - Name of the source.
    /// * `model` - The data.
    pub fn new(name: &str, model: BsdfModel) -> Self {
        Self {
            name: name.to_owned(),
            model,
        }
    }

    /// Load a BSDF file, dispatching on its 8-byte header.
    ///
    /// * `path` - Path to the file.
    pub fn load(path: &str) -> Result<Self, BsdfError> {
        let file = open_file(path)?;
        let data = Self::read(&mut BufReader::new(file), path)?;
        info!("Loaded BSDF '{}' ({})", path, data.basis_name());
        Ok(data)
    }

    /// Read BSDF data from a stream.
    ///
    /// * `r`    - The input.
    /// * `name` - Name of the source.
    pub fn read<R: Read>(r: &mut R, name: &str) -> Result<Self, BsdfError> {
        let mut magic = [0_u8; 8];
        r.read_exact(&mut magic).map_err(BinaryError::from)?;

        let model = if &magic == KLEMS_MAGIC {
            let (bsdf, lambertian) = KlemsBsdf::read(r)?;
            BsdfModel::Klems { bsdf, lambertian }
        } else if &magic == FOURIER_MAGIC {
            BsdfModel::Fourier(FourierTable::read(r)?)
        } else {
            return Err(BsdfError::UnknownFormat(String::from_utf8_lossy(&magic).into_owned()));
        };
        Ok(Self::new(name, model))
    }

    /// Returns a short description of the basis.
    pub fn basis_name(&self) -> String {
        match &self.model {
            BsdfModel::Klems { bsdf, .. } => format!("Klems {:?}, {} channels", bsdf.basis, bsdf.channels),
            BsdfModel::Fourier(t) => format!("Fourier, {} nodes, {} channels", t.mu.len(), t.n_channels),
        }
    }

    /// Returns the BSDF value (1/sr) between two directions, both pointing
    /// away from the surface. Invalid directions give zero.
    ///
    /// * `vin`  - Incident direction.
    /// * `vout` - Outgoing direction.
    pub fn query(&self, vin: &Vector3f, vout: &Vector3f) -> Spectrum {
        let (vin, vout) = match (valid_direction(vin), valid_direction(vout)) {
            (Some(vin), Some(vout)) => (vin, vout),
            _ => return Spectrum::ZERO,
        };
        match &self.model {
            BsdfModel::Klems { bsdf, lambertian } => {
                let c = Component::between(&vin, &vout);
                bsdf.eval(&vin, &vout) + lambertian[c as usize] * INV_PI
            }
            BsdfModel::Fourier(t) => t.eval(&vin, &vout),
        }
    }

    /// Returns the BSDF value between two directions given in degrees.
    ///
    /// * `theta_in`  - Incident zenith angle.
    /// * `phi_in`    - Incident azimuth.
    /// * `theta_out` - Outgoing zenith angle.
    /// * `phi_out`   - Outgoing azimuth.
    pub fn query_deg(&self, theta_in: Float, phi_in: Float, theta_out: Float, phi_out: Float) -> Spectrum {
        self.query(&vec_from_deg(theta_in, phi_in), &vec_from_deg(theta_out, phi_out))
    }

    /// Returns the directional-hemispherical reflectance and/or transmittance
    /// for light arriving from `vin`.
    ///
    /// * `vin`   - Incident direction.
    /// * `flags` - Parts to include.
    pub fn direct_hemi(&self, vin: &Vector3f, flags: SampleFlags) -> Spectrum {
        match valid_direction(vin) {
            Some(vin) => self
                .lobes(&vin, flags)
                .iter()
                .fold(Spectrum::ZERO, |acc, (_, v)| acc + *v),
            None => Spectrum::ZERO,
        }
    }

    /// Returns `n` scattered directions, stratified over the selected parts.
    /// Each direction carries the total scattered value of those parts.
    ///
    /// * `vin`   - Incident direction.
    /// * `n`     - Number of samples.
    /// * `flags` - Parts to include.
    /// * `rng`   - Random number generator.
    pub fn sample(&self, vin: &Vector3f, n: usize, flags: SampleFlags, rng: &mut RNG) -> Vec<(Vector3f, Spectrum)> {
        let vin = match valid_direction(vin) {
            Some(v) => v,
            None => return vec![],
        };
        let lobes = self.lobes(&vin, flags);
        let total = lobes.iter().fold(Spectrum::ZERO, |acc, (_, v)| acc + *v);
        let weights: Vec<Float> = lobes.iter().map(|(_, v)| max(0.0, v.y())).collect();
        let weight_sum: Float = weights.iter().sum();
        if weight_sum <= 0.0 {
            return vec![];
        }

        let mut samples = Vec::with_capacity(n);
        for i in 0..n {
            let u = min((i as Float + rng.uniform_float()) / n as Float, ONE_MINUS_EPSILON) * weight_sum;

            // Pick a lobe and rescale `u` within it.
            let mut acc = 0.0;
            let mut pick = (lobes.len() - 1, 0.0);
            for (k, w) in weights.iter().enumerate() {
                if *w > 0.0 && u < acc + w {
                    pick = (k, (u - acc) / w);
                    break;
                }
                acc += w;
            }

            let uv = (rng.uniform_float(), rng.uniform_float());
            if let Some(d) = self.sample_lobe(&vin, lobes[pick.0].0, pick.1, uv) {
                samples.push((d, total));
            }
        }
        samples
    }

    /// Returns the minimum and maximum projected solid angle resolved by the
    /// data around a direction, or `None` for an invalid direction.
    ///
    /// * `v` - Unit direction.
    pub fn proj_solid_angle(&self, v: &Vector3f) -> Option<(Float, Float)> {
        let v = valid_direction(v)?;
        match &self.model {
            BsdfModel::Klems { bsdf, .. } => {
                let psa = bsdf.proj_solid_angle(&v);
                Some((psa, psa))
            }
            BsdfModel::Fourier(t) => {
                // Ring between the nodes enclosing the zenith cosine, divided
                // azimuthally by the series order.
                let mu = clamp(v.z, t.mu[0], t.mu[t.mu.len() - 1]);
                let i = find_interval(t.mu.len(), |k| t.mu[k] <= mu);
                let (m0, m1) = (t.mu[i], t.mu[i + 1]);
                let ring = PI * abs(m1 * m1 - m0 * m0);
                Some((ring / max(t.m_max, 1) as Float, ring))
            }
        }
    }

    /// Returns the selected parts for light arriving from `vin` with their
    /// hemispherical values.
    fn lobes(&self, vin: &Vector3f, flags: SampleFlags) -> Vec<(Lobe, Spectrum)> {
        let front = vin.z > 0.0;
        let mut lobes = vec![];
        for (sel, transmit) in [(SampleFlags::REFLECT, false), (SampleFlags::TRANSMIT, true)] {
            if !flags.contains(sel) {
                continue;
            }
            match &self.model {
                BsdfModel::Klems { bsdf, lambertian } => {
                    let c = Component::of(front, transmit);
                    if flags.contains(SampleFlags::DIFFUSE) && !lambertian[c as usize].is_black() {
                        lobes.push((Lobe::Diffuse(c), lambertian[c as usize]));
                    }
                    if flags.contains(SampleFlags::SPECULAR) && bsdf.has(c) {
                        lobes.push((Lobe::Matrix(c), bsdf.hemi(vin, c)));
                    }
                }
                BsdfModel::Fourier(t) => {
                    if flags.contains(SampleFlags::SPECULAR) {
                        let out_front = front != transmit;
                        let hemi = (0..GRID.size()).fold(Spectrum::ZERO, |acc, p| {
                            acc + t.eval(vin, &grid_direction(p, out_front, (0.5, 0.5))) * GRID.proj_solid_angle(p)
                        });
                        lobes.push((Lobe::Grid(transmit), hemi));
                    }
                }
            }
        }
        lobes
    }

    /// Returns a direction from one part.
    fn sample_lobe(&self, vin: &Vector3f, lobe: Lobe, u: Float, uv: (Float, Float)) -> Option<Vector3f> {
        let front = vin.z > 0.0;
        match (lobe, &self.model) {
            (Lobe::Diffuse(c), _) => {
                let d = cosine_hemisphere(uv);
                let out_front = front != c.is_transmission();
                Some(if out_front { d } else { Vector3f::new(d.x, d.y, -d.z) })
            }
            (Lobe::Matrix(c), BsdfModel::Klems { bsdf, .. }) => bsdf.sample(vin, c, u, uv),
            (Lobe::Grid(transmit), BsdfModel::Fourier(t)) => {
                let out_front = front != transmit;
                let weights: Vec<Float> = (0..GRID.size())
                    .map(|p| max(0.0, t.eval(vin, &grid_direction(p, out_front, (0.5, 0.5))).y()) * GRID.proj_solid_angle(p))
                    .collect();
                let total: Float = weights.iter().sum();
                if total <= 0.0 {
                    return None;
                }
                let target = u * total;
                let mut acc = 0.0;
                let mut patch = weights.len() - 1;
                for (p, w) in weights.iter().enumerate() {
                    acc += w;
                    if target < acc && *w > 0.0 {
                        patch = p;
                        break;
                    }
                }
                Some(grid_direction(patch, out_front, uv))
            }
            _ => None,
        }
    }
}

/// Integration grid for bases without their own patches.
const GRID: KlemsBasis = KlemsBasis::Full;

fn grid_direction(patch: usize, front: bool, uv: (Float, Float)) -> Vector3f {
    let d = GRID.patch_direction(patch, uv);
    if front {
        d
    } else {
        Vector3f::new(d.x, d.y, -d.z)
    }
}

/// Returns a cosine distributed direction on the `z > 0` side.
fn cosine_hemisphere(u: (Float, Float)) -> Vector3f {
    let r = u.0.sqrt();
    let phi = TWO_PI * u.1;
    Vector3f::new(r * phi.cos(), r * phi.sin(), max(0.0, 1.0 - u.0).sqrt())
}

/// Returns the normalized direction, or `None` if it is degenerate or lies in
/// the surface plane.
fn valid_direction(v: &Vector3f) -> Option<Vector3f> {
    if !v.is_finite() {
        return None;
    }
    let v = v.try_normalize()?;
    if v.z == 0.0 {
        None
    } else {
        Some(v)
    }
}

/// Returns the unit vector for a zenith angle and azimuth in degrees. The
/// azimuth is taken modulo 360.
///
/// * `theta` - Zenith angle.
/// * `phi`   - Azimuth.
pub fn vec_from_deg(theta: Float, phi: Float) -> Vector3f {
    let t = radians(theta);
    let p = radians(wrap_degrees(phi));
    Vector3f::new(t.sin() * p.cos(), t.sin() * p.sin(), t.cos())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
