//! Klems Basis BSDF
//!
//! Matrices of BSDF values over the Klems angular patches. Each hemisphere
//! is divided into rings of constant zenith angle and each ring into equal
//! azimuth patches centred on `phi = 0`. Directions on either side of the
//! surface map to patches by their folded direction `(x, y, |z|)`.

use crate::error::BsdfError;
use rcore::binio::*;
use rcore::geometry::Vector3f;
use rcore::math::*;
use rcore::spectrum::Spectrum;
use std::io::{Read, Write};

/// Magic bytes of the Klems binary format.
pub const KLEMS_MAGIC: &[u8; 8] = b"KLEMSBSD";

/// Current Klems file version.
pub const KLEMS_VERSION: u32 = 1;

const FULL_THETA: [Float; 10] = [0.0, 5.0, 15.0, 25.0, 35.0, 45.0, 55.0, 65.0, 75.0, 90.0];
const FULL_NPHI: [usize; 9] = [1, 8, 16, 20, 24, 24, 24, 16, 12];
const HALF_THETA: [Float; 8] = [0.0, 6.5, 19.5, 32.5, 46.5, 61.5, 76.5, 90.0];
const HALF_NPHI: [usize; 7] = [1, 8, 12, 16, 20, 12, 4];
const QUARTER_THETA: [Float; 6] = [0.0, 9.0, 27.0, 46.0, 66.0, 90.0];
const QUARTER_NPHI: [usize; 5] = [1, 8, 12, 12, 8];

/// Klems angular basis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KlemsBasis {
    /// 145 patches.
    Full,
    /// 73 patches.
    Half,
    /// 41 patches.
    Quarter,
}

impl KlemsBasis {
    /// Returns the basis with the given number of patches.
    ///
    /// * `n` - Number of patches.
    pub fn from_size(n: usize) -> Option<Self> {
        match n {
            145 => Some(Self::Full),
            73 => Some(Self::Half),
            41 => Some(Self::Quarter),
            _ => None,
        }
    }

    /// Returns the number of patches.
    pub fn size(&self) -> usize {
        self.nphi().iter().sum()
    }

    /// Ring boundaries in degrees from the normal.
    fn theta(&self) -> &'static [Float] {
        match self {
            Self::Full => &FULL_THETA,
            Self::Half => &HALF_THETA,
            Self::Quarter => &QUARTER_THETA,
        }
    }

    /// Patches per ring.
    fn nphi(&self) -> &'static [usize] {
        match self {
            Self::Full => &FULL_NPHI,
            Self::Half => &HALF_NPHI,
            Self::Quarter => &QUARTER_NPHI,
        }
    }

    /// Returns the ring and the position within the ring of a patch.
    fn ring_of(&self, patch: usize) -> (usize, usize) {
        let mut first = 0;
        for (ring, n) in self.nphi().iter().enumerate() {
            if patch < first + n {
                return (ring, patch - first);
            }
            first += n;
        }
        let last = self.nphi().len() - 1;
        (last, self.nphi()[last] - 1)
    }

    /// Returns the patch containing a unit direction. The azimuth is wrapped
    /// modulo 360 degrees.
    ///
    /// * `v` - Unit direction with `z != 0`.
    pub fn patch(&self, v: &Vector3f) -> usize {
        let theta = degrees(clamp(abs(v.z), 0.0, 1.0).acos());
        let bounds = self.theta();
        let nphi = self.nphi();

        let ring = (0..nphi.len())
            .find(|&r| theta < bounds[r + 1])
            .unwrap_or(nphi.len() - 1);
        let first: usize = nphi[..ring].iter().sum();

        let n = nphi[ring];
        if n == 1 {
            return first;
        }
        let dphi = 360.0 / n as Float;
        let phi = wrap_degrees(degrees(v.y.atan2(v.x)) + 0.5 * dphi);
        first + min((phi / dphi) as usize, n - 1)
    }

    /// Returns the projected solid angle of a patch.
    ///
    /// * `patch` - Patch index.
    pub fn proj_solid_angle(&self, patch: usize) -> Float {
        let (ring, _) = self.ring_of(patch);
        let bounds = self.theta();
        let s0 = radians(bounds[ring]).sin();
        let s1 = radians(bounds[ring + 1]).sin();
        PI * (s1 * s1 - s0 * s0) / self.nphi()[ring] as Float
    }

    /// Returns a direction in a patch on the `z > 0` side, uniformly
    /// distributed in projected solid angle. `(0.5, 0.5)` gives the centre.
    ///
    /// * `patch` - Patch index.
    /// * `u`     - Uniform values in [0, 1).
    pub fn patch_direction(&self, patch: usize, u: (Float, Float)) -> Vector3f {
        let (ring, j) = self.ring_of(patch);
        let bounds = self.theta();
        let s0 = radians(bounds[ring]).sin();
        let s1 = radians(bounds[ring + 1]).sin();

        let sin2 = lerp(u.0, s0 * s0, s1 * s1);
        let sin_theta = sin2.sqrt();
        let cos_theta = max(0.0, 1.0 - sin2).sqrt();

        let n = self.nphi()[ring];
        let phi = if n == 1 {
            TWO_PI * u.1
        } else {
            radians((j as Float - 0.5 + u.1) * 360.0 / n as Float)
        };
        Vector3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }
}

/// The four scattering components.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Component {
    /// Reflection on the front (`z > 0`) side.
    ReflectFront = 0,
    /// Reflection on the back side.
    ReflectBack = 1,
    /// Transmission of light arriving from the front.
    TransmitFront = 2,
    /// Transmission of light arriving from the back.
    TransmitBack = 3,
}

/// All components in file order.
pub const COMPONENTS: [Component; 4] = [
    Component::ReflectFront,
    Component::ReflectBack,
    Component::TransmitFront,
    Component::TransmitBack,
];

impl Component {
    /// Returns the component connecting two directions, both pointing away
    /// from the surface.
    ///
    /// * `vin`  - Incident direction.
    /// * `vout` - Outgoing direction.
    pub fn between(vin: &Vector3f, vout: &Vector3f) -> Self {
        match (vin.z > 0.0, vout.z > 0.0) {
            (true, true) => Self::ReflectFront,
            (false, false) => Self::ReflectBack,
            (true, false) => Self::TransmitFront,
            (false, true) => Self::TransmitBack,
        }
    }

    /// Returns the component a direction scatters into.
    ///
    /// * `front`    - Incident direction is on the front side.
    /// * `transmit` - Transmission rather than reflection.
    pub fn of(front: bool, transmit: bool) -> Self {
        match (front, transmit) {
            (true, false) => Self::ReflectFront,
            (false, false) => Self::ReflectBack,
            (true, true) => Self::TransmitFront,
            (false, true) => Self::TransmitBack,
        }
    }

    /// Returns true for transmission components.
    pub fn is_transmission(&self) -> bool {
        matches!(self, Self::TransmitFront | Self::TransmitBack)
    }
}

/// BSDF matrices in a Klems basis.
#[derive(Clone, Debug, PartialEq)]
pub struct KlemsBsdf {
    /// Angular basis shared by incident and outgoing directions.
    pub basis: KlemsBasis,

    /// Number of spectral channels, 1 (monochrome) or 3 (RGB).
    pub channels: usize,

    /// Matrices per component in `COMPONENTS` order. Each holds `channels`
    /// consecutive row-major `[out][in]` matrices of BSDF values (1/sr).
    pub components: [Option<Vec<Float>>; 4],
}

impl KlemsBsdf {
    /// Create a BSDF after checking matrix sizes.
    ///
    /// * `basis`      - The basis.
    /// * `channels`   - Number of spectral channels.
    /// * `components` - Matrices per component.
    pub fn new(basis: KlemsBasis, channels: usize, components: [Option<Vec<Float>>; 4]) -> Result<Self, BsdfError> {
        if channels != 1 && channels != 3 {
            return Err(BsdfError::Unsupported(format!("{} channels", channels)));
        }
        let n = basis.size();
        for m in components.iter().flatten() {
            if m.len() != channels * n * n {
                return Err(BsdfError::SizeMismatch(format!(
                    "matrix has {} values, expected {}",
                    m.len(),
                    channels * n * n
                )));
            }
        }
        Ok(Self {
            basis,
            channels,
            components,
        })
    }

    /// Read the body of a Klems file following its magic bytes.
    ///
    /// * `r` - The input.
    pub fn read<R: Read>(r: &mut R) -> Result<(Self, [Spectrum; 4]), BsdfError> {
        let version = r.read_u32_le()?;
        if version != KLEMS_VERSION {
            return Err(BsdfError::Unsupported(format!("Klems version {}", version)));
        }
        let n = r.read_u32_le()? as usize;
        let basis =
            KlemsBasis::from_size(n).ok_or_else(|| BsdfError::Unsupported(format!("Klems basis with {} patches", n)))?;
        let channels = r.read_u32_le()? as usize;
        if channels != 1 && channels != 3 {
            return Err(BsdfError::Unsupported(format!("{} channels", channels)));
        }
        let mask = r.read_u32_le()?;
        if mask & !0xf != 0 {
            return Err(BsdfError::Unsupported(format!("component mask {:#x}", mask)));
        }

        let mut lambertian = [Spectrum::ZERO; 4];
        for l in lambertian.iter_mut() {
            *l = Spectrum::rgb(r.read_f64_le()?, r.read_f64_le()?, r.read_f64_le()?);
        }

        let mut components: [Option<Vec<Float>>; 4] = Default::default();
        for (i, c) in components.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *c = Some(r.read_f32_vec(channels * n * n)?);
            }
        }

        Ok((Self::new(basis, channels, components)?, lambertian))
    }

    /// Write a Klems file.
    ///
    /// * `w`          - The output.
    /// * `lambertian` - Diffuse reflectance and transmittance per component.
    pub fn write<W: Write>(&self, w: &mut W, lambertian: &[Spectrum; 4]) -> Result<(), BsdfError> {
        w.write_all(KLEMS_MAGIC).map_err(BinaryError::from)?;
        w.write_u32_le(KLEMS_VERSION)?;
        w.write_u32_le(self.basis.size() as u32)?;
        w.write_u32_le(self.channels as u32)?;
        let mask = self
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .fold(0_u32, |m, (i, _)| m | (1 << i));
        w.write_u32_le(mask)?;
        for l in lambertian.iter() {
            for c in 0..3 {
                w.write_f64_le(l[c])?;
            }
        }
        for m in self.components.iter().flatten() {
            for v in m.iter() {
                w.write_f32_le(*v)?;
            }
        }
        Ok(())
    }

    /// Returns true if the component has data.
    ///
    /// * `c` - The component.
    pub fn has(&self, c: Component) -> bool {
        self.components[c as usize].is_some()
    }

    /// Returns the matrix entry for a patch pair.
    fn value(&self, m: &[Float], o: usize, i: usize) -> Spectrum {
        let n = self.basis.size();
        if self.channels == 1 {
            Spectrum::new(m[o * n + i])
        } else {
            let nn = n * n;
            Spectrum::rgb(m[o * n + i], m[nn + o * n + i], m[2 * nn + o * n + i])
        }
    }

    /// Returns the BSDF value between two unit directions.
    ///
    /// * `vin`  - Incident direction.
    /// * `vout` - Outgoing direction.
    pub fn eval(&self, vin: &Vector3f, vout: &Vector3f) -> Spectrum {
        match &self.components[Component::between(vin, vout) as usize] {
            Some(m) => self.value(m, self.basis.patch(vout), self.basis.patch(vin)),
            None => Spectrum::ZERO,
        }
    }

    /// Returns the fraction of light from `vin` scattered into a component.
    ///
    /// * `vin` - Incident direction.
    /// * `c`   - The component.
    pub fn hemi(&self, vin: &Vector3f, c: Component) -> Spectrum {
        match &self.components[c as usize] {
            Some(m) => {
                let i = self.basis.patch(vin);
                (0..self.basis.size()).fold(Spectrum::ZERO, |acc, o| {
                    acc + self.value(m, o, i) * self.basis.proj_solid_angle(o)
                })
            }
            None => Spectrum::ZERO,
        }
    }

    /// Returns an outgoing direction in the hemisphere of component `c`,
    /// chosen with probability proportional to the scattered luminance.
    ///
    /// * `vin` - Incident direction.
    /// * `c`   - The component.
    /// * `u`   - Uniform value selecting the patch.
    /// * `uv`  - Uniform values positioning the direction in the patch.
    pub fn sample(&self, vin: &Vector3f, c: Component, u: Float, uv: (Float, Float)) -> Option<Vector3f> {
        let m = self.components[c as usize].as_ref()?;
        let i = self.basis.patch(vin);

        let weights: Vec<Float> = (0..self.basis.size())
            .map(|o| max(0.0, self.value(m, o, i).y()) * self.basis.proj_solid_angle(o))
            .collect();
        let total: Float = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let target = u * total;
        let mut acc = 0.0;
        let mut patch = weights.len() - 1;
        for (o, w) in weights.iter().enumerate() {
            acc += w;
            if target < acc && *w > 0.0 {
                patch = o;
                break;
            }
        }

        let d = self.basis.patch_direction(patch, uv);
        let out_front = (vin.z > 0.0) != c.is_transmission();
        Some(if out_front { d } else { Vector3f::new(d.x, d.y, -d.z) })
    }

    /// Returns the projected solid angle of the patch containing `v`.
    ///
    /// * `v` - Unit direction.
    pub fn proj_solid_angle(&self, v: &Vector3f) -> Float {
        self.basis.proj_solid_angle(self.basis.patch(v))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn direction(theta: Float, phi: Float) -> Vector3f {
        let (t, p) = (radians(theta), radians(phi));
        Vector3f::new(t.sin() * p.cos(), t.sin() * p.sin(), t.cos())
    }

    #[test]
    fn basis_sizes() {
        assert_eq!(KlemsBasis::Full.size(), 145);
        assert_eq!(KlemsBasis::Half.size(), 73);
        assert_eq!(KlemsBasis::Quarter.size(), 41);
        assert_eq!(KlemsBasis::from_size(100), None);
    }

    #[test]
    fn projected_solid_angles_sum_to_pi() {
        for basis in [KlemsBasis::Full, KlemsBasis::Half, KlemsBasis::Quarter] {
            let total: Float = (0..basis.size()).map(|p| basis.proj_solid_angle(p)).sum();
            assert!(approx_eq!(Float, total, PI, epsilon = 1e-9));
        }
    }

    #[test]
    fn normal_direction_is_first_patch() {
        assert_eq!(KlemsBasis::Full.patch(&Vector3f::new(0.0, 0.0, 1.0)), 0);
        assert_eq!(KlemsBasis::Full.patch(&Vector3f::new(0.0, 0.0, -1.0)), 0);
    }

    #[test]
    fn patches_are_centred_on_zero_azimuth() {
        let b = KlemsBasis::Full;
        // Second ring has 8 patches of 45 degrees starting at patch 1.
        assert_eq!(b.patch(&direction(10.0, 0.0)), 1);
        assert_eq!(b.patch(&direction(10.0, 22.0)), 1);
        assert_eq!(b.patch(&direction(10.0, 23.0)), 2);
        assert_eq!(b.patch(&direction(10.0, -22.0)), 1);
        assert_eq!(b.patch(&direction(10.0, -23.0)), 8);
    }

    #[test]
    fn patch_centres_map_back_to_their_patch() {
        for basis in [KlemsBasis::Full, KlemsBasis::Half, KlemsBasis::Quarter] {
            for p in 0..basis.size() {
                assert_eq!(basis.patch(&basis.patch_direction(p, (0.5, 0.5))), p);
            }
        }
    }

    #[test]
    fn file_reads_back() {
        let n = KlemsBasis::Quarter.size();
        let mut rf = vec![0.0; n * n];
        rf[3 * n + 5] = 2.0;
        let bsdf = KlemsBsdf::new(KlemsBasis::Quarter, 1, [Some(rf), None, None, None]).unwrap();
        let lamb = [Spectrum::new(0.1), Spectrum::ZERO, Spectrum::ZERO, Spectrum::new(0.2)];

        let mut buf = Vec::new();
        bsdf.write(&mut buf, &lamb).unwrap();
        let mut r = Cursor::new(buf);
        r.check_header(KLEMS_MAGIC).unwrap();
        let (back, lamb2) = KlemsBsdf::read(&mut r).unwrap();
        assert_eq!(back, bsdf);
        assert_eq!(lamb2, lamb);
    }

    #[test]
    fn wrong_matrix_size_is_rejected() {
        assert!(matches!(
            KlemsBsdf::new(KlemsBasis::Quarter, 1, [Some(vec![0.0; 10]), None, None, None]),
            Err(BsdfError::SizeMismatch(_))
        ));
    }

    #[test]
    fn sampling_picks_the_only_nonzero_patch() {
        let basis = KlemsBasis::Quarter;
        let n = basis.size();
        let mut tf = vec![0.0; n * n];
        for i in 0..n {
            tf[7 * n + i] = 1.0;
        }
        let bsdf = KlemsBsdf::new(basis, 1, [None, None, Some(tf), None]).unwrap();
        let vin = Vector3f::new(0.0, 0.0, 1.0);
        for u in [0.0, 0.3, 0.99] {
            let d = bsdf.sample(&vin, Component::TransmitFront, u, (0.5, 0.5)).unwrap();
            assert!(d.z < 0.0);
            assert_eq!(basis.patch(&d), 7);
        }
        assert!(bsdf.sample(&vin, Component::ReflectFront, 0.5, (0.5, 0.5)).is_none());
    }

    proptest! {
        #[test]
        fn azimuth_wraps_modulo_360(theta in 1.0..89.0f64, phi in 0.0..360.0f64, k in -3i32..3) {
            let b = KlemsBasis::Full;
            let a = b.patch(&direction(theta, phi));
            let wrapped = b.patch(&direction(theta, phi + 360.0 * k as Float));
            prop_assert_eq!(a, wrapped);
        }
    }
}
