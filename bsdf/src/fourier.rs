//! Fourier Basis BSDF
//!
//! Measured BSDFs stored as Fourier series in the azimuth difference for
//! pairs of tabulated zenith cosines, interpolated with Catmull-Rom splines.

use crate::error::BsdfError;
use crate::interpolation::*;
use rcore::binio::*;
use rcore::geometry::Vector3f;
use rcore::math::*;
use rcore::spectrum::Spectrum;
use std::io::Read;

/// The first 8 bytes of a Fourier BSDF file are `SCATFUN` terminated with `0x01`.
pub const FOURIER_MAGIC: &[u8; 8] = b"SCATFUN\x01";

/// Upper bound for the number of zenith nodes.
const MAX_NODES: usize = 1 << 12;

/// Upper bound for the number of coefficients.
const MAX_COEFFS: usize = 1 << 28;

/// Stores the measured Fourier BSDF data.
#[derive(Clone, Debug, PartialEq)]
pub struct FourierTable {
    /// Relative index of refraction over the surface boundary.
    pub eta: Float,

    /// Maximum order `m` for any pair of zenith cosines.
    pub m_max: usize,

    /// Number of spectral channels available:
    /// 1: Monochromatic BSDF
    /// 3: BSDF with RGB colors (stored as luminance, red, blue values)
    pub n_channels: usize,

    /// Zenith angle cosines stored in sorted order from low to high.
    pub mu: Vec<Float>,

    /// The order of the Fourier series for each `mu.len() x mu.len()` pair.
    pub m: Vec<usize>,

    /// The coefficients for all pairs of discretized directions.
    pub a: Vec<Float>,

    /// Offsets into `a`. The `m` coefficients starting at `a[offset]` are
    /// luminance, followed by red and blue for RGB tables.
    pub a_offset: Vec<usize>,
}

impl FourierTable {
    /// Read the body of a Fourier BSDF file following its magic bytes.
    ///
    /// * `r` - The input.
    pub fn read<R: Read>(r: &mut R) -> Result<Self, BsdfError> {
        let flags = r.read_i32_le()?;
        let n_mu = r.read_i32_le()?;
        let n_coeffs = r.read_i32_le()?;
        let m_max = r.read_i32_le()?;
        let n_channels = r.read_i32_le()?;
        let n_bases = r.read_i32_le()?;
        let _unused = r.read_i32_vec(3)?;
        let eta = r.read_f32_le()?;
        let _unused = r.read_i32_vec(4)?;

        // Only monochromatic and RGB files with uniform material properties
        // are supported.
        if flags != 1 || (n_channels != 1 && n_channels != 3) || n_bases != 1 {
            return Err(BsdfError::Unsupported(format!(
                "flags {}, {} channels, {} bases",
                flags, n_channels, n_bases
            )));
        }
        if n_mu < 2 || n_mu as usize > MAX_NODES || n_coeffs < 0 || n_coeffs as usize > MAX_COEFFS || m_max < 0 {
            return Err(BsdfError::SizeMismatch(format!(
                "{} nodes, {} coefficients, order {}",
                n_mu, n_coeffs, m_max
            )));
        }
        let (n_mu, n_coeffs, m_max, n_channels) = (n_mu as usize, n_coeffs as usize, m_max as usize, n_channels as usize);

        let mu = r.read_f32_vec(n_mu)?;
        let _cdf = r.read_f32_vec(n_mu * n_mu)?;
        let offset_and_length = r.read_i32_vec(n_mu * n_mu * 2)?;
        let a = r.read_f32_vec(n_coeffs)?;

        if mu.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BsdfError::SizeMismatch(String::from("zenith nodes are not increasing")));
        }

        let mut a_offset = vec![0_usize; n_mu * n_mu];
        let mut m = vec![0_usize; n_mu * n_mu];
        for i in 0..n_mu * n_mu {
            let offset = offset_and_length[2 * i];
            let length = offset_and_length[2 * i + 1];
            if offset < 0
                || length < 0
                || length as usize > m_max
                || offset as usize + length as usize * n_channels > n_coeffs
            {
                return Err(BsdfError::SizeMismatch(format!(
                    "coefficients {}+{} outside 0..{}",
                    offset, length, n_coeffs
                )));
            }
            a_offset[i] = offset as usize;
            m[i] = length as usize;
        }

        Ok(Self {
            eta,
            m_max,
            n_channels,
            mu,
            m,
            a,
            a_offset,
        })
    }

    /// For offsets into the `mu` array for incident and outgoing direction
    /// cosines, returns the order `m` and the coefficients in `a`.
    ///
    /// * `offset_i` - Offset for incident direction.
    /// * `offset_o` - Offset for outgoing direction.
    pub fn get_ak(&self, offset_i: usize, offset_o: usize) -> (usize, &[Float]) {
        let offset = offset_o * self.mu.len() + offset_i;
        (self.m[offset], &self.a[self.a_offset[offset]..])
    }

    /// Returns the BSDF value between two unit directions, both pointing
    /// away from the surface.
    ///
    /// * `vin`  - Incident direction.
    /// * `vout` - Outgoing direction.
    pub fn eval(&self, vin: &Vector3f, vout: &Vector3f) -> Spectrum {
        // Find the zenith angle cosines and azimuth difference angle.
        let mu_i = -vin.z;
        let mu_o = vout.z;
        let cos_phi = cos_d_phi(&(-*vin), vout);

        // Determine offsets and weights for `(μi, μo)`.
        let (weights_i, offset_i) = match catmull_rom_weights(&self.mu, mu_i) {
            Some(wo) => wo,
            None => return Spectrum::ZERO,
        };
        let (weights_o, offset_o) = match catmull_rom_weights(&self.mu, mu_o) {
            Some(wo) => wo,
            None => return Spectrum::ZERO,
        };

        // Accumulate weighted sums of nearby `ak` coefficients.
        let mut ak = vec![0.0; self.m_max * self.n_channels];
        let mut m_max = 0;
        for (b, wtob) in weights_o.iter().enumerate() {
            for (a, wtia) in weights_i.iter().enumerate() {
                let weight = wtia * wtob;
                if weight != 0.0 {
                    let (m, ap) = self.get_ak((offset_i + a as isize) as usize, (offset_o + b as isize) as usize);
                    m_max = max(m_max, m);
                    for c in 0..self.n_channels {
                        for k in 0..m {
                            ak[c * self.m_max + k] += weight * ap[c * m + k];
                        }
                    }
                }
            }
        }

        // Evaluate Fourier expansion for angle ϕ.
        let y = max(0.0, fourier(&ak[0..m_max], cos_phi));
        let scale = if mu_i != 0.0 { 1.0 / abs(mu_i) } else { 0.0 };

        if self.n_channels == 1 {
            Spectrum::new(y * scale)
        } else {
            // Compute RGB colors; green is recovered from luminance.
            let rs = self.m_max;
            let r = fourier(&ak[rs..rs + m_max], cos_phi);
            let bs = 2 * self.m_max;
            let b = fourier(&ak[bs..bs + m_max], cos_phi);
            let g = 1.39829 * y - 0.100913 * b - 0.297375 * r;
            Spectrum::rgb(r * scale, g * scale, b * scale).clamp(0.0, INFINITY)
        }
    }
}

/// Returns the cosine of the azimuth difference of two vectors.
///
/// * `wa` - First vector.
/// * `wb` - Second vector.
fn cos_d_phi(wa: &Vector3f, wb: &Vector3f) -> Float {
    let waxy = wa.x * wa.x + wa.y * wa.y;
    let wbxy = wb.x * wb.x + wb.y * wb.y;
    if waxy == 0.0 || wbxy == 0.0 {
        1.0
    } else {
        clamp((wa.x * wb.x + wa.y * wb.y) / (waxy * wbxy).sqrt(), -1.0, 1.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
