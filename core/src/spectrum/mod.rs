//! Spectrum

use crate::math::{clamp, Float};
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Sub};

/// Spectral power distribution stored as `N` coefficients. Ray values are
/// RGB today; a spectral build only changes `N`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CoefficientSpectrum<const N: usize> {
    /// The coefficients.
    pub c: [Float; N],
}

/// RGB spectrum.
pub type RGBSpectrum = CoefficientSpectrum<3>;

/// The spectrum carried by rays.
pub type Spectrum = RGBSpectrum;

/// Luminance weights for linear RGB primaries.
const Y_WEIGHT: [Float; 3] = [0.212671, 0.715160, 0.072169];

impl<const N: usize> CoefficientSpectrum<N> {
    /// Zero.
    pub const ZERO: Self = Self { c: [0.0; N] };

    /// One.
    pub const ONE: Self = Self { c: [1.0; N] };

    /// Create a spectrum with all coefficients set to a constant.
    ///
    /// * `v` - The value.
    pub const fn new(v: Float) -> Self {
        Self { c: [v; N] }
    }

    /// Returns true if every coefficient is zero.
    pub fn is_black(&self) -> bool {
        self.c.iter().all(|&v| v == 0.0)
    }

    /// Returns true if any coefficient is NaN.
    pub fn has_nans(&self) -> bool {
        self.c.iter().any(|v| v.is_nan())
    }

    /// Returns the largest coefficient.
    pub fn max_component_value(&self) -> Float {
        self.c.iter().copied().fold(Float::MIN, Float::max)
    }

    /// Returns the average of the coefficients.
    pub fn average(&self) -> Float {
        self.c.iter().sum::<Float>() / N as Float
    }

    /// Clamp the coefficients.
    ///
    /// * `low`  - Lower bound.
    /// * `high` - Upper bound.
    pub fn clamp(&self, low: Float, high: Float) -> Self {
        let mut ret = *self;
        for v in ret.c.iter_mut() {
            *v = clamp(*v, low, high);
        }
        ret
    }
}

impl RGBSpectrum {
    /// Create a spectrum from RGB values.
    ///
    /// * `r` - Red.
    /// * `g` - Green.
    /// * `b` - Blue.
    pub const fn rgb(r: Float, g: Float, b: Float) -> Self {
        Self { c: [r, g, b] }
    }

    /// Returns the luminance.
    pub fn y(&self) -> Float {
        Y_WEIGHT[0] * self.c[0] + Y_WEIGHT[1] * self.c[1] + Y_WEIGHT[2] * self.c[2]
    }
}

impl<const N: usize> Default for CoefficientSpectrum<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> From<[Float; N]> for CoefficientSpectrum<N> {
    fn from(c: [Float; N]) -> Self {
        Self { c }
    }
}

impl<const N: usize> Add for CoefficientSpectrum<N> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        let mut ret = self;
        ret += other;
        ret
    }
}

impl<const N: usize> AddAssign for CoefficientSpectrum<N> {
    fn add_assign(&mut self, other: Self) {
        for (a, b) in self.c.iter_mut().zip(other.c.iter()) {
            *a += b;
        }
    }
}

impl<const N: usize> Sub for CoefficientSpectrum<N> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        let mut ret = self;
        for (a, b) in ret.c.iter_mut().zip(other.c.iter()) {
            *a -= b;
        }
        ret
    }
}

impl<const N: usize> Mul for CoefficientSpectrum<N> {
    type Output = Self;

    fn mul(self, other: Self) -> Self::Output {
        let mut ret = self;
        ret *= other;
        ret
    }
}

impl<const N: usize> MulAssign for CoefficientSpectrum<N> {
    fn mul_assign(&mut self, other: Self) {
        for (a, b) in self.c.iter_mut().zip(other.c.iter()) {
            *a *= b;
        }
    }
}

impl<const N: usize> Mul<Float> for CoefficientSpectrum<N> {
    type Output = Self;

    fn mul(self, f: Float) -> Self::Output {
        let mut ret = self;
        ret *= f;
        ret
    }
}

impl<const N: usize> MulAssign<Float> for CoefficientSpectrum<N> {
    fn mul_assign(&mut self, f: Float) {
        for a in self.c.iter_mut() {
            *a *= f;
        }
    }
}

impl<const N: usize> Mul<CoefficientSpectrum<N>> for Float {
    type Output = CoefficientSpectrum<N>;

    fn mul(self, s: CoefficientSpectrum<N>) -> Self::Output {
        s * self
    }
}

impl<const N: usize> Div<Float> for CoefficientSpectrum<N> {
    type Output = Self;

    fn div(self, f: Float) -> Self::Output {
        debug_assert!(f != 0.0);
        let mut ret = self;
        ret /= f;
        ret
    }
}

impl<const N: usize> DivAssign<Float> for CoefficientSpectrum<N> {
    fn div_assign(&mut self, f: Float) {
        debug_assert!(f != 0.0);
        let inv = 1.0 / f;
        for a in self.c.iter_mut() {
            *a *= inv;
        }
    }
}

impl<const N: usize> Index<usize> for CoefficientSpectrum<N> {
    type Output = Float;

    fn index(&self, i: usize) -> &Self::Output {
        &self.c[i]
    }
}

impl<const N: usize> IndexMut<usize> for CoefficientSpectrum<N> {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.c[i]
    }
}

impl<const N: usize> fmt::Display for CoefficientSpectrum<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.c.iter().map(|v| format!("{v}")).collect();
        write!(f, "[{}]", values.join(", "))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    #[test]
    fn white_has_unit_luminance() {
        assert!(approx_eq!(Float, Spectrum::ONE.y(), 1.0, epsilon = 1e-6));
    }

    #[test]
    fn arithmetic_is_component_wise() {
        let a = Spectrum::rgb(1.0, 2.0, 3.0);
        let b = Spectrum::rgb(2.0, 2.0, 2.0);
        assert_eq!(a + b, Spectrum::rgb(3.0, 4.0, 5.0));
        assert_eq!(a * b, Spectrum::rgb(2.0, 4.0, 6.0));
        assert_eq!(a * 0.5, Spectrum::rgb(0.5, 1.0, 1.5));
        assert_eq!(a / 2.0, Spectrum::rgb(0.5, 1.0, 1.5));
        assert_eq!(a.max_component_value(), 3.0);
    }

    #[test]
    fn wider_spectra_share_the_operations() {
        let s = CoefficientSpectrum::<8>::new(0.25) * 4.0;
        assert_eq!(s, CoefficientSpectrum::<8>::ONE);
        assert!(CoefficientSpectrum::<8>::ZERO.is_black());
    }
}
