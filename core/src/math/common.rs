//! Common

use num_traits::Num;
use std::ops::{Add, Mul, Neg};

/// Use 64-bit precision for floating point numbers. Accumulated radiometric
/// sums lose too much with 32-bit values.
pub type Float = f64;

/// Infinty (∞)
pub const INFINITY: Float = Float::INFINITY;

/// PI (π)
pub const PI: Float = std::f64::consts::PI;

/// 1/PI (1/π)
pub const INV_PI: Float = 1.0 / PI;

/// PI/2 (π/2)
pub const PI_OVER_TWO: Float = PI * 0.5;

/// 2*PI (2π)
pub const TWO_PI: Float = PI * 2.0;

/// Minimum distance along a ray for a valid intersection. Keeps spawned rays
/// from hitting the surface they leave.
pub const RAY_EPSILON: Float = 1e-6;

/// Returns the absolute value of a number.
///
/// * `n` - The number.
#[inline(always)]
pub fn abs<T>(n: T) -> T
where
    T: Num + Neg<Output = T> + PartialOrd + Copy,
{
    if n < T::zero() {
        -n
    } else {
        n
    }
}

/// Returns the minimum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn min<T>(a: T, b: T) -> T
where
    T: PartialOrd + Copy,
{
    if a < b {
        a
    } else {
        b
    }
}

/// Returns the maximum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn max<T>(a: T, b: T) -> T
where
    T: PartialOrd + Copy,
{
    if a > b {
        a
    } else {
        b
    }
}

/// Clamp a value to the given range.
///
/// * `val`  - The value.
/// * `low`  - Lower bound.
/// * `high` - Upper bound.
#[inline(always)]
pub fn clamp<T>(val: T, low: T, high: T) -> T
where
    T: PartialOrd + Copy,
{
    if val < low {
        low
    } else if val > high {
        high
    } else {
        val
    }
}

/// Linearly interpolate between two values.
///
/// * `t`  - Parameter in [0, 1].
/// * `p0` - Value at t = 0.
/// * `p1` - Value at t = 1.
#[inline(always)]
pub fn lerp<P>(t: Float, p0: P, p1: P) -> P
where
    P: Mul<Float, Output = P> + Add<P, Output = P>,
{
    p0 * (1.0 - t) + p1 * t
}

/// Convert degrees to radians.
///
/// * `deg` - Angle in degrees.
#[inline(always)]
pub fn radians(deg: Float) -> Float {
    (PI / 180.0) * deg
}

/// Convert radians to degrees.
///
/// * `rad` - Angle in radians.
#[inline(always)]
pub fn degrees(rad: Float) -> Float {
    (180.0 / PI) * rad
}

/// Wraps an azimuth angle in degrees into [0, 360).
///
/// * `phi` - Azimuth in degrees.
#[inline]
pub fn wrap_degrees(phi: Float) -> Float {
    let wrapped = phi.rem_euclid(360.0);
    // `rem_euclid` can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Bisects a sorted range and returns the index `i` such that `pred(i)` is
/// true and `pred(i + 1)` is false, clamped to [0, size - 2].
///
/// * `size` - Number of entries.
/// * `pred` - Predicate that is true for a prefix of the entries.
pub fn find_interval<Predicate>(size: usize, pred: Predicate) -> usize
where
    Predicate: Fn(usize) -> bool,
{
    let (mut first, mut len) = (0, size);

    while len > 0 {
        let half = len >> 1;
        let middle = first + half;

        // Bisect range based on value of `pred` at `middle`.
        if pred(middle) {
            first = middle + 1;
            len -= half + 1;
        } else {
            len = half;
        }
    }

    clamp(first.saturating_sub(1), 0, size.saturating_sub(2))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use proptest::prelude::*;

    #[test]
    fn find_interval_returns_lower_node() {
        let nodes = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(find_interval(nodes.len(), |i| nodes[i] <= 1.5), 1);
        assert_eq!(find_interval(nodes.len(), |i| nodes[i] <= -1.0), 0);
        assert_eq!(find_interval(nodes.len(), |i| nodes[i] <= 10.0), 2);
    }

    #[test]
    fn wrap_degrees_handles_negative_and_large_angles() {
        assert!(approx_eq!(Float, wrap_degrees(-90.0), 270.0));
        assert!(approx_eq!(Float, wrap_degrees(720.0), 0.0));
        assert!(approx_eq!(Float, wrap_degrees(365.0), 5.0));
    }

    proptest! {
        #[test]
        fn wrap_degrees_is_in_range(phi in -1.0e6..1.0e6f64) {
            let w = wrap_degrees(phi);
            prop_assert!((0.0..360.0).contains(&w));
        }

        #[test]
        fn radians_degrees_round_trip(deg in -720.0..720.0f64) {
            prop_assert!(approx_eq!(Float, degrees(radians(deg)), deg, epsilon = 1e-9));
        }
    }
}
