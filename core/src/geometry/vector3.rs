//! 3-D Vectors

use crate::math::{abs, Float};
use num_traits::{Num, Zero};
use std::fmt;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign,
};

/// A 3-D vector containing numeric values.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector3<T> {
    /// X-coordinate.
    pub x: T,

    /// Y-coordinate.
    pub y: T,

    /// Z-coordinate.
    pub z: T,
}

/// 3-D vector containing `Float` values.
pub type Vector3f = Vector3<Float>;

/// Points share the vector representation.
pub type Point3f = Vector3f;

impl<T: Num + Copy> Vector3<T> {
    /// Creates a new 3-D vector.
    ///
    /// * `x` - X-coordinate.
    /// * `y` - Y-coordinate.
    /// * `z` - Z-coordinate.
    pub fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    /// Creates a new 3-D zero vector.
    pub fn zero() -> Self {
        Self::new(T::zero(), T::zero(), T::zero())
    }

    /// Returns the square of the vector's length.
    pub fn length_squared(&self) -> T {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Returns the dot product with another vector.
    ///
    /// * `other` - The other vector.
    pub fn dot(&self, other: &Self) -> T {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Returns the cross product with another vector.
    ///
    /// * `other` - The other vector.
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            (self.y * other.z) - (self.z * other.y),
            (self.z * other.x) - (self.x * other.z),
            (self.x * other.y) - (self.y * other.x),
        )
    }

    /// Returns a new vector containing absolute values of the components.
    pub fn abs(&self) -> Self
    where
        T: Neg<Output = T> + PartialOrd,
    {
        Self::new(abs(self.x), abs(self.y), abs(self.z))
    }

    /// Returns the largest coordinate value.
    pub fn max_component(&self) -> T
    where
        T: PartialOrd,
    {
        let m = if self.x > self.y { self.x } else { self.y };
        if m > self.z {
            m
        } else {
            self.z
        }
    }

    /// Returns the index of the axis with the largest coordinate value.
    pub fn max_dimension(&self) -> usize
    where
        T: PartialOrd,
    {
        if self.x > self.y {
            if self.x > self.z {
                0
            } else {
                2
            }
        } else if self.y > self.z {
            1
        } else {
            2
        }
    }

    /// Returns a vector with the component-wise minimum.
    ///
    /// * `other` - The other vector.
    pub fn min(&self, other: &Self) -> Self
    where
        T: PartialOrd,
    {
        Self::new(
            crate::math::min(self.x, other.x),
            crate::math::min(self.y, other.y),
            crate::math::min(self.z, other.z),
        )
    }

    /// Returns a vector with the component-wise maximum.
    ///
    /// * `other` - The other vector.
    pub fn max(&self, other: &Self) -> Self
    where
        T: PartialOrd,
    {
        Self::new(
            crate::math::max(self.x, other.x),
            crate::math::max(self.y, other.y),
            crate::math::max(self.z, other.z),
        )
    }
}

impl Vector3f {
    /// Returns true if either coordinate is NaN.
    pub fn has_nans(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }

    /// Returns true if all coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Returns the vector's length.
    pub fn length(&self) -> Float {
        self.length_squared().sqrt()
    }

    /// Returns the unit vector.
    pub fn normalize(&self) -> Self {
        *self / self.length()
    }

    /// Returns the unit vector or `None` when the vector has zero or non-finite
    /// length.
    pub fn try_normalize(&self) -> Option<Self> {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            Some(*self / len)
        } else {
            None
        }
    }

    /// Returns the distance to another point.
    ///
    /// * `other` - The other point.
    pub fn distance(&self, other: &Self) -> Float {
        (*self - *other).length()
    }

    /// Reflect this direction about a normal. Both point away from the surface
    /// after reflection when `self` points towards it.
    ///
    /// * `n` - Unit surface normal.
    pub fn reflect(&self, n: &Self) -> Self {
        *self - *n * (2.0 * self.dot(n))
    }
}

impl<T> Index<usize> for Vector3<T> {
    type Output = T;

    /// Index the vector by an axis to get the immutable coordinate value.
    ///
    /// * `i` - A 3-D coordinate axis.
    fn index(&self, i: usize) -> &Self::Output {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Invalid axis for Vector3"),
        }
    }
}

impl<T> IndexMut<usize> for Vector3<T> {
    /// Index the vector by an axis to get a mutable coordinate value.
    ///
    /// * `i` - A 3-D coordinate axis.
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Invalid axis for Vector3"),
        }
    }
}

impl<T: Num> Add for Vector3<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl<T: Num + Copy> AddAssign for Vector3<T> {
    fn add_assign(&mut self, other: Self) {
        *self = Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        };
    }
}

impl<T: Num> Sub for Vector3<T> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl<T: Num + Copy> SubAssign for Vector3<T> {
    fn sub_assign(&mut self, other: Self) {
        *self = Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        };
    }
}

impl<T: Num + Copy> Mul<T> for Vector3<T> {
    type Output = Self;

    fn mul(self, f: T) -> Self::Output {
        Self::new(f * self.x, f * self.y, f * self.z)
    }
}

impl<T: Num + Copy> MulAssign<T> for Vector3<T> {
    fn mul_assign(&mut self, f: T) {
        self.x = self.x * f;
        self.y = self.y * f;
        self.z = self.z * f;
    }
}

impl Mul<Vector3f> for Float {
    type Output = Vector3f;

    fn mul(self, v: Vector3f) -> Self::Output {
        v * self
    }
}

impl<T: Num + Copy + Zero> Div<T> for Vector3<T> {
    type Output = Self;

    fn div(self, f: T) -> Self::Output {
        debug_assert!(!f.is_zero());
        Self::new(self.x / f, self.y / f, self.z / f)
    }
}

impl<T: Num + Copy + Zero> DivAssign<T> for Vector3<T> {
    fn div_assign(&mut self, f: T) {
        debug_assert!(!f.is_zero());
        self.x = self.x / f;
        self.y = self.y / f;
        self.z = self.z / f;
    }
}

impl<T: Num + Copy + Neg<Output = T>> Neg for Vector3<T> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl<T: fmt::Display> fmt::Display for Vector3<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

impl From<[Float; 3]> for Vector3f {
    fn from(a: [Float; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

impl From<Vector3f> for [Float; 3] {
    fn from(v: Vector3f) -> Self {
        [v.x, v.y, v.z]
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

    #[test]
    fn zero_vector_has_zero_length() {
        assert_eq!(Vector3f::zero().length(), 0.0);
        assert!(Vector3f::zero().try_normalize().is_none());
    }

    #[test]
    fn reflect_flips_normal_component() {
        let d = Vector3f::new(1.0, 0.0, -1.0);
        let n = Vector3f::new(0.0, 0.0, 1.0);
        assert_eq!(d.reflect(&n), Vector3f::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn negation_flips_every_component() {
        assert_eq!(-Vector3f::new(1.0, -2.0, 3.0), Vector3f::new(-1.0, 2.0, -3.0));
        assert_eq!(-Vector3::new(1_i32, 0, -4), Vector3::new(-1, 0, 4));
    }

    #[test]
    fn max_dimension_returns_largest_axis() {
        assert_eq!(Vector3f::new(1.0, 3.0, 2.0).max_dimension(), 1);
        assert_eq!(Vector3f::new(4.0, 3.0, 2.0).max_dimension(), 0);
        assert_eq!(Vector3f::new(1.0, 1.0, 2.0).max_dimension(), 2);
    }

    fn vector3f() -> impl Strategy<Value = Vector3f> {
        (-100.0..100.0f64, -100.0..100.0f64, -100.0..100.0f64)
            .prop_map(|(x, y, z)| Vector3f::new(x, y, z))
    }

    proptest! {
        #[test]
        fn cross_product_is_orthogonal(v1 in vector3f(), v2 in vector3f()) {
            let c = v1.cross(&v2);
            let tol = 1e-6 * (1.0 + v1.length() * v2.length()).powi(2);
            prop_assert!(abs(c.dot(&v1)) <= tol);
            prop_assert!(abs(c.dot(&v2)) <= tol);
        }

        #[test]
        fn normalize_returns_unit_length(v in vector3f()) {
            prop_assume!(v.length() > 1e-3);
            prop_assert!(approx_eq!(Float, v.normalize().length(), 1.0, epsilon = 1e-9));
        }
    }
}
