//! Rays

use super::{Point3f, Vector3f};
use crate::math::{Float, INFINITY};
use std::fmt;

/// A Ray
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    /// Origin.
    pub o: Point3f,

    /// Direction.
    pub d: Vector3f,

    /// Maximum extent of the ray.
    pub t_max: Float,
}

impl Ray {
    /// Returns a new ray.
    ///
    /// * `o`     - Origin.
    /// * `d`     - Direction.
    /// * `t_max` - Maximum extent of the ray.
    pub fn new(o: Point3f, d: Vector3f, t_max: Float) -> Self {
        Self { o, d, t_max }
    }

    /// Returns an unbounded ray.
    ///
    /// * `o` - Origin.
    /// * `d` - Direction.
    pub fn unbounded(o: Point3f, d: Vector3f) -> Self {
        Self::new(o, d, INFINITY)
    }

    /// Returns true if either coordinate is NaN.
    pub fn has_nans(&self) -> bool {
        self.o.has_nans() || self.d.has_nans() || self.t_max.is_nan()
    }

    /// Get position along the ray at given parameter.
    ///
    /// * `t` - Parameter to evaluate.
    pub fn at(&self, t: Float) -> Point3f {
        self.o + self.d * t
    }
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[o={}, d={}, t_max={}]", self.o, self.d, self.t_max)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_nans() {
        let nan = Vector3f::new(Float::NAN, 0.0, 0.0);
        let v = Vector3f::new(1.0, 0.0, 0.0);
        assert!(Ray::unbounded(nan, v).has_nans());
        assert!(Ray::unbounded(v, nan).has_nans());
        assert!(Ray::new(v, v, Float::NAN).has_nans());
        assert!(!Ray::unbounded(v, v).has_nans());
    }

    #[test]
    fn at() {
        let o = Point3f::new(0.0, 0.0, 0.0);
        let d = Vector3f::new(1.0, 1.0, 1.0);
        let r = Ray::unbounded(o, d);
        assert_eq!(r.at(0.0), o);
        assert_eq!(r.at(2.0), Point3f::new(2.0, 2.0, 2.0));
    }
}
