//! 3-D Axis Aligned Bounding Boxes.

use super::{Point3f, Ray};
use crate::math::{max, min, Float};
use std::fmt;

/// 3-D axis aligned bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds3f {
    /// Minimum bounds.
    pub p_min: Point3f,

    /// Maximum bounds.
    pub p_max: Point3f,
}

impl Bounds3f {
    /// Returns a new bounding box.
    ///
    /// * `p1` - First corner.
    /// * `p2` - Second corner.
    pub fn new(p1: Point3f, p2: Point3f) -> Self {
        Self {
            p_min: p1.min(&p2),
            p_max: p1.max(&p2),
        }
    }

    /// Returns an empty box; min is greater than max so that any union
    /// replaces it.
    pub fn empty() -> Self {
        Self {
            p_min: Point3f::new(Float::MAX, Float::MAX, Float::MAX),
            p_max: Point3f::new(Float::MIN, Float::MIN, Float::MIN),
        }
    }

    /// Returns a bounding cube given its minimum corner and side length.
    ///
    /// * `origin` - Minimum corner.
    /// * `size`   - Side length.
    pub fn cube(origin: Point3f, size: Float) -> Self {
        Self {
            p_min: origin,
            p_max: origin + Point3f::new(size, size, size),
        }
    }

    /// Returns true if the box is empty.
    pub fn is_empty(&self) -> bool {
        self.p_min.x > self.p_max.x || self.p_min.y > self.p_max.y || self.p_min.z > self.p_max.z
    }

    /// Returns the union with another box.
    ///
    /// * `other` - The other box.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            p_min: self.p_min.min(&other.p_min),
            p_max: self.p_max.max(&other.p_max),
        }
    }

    /// Returns the union with a point.
    ///
    /// * `p` - The point.
    pub fn union_point(&self, p: &Point3f) -> Self {
        Self {
            p_min: self.p_min.min(p),
            p_max: self.p_max.max(p),
        }
    }

    /// Returns true if the two boxes overlap.
    ///
    /// * `other` - The other box.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.p_max.x >= other.p_min.x
            && self.p_min.x <= other.p_max.x
            && self.p_max.y >= other.p_min.y
            && self.p_min.y <= other.p_max.y
            && self.p_max.z >= other.p_min.z
            && self.p_min.z <= other.p_max.z
    }

    /// Returns the diagonal vector.
    pub fn diagonal(&self) -> Point3f {
        self.p_max - self.p_min
    }

    /// Returns the centre of the box.
    pub fn centroid(&self) -> Point3f {
        (self.p_min + self.p_max) * 0.5
    }

    /// Returns the parametric range `(t0, t1)` over which the ray is inside the
    /// box or `None` if it misses. Slab test.
    ///
    /// * `ray` - The ray.
    pub fn intersect_p(&self, ray: &Ray) -> Option<(Float, Float)> {
        let mut t0 = 0.0;
        let mut t1 = ray.t_max;
        for i in 0..3 {
            let inv_dir = 1.0 / ray.d[i];
            let mut t_near = (self.p_min[i] - ray.o[i]) * inv_dir;
            let mut t_far = (self.p_max[i] - ray.o[i]) * inv_dir;
            if t_near > t_far {
                std::mem::swap(&mut t_near, &mut t_far);
            }

            // NaN comes from 0 * inf when the origin lies on a slab plane and
            // the ray is parallel to it; treat that as inside.
            if !t_near.is_nan() {
                t0 = max(t_near, t0);
            }
            if !t_far.is_nan() {
                t1 = min(t_far, t1);
            }
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }
}

impl fmt::Display for Bounds3f {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.p_min, self.p_max)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3f;
    use float_cmp::*;

    #[test]
    fn empty_box_is_empty_until_union() {
        let b = Bounds3f::empty();
        assert!(b.is_empty());
        let b = b.union_point(&Point3f::new(1.0, 2.0, 3.0));
        assert!(!b.is_empty());
        assert_eq!(b.p_min, b.p_max);
    }

    #[test]
    fn ray_through_box_returns_entry_and_exit() {
        let b = Bounds3f::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let r = Ray::unbounded(Point3f::new(-5.0, 0.0, 0.0), Vector3f::new(1.0, 0.0, 0.0));
        let (t0, t1) = b.intersect_p(&r).unwrap();
        assert!(approx_eq!(Float, t0, 4.0));
        assert!(approx_eq!(Float, t1, 6.0));
    }

    #[test]
    fn ray_missing_box_returns_none() {
        let b = Bounds3f::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let r = Ray::unbounded(Point3f::new(-5.0, 3.0, 0.0), Vector3f::new(1.0, 0.0, 0.0));
        assert!(b.intersect_p(&r).is_none());
    }

    #[test]
    fn ray_starting_inside_box_has_zero_entry() {
        let b = Bounds3f::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let r = Ray::unbounded(Point3f::zero(), Vector3f::new(0.0, 0.0, 1.0));
        let (t0, t1) = b.intersect_p(&r).unwrap();
        assert_eq!(t0, 0.0);
        assert!(approx_eq!(Float, t1, 1.0));
    }
}
