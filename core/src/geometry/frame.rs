//! Local Shading Frame

use super::Vector3f;
use crate::math::abs;

/// An orthonormal frame with `n` as the local +Z axis. BSDF data is tabulated
/// in this frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frame {
    /// Local +X axis.
    pub s: Vector3f,

    /// Local +Y axis.
    pub t: Vector3f,

    /// Local +Z axis.
    pub n: Vector3f,
}

impl Frame {
    /// Create a frame from a single unit normal. The tangent is constructed
    /// by zeroing one coordinate of the normal, swapping the other two and
    /// negating one of them.
    ///
    /// * `n` - Unit normal.
    pub fn from_normal(n: &Vector3f) -> Self {
        let s = if abs(n.x) > abs(n.y) {
            Vector3f::new(-n.z, 0.0, n.x) / (n.x * n.x + n.z * n.z).sqrt()
        } else {
            Vector3f::new(0.0, n.z, -n.y) / (n.y * n.y + n.z * n.z).sqrt()
        };
        let t = n.cross(&s);
        Self { s, t, n: *n }
    }

    /// Create a frame from a unit normal and an up vector that fixes the
    /// azimuth origin. Falls back to `from_normal()` when `up` is parallel to
    /// the normal.
    ///
    /// * `n`  - Unit normal.
    /// * `up` - Up direction; its projection onto the surface is local +Y.
    pub fn from_normal_up(n: &Vector3f, up: &Vector3f) -> Self {
        let t = *up - *n * up.dot(n);
        match t.try_normalize() {
            Some(t) if t.length_squared() > 0.5 => {
                let s = t.cross(n);
                Self { s, t, n: *n }
            }
            _ => Self::from_normal(n),
        }
    }

    /// Transform a world direction into the frame.
    ///
    /// * `v` - World direction.
    pub fn to_local(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(v.dot(&self.s), v.dot(&self.t), v.dot(&self.n))
    }

    /// Transform a local direction back into world space.
    ///
    /// * `v` - Local direction.
    pub fn from_local(&self, v: &Vector3f) -> Vector3f {
        self.s * v.x + self.t * v.y + self.n * v.z
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
