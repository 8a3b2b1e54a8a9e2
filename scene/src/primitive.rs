//! Geometric Primitives

use crate::error::SceneError;
use crate::object::*;
use rcore::geometry::*;
use rcore::math::*;

/// A ray/surface hit in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShapeHit {
    /// Distance along the ray.
    pub t: Float,

    /// Outward geometric normal (inward for bubbles and tubes).
    pub n: Vector3f,
}

/// Geometry derived from a surface record.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// `sphere` and `bubble`. Bubbles have inward normals.
    Sphere {
        center: Point3f,
        radius: Float,
        inward: bool,
    },

    /// Planar polygon. Vertices wind counter-clockwise around the normal.
    Polygon {
        vertices: Vec<Point3f>,
        normal: Vector3f,
        offset: Float,
        /// The two axes of the plane onto which the inside test projects.
        axes: (usize, usize),
    },

    /// Disk or annulus.
    Ring {
        center: Point3f,
        normal: Vector3f,
        r0: Float,
        r1: Float,
    },

    /// `cylinder` and `tube`, open at both ends. Tubes have inward normals.
    Cylinder {
        p0: Point3f,
        axis: Vector3f,
        length: Float,
        radius: Float,
        inward: bool,
    },

    /// Distant source subtending a cone of directions.
    Source { dir: Vector3f, cos_half_angle: Float },
}

impl Shape {
    /// Build the shape for a surface record. Returns `None` for materials.
    ///
    /// * `rec` - The record.
    pub fn from_record(rec: &ObjectRecord) -> Result<Option<Self>, SceneError> {
        let a = &rec.rargs;
        let bad = |reason: &str| SceneError::BadArguments {
            id: rec.name.clone(),
            kind: rec.kind,
            reason: reason.to_string(),
        };

        let shape = match rec.kind {
            ObjectKind::Sphere | ObjectKind::Bubble => {
                let radius = a[3];
                if radius <= 0.0 {
                    return Err(bad("radius must be positive"));
                }
                Self::Sphere {
                    center: Point3f::new(a[0], a[1], a[2]),
                    radius,
                    inward: rec.kind == ObjectKind::Bubble,
                }
            }
            ObjectKind::Polygon => {
                let vertices: Vec<Point3f> = a.chunks(3).map(|c| Point3f::new(c[0], c[1], c[2])).collect();

                // Newell's method handles non-convex and slightly non-planar input.
                let mut normal = Vector3f::zero();
                for (i, v) in vertices.iter().enumerate() {
                    let w = vertices[(i + 1) % vertices.len()];
                    normal.x += (v.y - w.y) * (v.z + w.z);
                    normal.y += (v.z - w.z) * (v.x + w.x);
                    normal.z += (v.x - w.x) * (v.y + w.y);
                }
                let normal = normal.try_normalize().ok_or_else(|| bad("degenerate polygon"))?;
                let offset = normal.dot(&vertices[0]);
                let axes = match normal.abs().max_dimension() {
                    0 => (1, 2),
                    1 => (2, 0),
                    _ => (0, 1),
                };
                Self::Polygon {
                    vertices,
                    normal,
                    offset,
                    axes,
                }
            }
            ObjectKind::Ring => {
                let normal = Vector3f::new(a[3], a[4], a[5])
                    .try_normalize()
                    .ok_or_else(|| bad("zero normal"))?;
                let (r0, r1) = (a[6], a[7]);
                if r0 < 0.0 || r1 <= r0 {
                    return Err(bad("radii must satisfy 0 <= r0 < r1"));
                }
                Self::Ring {
                    center: Point3f::new(a[0], a[1], a[2]),
                    normal,
                    r0,
                    r1,
                }
            }
            ObjectKind::Cylinder | ObjectKind::Tube => {
                let p0 = Point3f::new(a[0], a[1], a[2]);
                let p1 = Point3f::new(a[3], a[4], a[5]);
                let length = p0.distance(&p1);
                if length <= 0.0 || a[6] <= 0.0 {
                    return Err(bad("zero length or non-positive radius"));
                }
                Self::Cylinder {
                    p0,
                    axis: (p1 - p0) / length,
                    length,
                    radius: a[6],
                    inward: rec.kind == ObjectKind::Tube,
                }
            }
            ObjectKind::Source => {
                let dir = Vector3f::new(a[0], a[1], a[2])
                    .try_normalize()
                    .ok_or_else(|| bad("zero direction"))?;
                if a[3] <= 0.0 || a[3] > 360.0 {
                    return Err(bad("angle must be in (0, 360]"));
                }
                Self::Source {
                    dir,
                    cos_half_angle: radians(a[3] * 0.5).cos(),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(shape))
    }

    /// Returns true for distant sources, which have no position.
    pub fn is_distant(&self) -> bool {
        matches!(self, Self::Source { .. })
    }

    /// Returns the world bounds. Distant sources are unbounded and return an
    /// empty box.
    pub fn bounds(&self) -> Bounds3f {
        match self {
            Self::Sphere { center, radius, .. } => {
                let r = Vector3f::new(*radius, *radius, *radius);
                Bounds3f::new(*center - r, *center + r)
            }
            Self::Polygon { vertices, .. } => vertices
                .iter()
                .fold(Bounds3f::empty(), |b, v| b.union_point(v)),
            Self::Ring { center, r1, .. } => {
                let r = Vector3f::new(*r1, *r1, *r1);
                Bounds3f::new(*center - r, *center + r)
            }
            Self::Cylinder {
                p0,
                axis,
                length,
                radius,
                ..
            } => {
                let p1 = *p0 + *axis * *length;
                let r = Vector3f::new(*radius, *radius, *radius);
                Bounds3f::new(*p0 - r, *p0 + r).union(&Bounds3f::new(p1 - r, p1 + r))
            }
            Self::Source { .. } => Bounds3f::empty(),
        }
    }

    /// Returns a representative point used to aim shadow rays, or the
    /// direction towards a distant source.
    pub fn center(&self) -> Point3f {
        match self {
            Self::Sphere { center, .. } | Self::Ring { center, .. } => *center,
            Self::Polygon { vertices, .. } => {
                vertices.iter().fold(Point3f::zero(), |acc, v| acc + *v) / vertices.len() as Float
            }
            Self::Cylinder { p0, axis, length, .. } => *p0 + *axis * (*length * 0.5),
            Self::Source { dir, .. } => *dir,
        }
    }

    /// Returns the surface area, or the solid angle of a distant source.
    pub fn area(&self) -> Float {
        match self {
            Self::Sphere { radius, .. } => 4.0 * PI * radius * radius,
            Self::Polygon { vertices, normal, .. } => {
                let mut sum = Vector3f::zero();
                for (i, v) in vertices.iter().enumerate() {
                    sum += v.cross(&vertices[(i + 1) % vertices.len()]);
                }
                0.5 * abs(sum.dot(normal))
            }
            Self::Ring { r0, r1, .. } => PI * (r1 * r1 - r0 * r0),
            Self::Cylinder { length, radius, .. } => TWO_PI * radius * length,
            Self::Source { cos_half_angle, .. } => TWO_PI * (1.0 - cos_half_angle),
        }
    }

    /// Returns the closest hit in `(RAY_EPSILON, ray.t_max)`. Distant sources
    /// are never hit here; see `in_source_cone()`.
    ///
    /// * `ray` - The ray. Its direction must be normalized.
    pub fn intersect(&self, ray: &Ray) -> Option<ShapeHit> {
        match self {
            Self::Sphere {
                center,
                radius,
                inward,
            } => {
                let oc = ray.o - *center;
                let b = oc.dot(&ray.d);
                let c = oc.length_squared() - radius * radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                let root = disc.sqrt();
                let t = [-b - root, -b + root]
                    .into_iter()
                    .find(|&t| t > RAY_EPSILON && t < ray.t_max)?;
                let n = (ray.at(t) - *center) / *radius;
                Some(ShapeHit {
                    t,
                    n: if *inward { -n } else { n },
                })
            }
            Self::Polygon {
                vertices,
                normal,
                offset,
                axes,
            } => {
                let t = plane_hit(ray, normal, *offset)?;
                let p = ray.at(t);
                if point_in_polygon(vertices, *axes, &p) {
                    Some(ShapeHit { t, n: *normal })
                } else {
                    None
                }
            }
            Self::Ring {
                center,
                normal,
                r0,
                r1,
            } => {
                let t = plane_hit(ray, normal, normal.dot(center))?;
                let r2 = ray.at(t).distance(center).powi(2);
                if r2 >= r0 * r0 && r2 <= r1 * r1 {
                    Some(ShapeHit { t, n: *normal })
                } else {
                    None
                }
            }
            Self::Cylinder {
                p0,
                axis,
                length,
                radius,
                inward,
            } => {
                let oc = ray.o - *p0;
                let d_perp = ray.d - *axis * ray.d.dot(axis);
                let o_perp = oc - *axis * oc.dot(axis);
                let a = d_perp.length_squared();
                if a == 0.0 {
                    return None;
                }
                let b = d_perp.dot(&o_perp);
                let c = o_perp.length_squared() - radius * radius;
                let disc = b * b - a * c;
                if disc < 0.0 {
                    return None;
                }
                let root = disc.sqrt();
                for t in [(-b - root) / a, (-b + root) / a] {
                    if t <= RAY_EPSILON || t >= ray.t_max {
                        continue;
                    }
                    let h = (ray.at(t) - *p0).dot(axis);
                    if h >= 0.0 && h <= *length {
                        let n = (ray.at(t) - *p0 - *axis * h) / *radius;
                        return Some(ShapeHit {
                            t,
                            n: if *inward { -n } else { n },
                        });
                    }
                }
                None
            }
            Self::Source { .. } => None,
        }
    }

    /// Returns true if a direction falls within a distant source's cone.
    ///
    /// * `d` - Unit direction.
    pub fn in_source_cone(&self, d: &Vector3f) -> bool {
        match self {
            Self::Source { dir, cos_half_angle } => d.dot(dir) >= *cos_half_angle,
            _ => false,
        }
    }
}

/// Returns the ray parameter at a plane `n . p = offset`.
fn plane_hit(ray: &Ray, n: &Vector3f, offset: Float) -> Option<Float> {
    let denom = n.dot(&ray.d);
    if abs(denom) < 1e-12 {
        return None;
    }
    let t = (offset - n.dot(&ray.o)) / denom;
    if t > RAY_EPSILON && t < ray.t_max {
        Some(t)
    } else {
        None
    }
}

/// Crossing-number inside test after projecting onto two axes.
fn point_in_polygon(vertices: &[Point3f], axes: (usize, usize), p: &Point3f) -> bool {
    let (u, v) = axes;
    let (pu, pv) = (p[u], p[v]);
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (ui, vi) = (vertices[i][u], vertices[i][v]);
        let (uj, vj) = (vertices[j][u], vertices[j][v]);
        if (vi > pv) != (vj > pv) && pu < (uj - ui) * (pv - vi) / (vj - vi) + ui {
            inside = !inside;
        }
        j = i;
    }
    inside
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    fn shape(kind: ObjectKind, rargs: Vec<Float>) -> Shape {
        let rec = ObjectRecord::new(0, None, kind, "s", vec![], rargs).unwrap();
        Shape::from_record(&rec).unwrap().unwrap()
    }

    #[test]
    fn sphere_hit_from_outside_and_inside() {
        let s = shape(ObjectKind::Sphere, vec![0.0, 0.0, 0.0, 1.0]);
        let hit = s
            .intersect(&Ray::unbounded(Point3f::new(0.0, 0.0, -5.0), Vector3f::new(0.0, 0.0, 1.0)))
            .unwrap();
        assert!(approx_eq!(Float, hit.t, 4.0));
        assert_eq!(hit.n, Vector3f::new(0.0, 0.0, -1.0));

        let hit = s
            .intersect(&Ray::unbounded(Point3f::zero(), Vector3f::new(1.0, 0.0, 0.0)))
            .unwrap();
        assert!(approx_eq!(Float, hit.t, 1.0));
    }

    #[test]
    fn bubble_normals_point_inward() {
        let s = shape(ObjectKind::Bubble, vec![0.0, 0.0, 0.0, 2.0]);
        let hit = s
            .intersect(&Ray::unbounded(Point3f::zero(), Vector3f::new(0.0, 1.0, 0.0)))
            .unwrap();
        assert_eq!(hit.n, Vector3f::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn polygon_inside_test() {
        let quad = shape(
            ObjectKind::Polygon,
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        );
        let down = Vector3f::new(0.0, 0.0, -1.0);
        let hit = quad.intersect(&Ray::unbounded(Point3f::new(0.5, 0.5, 1.0), down)).unwrap();
        assert!(approx_eq!(Float, hit.t, 1.0));
        assert_eq!(hit.n, Vector3f::new(0.0, 0.0, 1.0));
        assert!(quad.intersect(&Ray::unbounded(Point3f::new(1.5, 0.5, 1.0), down)).is_none());
        assert!(approx_eq!(Float, quad.area(), 1.0));
    }

    #[test]
    fn ring_hole_is_missed() {
        let ring = shape(ObjectKind::Ring, vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.5, 1.0]);
        let down = Vector3f::new(0.0, 0.0, -1.0);
        assert!(ring.intersect(&Ray::unbounded(Point3f::new(0.0, 0.0, 1.0), down)).is_none());
        assert!(ring.intersect(&Ray::unbounded(Point3f::new(0.75, 0.0, 1.0), down)).is_some());
    }

    #[test]
    fn cylinder_is_open_ended() {
        let c = shape(ObjectKind::Cylinder, vec![0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 1.0]);
        let hit = c
            .intersect(&Ray::unbounded(Point3f::new(-5.0, 0.0, 1.0), Vector3f::new(1.0, 0.0, 0.0)))
            .unwrap();
        assert!(approx_eq!(Float, hit.t, 4.0));
        assert!(approx_eq!(Float, hit.n.x, -1.0));
        assert!(c
            .intersect(&Ray::unbounded(Point3f::new(0.0, 0.0, 5.0), Vector3f::new(0.0, 0.0, -1.0)))
            .is_none());
    }

    #[test]
    fn source_cone_uses_half_angle() {
        let sun = shape(ObjectKind::Source, vec![0.0, 0.0, 1.0, 10.0]);
        assert!(sun.in_source_cone(&Vector3f::new(0.0, 0.0, 1.0)));
        let off = Vector3f::new(radians(6.0).sin(), 0.0, radians(6.0).cos());
        assert!(!sun.in_source_cone(&off));
        assert!(sun.bounds().is_empty());
    }

    #[test]
    fn t_max_limits_hits() {
        let s = shape(ObjectKind::Sphere, vec![0.0, 0.0, 0.0, 1.0]);
        let r = Ray::new(Point3f::new(0.0, 0.0, -5.0), Vector3f::new(0.0, 0.0, 1.0), 3.0);
        assert!(s.intersect(&r).is_none());
    }

    #[test]
    fn degenerate_polygon_is_rejected() {
        let rec = ObjectRecord::new(0, None, ObjectKind::Polygon, "p", vec![], vec![0.0; 9]).unwrap();
        assert!(Shape::from_record(&rec).is_err());
    }
}
