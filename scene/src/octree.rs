//! Octree
//!
//! Spatial index over the bounded surfaces of a scene. Objects are referenced
//! by id from every leaf their bounds overlap.

use crate::object::ObjId;
use rcore::geometry::*;
use rcore::math::*;
use std::cmp::Ordering;

/// Default maximum subdivision depth.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default number of objects a leaf may hold before it is subdivided.
pub const DEFAULT_MAX_LEAF: usize = 6;

/// Octree build options.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BuildOptions {
    /// Maximum subdivision depth.
    pub max_depth: usize,

    /// Number of objects a leaf may hold before it is subdivided.
    pub max_leaf: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_leaf: DEFAULT_MAX_LEAF,
        }
    }
}

/// Octree node.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum OctNode {
    #[default]
    Empty,
    Leaf(Vec<ObjId>),
    /// Children in the order given by `child_bounds()`.
    Branch(Box<[OctNode; 8]>),
}

/// Octree over a bounding cube.
#[derive(Clone, Debug, PartialEq)]
pub struct Octree {
    /// Centre of the cube.
    pub center: Point3f,

    /// Side length of the cube.
    pub size: Float,

    /// Root node.
    pub root: OctNode,
}

impl Octree {
    /// Build an octree.
    ///
    /// * `objects` - Object ids and their bounds.
    /// * `options` - Build options.
    pub fn build(objects: &[(ObjId, Bounds3f)], options: &BuildOptions) -> Self {
        let all = objects.iter().fold(Bounds3f::empty(), |b, (_, ob)| b.union(ob));
        let (center, size) = if all.is_empty() {
            (Point3f::zero(), 1.0)
        } else {
            // Pad so that geometry on the cube faces is strictly inside.
            let extent = all.diagonal().max_component();
            (all.centroid(), extent * (1.0 + 1e-6) + 1e-6)
        };

        let octree = Self {
            center,
            size,
            root: OctNode::Empty,
        };
        let root = build_node(&octree.bounds(), objects.to_vec(), 0, options);
        debug!(
            "Built octree: {} objects, {} nodes, depth {}",
            objects.len(),
            count_nodes(&root),
            node_depth(&root)
        );
        Self { root, ..octree }
    }

    /// Returns the bounding cube.
    pub fn bounds(&self) -> Bounds3f {
        let h = self.size * 0.5;
        Bounds3f::cube(self.center - Vector3f::new(h, h, h), self.size)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        count_nodes(&self.root)
    }

    /// Returns the depth of the deepest node; a lone root has depth 0.
    pub fn depth(&self) -> usize {
        node_depth(&self.root)
    }

    /// Calls `f` for every object id referenced by a leaf.
    ///
    /// * `f` - The callback.
    pub fn for_each_id<F: FnMut(ObjId)>(&self, mut f: F) {
        fn visit<F: FnMut(ObjId)>(node: &OctNode, f: &mut F) {
            match node {
                OctNode::Empty => (),
                OctNode::Leaf(ids) => ids.iter().for_each(|&id| f(id)),
                OctNode::Branch(children) => children.iter().for_each(|c| visit(c, f)),
            }
        }
        visit(&self.root, &mut f);
    }

    /// Returns the closest hit along the ray. `test` is called with an object
    /// id and the current distance limit and returns the object's hit, if any,
    /// closer than the limit.
    ///
    /// * `ray`  - The ray.
    /// * `test` - Object intersection test.
    pub fn closest_hit<T, F>(&self, ray: &Ray, mut test: F) -> Option<(Float, T)>
    where
        F: FnMut(ObjId, &Ray) -> Option<(Float, T)>,
    {
        let mut best: Option<(Float, T)> = None;
        visit_node(&self.root, &self.bounds(), ray, &mut test, &mut best);
        best
    }
}

/// Returns the bounds of the `i`th child. Bit 0 selects the upper x half,
/// bit 1 the upper y half and bit 2 the upper z half.
///
/// * `b` - Parent bounds.
/// * `i` - Child index.
pub fn child_bounds(b: &Bounds3f, i: usize) -> Bounds3f {
    let half = (b.p_max.x - b.p_min.x) * 0.5;
    let mut origin = b.p_min;
    for axis in 0..3 {
        if i & (1 << axis) != 0 {
            origin[axis] += half;
        }
    }
    Bounds3f::cube(origin, half)
}

fn build_node(
    bounds: &Bounds3f,
    objects: Vec<(ObjId, Bounds3f)>,
    depth: usize,
    options: &BuildOptions,
) -> OctNode {
    if objects.is_empty() {
        return OctNode::Empty;
    }
    if objects.len() <= options.max_leaf || depth >= options.max_depth {
        return OctNode::Leaf(objects.iter().map(|(id, _)| *id).collect());
    }

    let children: [OctNode; 8] = std::array::from_fn(|i| {
        let cb = child_bounds(bounds, i);
        let inside: Vec<(ObjId, Bounds3f)> =
            objects.iter().filter(|(_, ob)| ob.overlaps(&cb)).copied().collect();
        build_node(&cb, inside, depth + 1, options)
    });
    OctNode::Branch(Box::new(children))
}

fn visit_node<T, F>(node: &OctNode, bounds: &Bounds3f, ray: &Ray, test: &mut F, best: &mut Option<(Float, T)>)
where
    F: FnMut(ObjId, &Ray) -> Option<(Float, T)>,
{
    let limit = best.as_ref().map_or(ray.t_max, |(t, _)| *t);
    match node {
        OctNode::Empty => (),
        OctNode::Leaf(ids) => {
            for &id in ids {
                let limit = best.as_ref().map_or(ray.t_max, |(t, _)| *t);
                if let Some((t, v)) = test(id, &Ray::new(ray.o, ray.d, limit)) {
                    if t < limit {
                        *best = Some((t, v));
                    }
                }
            }
        }
        OctNode::Branch(children) => {
            // Visit the children the ray enters, nearest first.
            let clipped = Ray::new(ray.o, ray.d, limit);
            let mut order: Vec<(Float, usize)> = (0..8)
                .filter_map(|i| {
                    child_bounds(bounds, i)
                        .intersect_p(&clipped)
                        .map(|(t0, _)| (t0, i))
                })
                .collect();
            order.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            for (t0, i) in order {
                if let Some((t, _)) = best.as_ref() {
                    if *t < t0 {
                        break;
                    }
                }
                visit_node(&children[i], &child_bounds(bounds, i), ray, test, best);
            }
        }
    }
}

fn count_nodes(node: &OctNode) -> usize {
    match node {
        OctNode::Branch(children) => 1 + children.iter().map(count_nodes).sum::<usize>(),
        _ => 1,
    }
}

fn node_depth(node: &OctNode) -> usize {
    match node {
        OctNode::Branch(children) => 1 + children.iter().map(node_depth).max().unwrap_or(0),
        _ => 0,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_box(x: Float, y: Float, z: Float) -> Bounds3f {
        Bounds3f::cube(Point3f::new(x, y, z), 1.0)
    }

    /// Brute force hit test treating each object's box as the object.
    fn box_test<'a>(objects: &'a [(ObjId, Bounds3f)]) -> impl FnMut(ObjId, &Ray) -> Option<(Float, ObjId)> + 'a {
        move |id, ray| {
            let b = objects.iter().find(|(i, _)| *i == id)?.1;
            b.intersect_p(ray).map(|(t0, _)| (t0, id))
        }
    }

    #[test]
    fn small_sets_stay_in_one_leaf() {
        let objects = vec![(0, unit_box(0.0, 0.0, 0.0)), (1, unit_box(3.0, 0.0, 0.0))];
        let oct = Octree::build(&objects, &BuildOptions::default());
        assert_eq!(oct.root, OctNode::Leaf(vec![0, 1]));
        assert_eq!(oct.depth(), 0);
    }

    #[test]
    fn large_sets_are_subdivided_within_depth() {
        let objects: Vec<(ObjId, Bounds3f)> = (0..64)
            .map(|i| (i as ObjId, unit_box((i % 4) as Float * 2.0, ((i / 4) % 4) as Float * 2.0, (i / 16) as Float * 2.0)))
            .collect();
        let options = BuildOptions {
            max_depth: 3,
            max_leaf: 2,
        };
        let oct = Octree::build(&objects, &options);
        assert!(oct.depth() >= 1 && oct.depth() <= 3);

        let mut seen = vec![false; 64];
        oct.for_each_id(|id| seen[id as usize] = true);
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn empty_tree_has_unit_cube() {
        let oct = Octree::build(&[], &BuildOptions::default());
        assert_eq!(oct.root, OctNode::Empty);
        assert_eq!(oct.size, 1.0);
        let r = Ray::unbounded(Point3f::zero(), Vector3f::new(0.0, 0.0, 1.0));
        assert!(oct.closest_hit(&r, |_, _| Some((1.0, ()))).is_none());
    }

    proptest! {
        #[test]
        fn closest_hit_matches_brute_force(
            seed in prop::collection::vec((-10.0..10.0f64, -10.0..10.0f64, -10.0..10.0f64), 1..40),
            dx in -1.0..1.0f64, dy in -1.0..1.0f64, dz in -1.0..1.0f64,
        ) {
            let d = Vector3f::new(dx, dy, dz);
            prop_assume!(d.length() > 0.1);
            let objects: Vec<(ObjId, Bounds3f)> = seed
                .iter()
                .enumerate()
                .map(|(i, (x, y, z))| (i as ObjId, unit_box(*x, *y, *z)))
                .collect();
            let oct = Octree::build(&objects, &BuildOptions { max_depth: 4, max_leaf: 2 });
            let ray = Ray::unbounded(Point3f::new(-20.0, 0.5, 0.5), d.normalize());

            let expected = objects
                .iter()
                .filter_map(|(_, b)| b.intersect_p(&ray).map(|(t0, _)| t0))
                .fold(None, |m: Option<Float>, t| Some(m.map_or(t, |m| m.min(t))));
            let got = oct.closest_hit(&ray, box_test(&objects)).map(|(t, _)| t);
            prop_assert_eq!(got, expected);
        }
    }
}
