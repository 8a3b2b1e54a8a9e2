//! Octree Files
//!
//! Little endian layout:
//!
//! ```text
//! "RSOCTREE"  magic
//! u32         version
//! f64 x 4     cube centre and size
//! u32         object count
//! records     u8 tag, u32 modifier (u32::MAX = void), string name,
//!             u32 count + strings, u32 count + f64 reals
//! nodes       pre-order; u8 0 = empty, 1 = leaf (u32 count + u32 ids),
//!             2 = branch followed by its eight children
//! ```

use crate::error::SceneError;
use crate::object::*;
use crate::octree::*;
use rcore::binio::*;
use std::io::{Read, Write};

/// Magic bytes at the start of an octree file.
pub const OCTREE_MAGIC: &[u8; 8] = b"RSOCTREE";

/// Current octree file version.
pub const OCTREE_VERSION: u32 = 1;

/// Modifier id stored for `void`.
const VOID_ID: u32 = u32::MAX;

/// Deepest node nesting accepted when reading.
const MAX_READ_DEPTH: usize = 64;

/// Upper bound for any count read from a file.
const MAX_COUNT: usize = 1 << 28;

/// Upper bound for the argument count of one record.
const MAX_ARGS: usize = 1 << 20;

const NODE_EMPTY: u8 = 0;
const NODE_LEAF: u8 = 1;
const NODE_BRANCH: u8 = 2;

/// Write object records and their octree.
///
/// * `w`       - The output.
/// * `objects` - Object records in id order.
/// * `octree`  - The octree.
pub(crate) fn write_octree<W: Write>(w: &mut W, objects: &[ObjectRecord], octree: &Octree) -> Result<(), SceneError> {
    w.write_all(OCTREE_MAGIC).map_err(BinaryError::from)?;
    w.write_u32_le(OCTREE_VERSION)?;
    w.write_vector3f(&octree.center)?;
    w.write_f64_le(octree.size)?;

    w.write_u32_le(objects.len() as u32)?;
    for rec in objects {
        w.write_byte(rec.kind.tag())?;
        w.write_u32_le(rec.modifier.unwrap_or(VOID_ID))?;
        w.write_string(&rec.name)?;
        w.write_u32_le(rec.sargs.len() as u32)?;
        for s in rec.sargs.iter() {
            w.write_string(s)?;
        }
        w.write_u32_le(rec.rargs.len() as u32)?;
        for v in rec.rargs.iter() {
            w.write_f64_le(*v)?;
        }
    }

    write_node(w, &octree.root)
}

fn write_node<W: Write>(w: &mut W, node: &OctNode) -> Result<(), SceneError> {
    match node {
        OctNode::Empty => w.write_byte(NODE_EMPTY)?,
        OctNode::Leaf(ids) => {
            w.write_byte(NODE_LEAF)?;
            w.write_u32_le(ids.len() as u32)?;
            for id in ids {
                w.write_u32_le(*id)?;
            }
        }
        OctNode::Branch(children) => {
            w.write_byte(NODE_BRANCH)?;
            for child in children.iter() {
                write_node(w, child)?;
            }
        }
    }
    Ok(())
}

/// Read object records and their octree.
///
/// * `r` - The input.
pub(crate) fn read_octree<R: Read>(r: &mut R) -> Result<(Vec<ObjectRecord>, Octree), SceneError> {
    r.check_header(OCTREE_MAGIC)?;
    let version = r.read_u32_le()?;
    if version != OCTREE_VERSION {
        return Err(SceneError::BadVersion(version));
    }

    let center = r.read_vector3f()?;
    let size = r.read_f64_le()?;
    if !(size > 0.0 && size.is_finite()) || !center.is_finite() {
        return Err(SceneError::MalformedOctree(format!("invalid cube size {}", size)));
    }

    let n_objects = r.read_count(MAX_COUNT, "object")?;
    let mut objects = Vec::with_capacity(n_objects.min(4096));
    for i in 0..n_objects {
        let kind = ObjectKind::from_tag(r.read_byte()?)?;
        let modifier = match r.read_u32_le()? {
            VOID_ID => None,
            m if (m as usize) < i => Some(m),
            m => {
                return Err(SceneError::UnresolvedModifier {
                    name: format!("#{}", m),
                    line: 0,
                })
            }
        };
        let name = r.read_string()?;

        let n_str = r.read_count(MAX_ARGS, "string argument")?;
        let mut sargs = Vec::with_capacity(n_str.min(64));
        for _ in 0..n_str {
            sargs.push(r.read_string()?);
        }
        let n_real = r.read_count(MAX_ARGS, "real argument")?;
        let rargs = r.read_f64_vec(n_real)?;

        objects.push(ObjectRecord::new(i as ObjId, modifier, kind, &name, sargs, rargs)?);
    }

    let root = read_node(r, n_objects, 0)?;
    Ok((objects, Octree { center, size, root }))
}

fn read_node<R: Read>(r: &mut R, n_objects: usize, depth: usize) -> Result<OctNode, SceneError> {
    if depth > MAX_READ_DEPTH {
        return Err(SceneError::MalformedOctree(format!("nesting deeper than {}", MAX_READ_DEPTH)));
    }
    match r.read_byte()? {
        NODE_EMPTY => Ok(OctNode::Empty),
        NODE_LEAF => {
            let n = r.read_count(n_objects, "leaf object")?;
            let mut ids = Vec::with_capacity(n);
            for _ in 0..n {
                let id = r.read_u32_le()?;
                if id as usize >= n_objects {
                    return Err(SceneError::MalformedOctree(format!(
                        "object id {} out of range 0..{}",
                        id, n_objects
                    )));
                }
                ids.push(id);
            }
            Ok(OctNode::Leaf(ids))
        }
        NODE_BRANCH => {
            let mut children: [OctNode; 8] = Default::default();
            for child in children.iter_mut() {
                *child = read_node(r, n_objects, depth + 1)?;
            }
            Ok(OctNode::Branch(Box::new(children)))
        }
        tag => Err(SceneError::MalformedOctree(format!("unknown node type {}", tag))),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
