//! Scene Errors

use crate::object::ObjectKind;
use rcore::binio::BinaryError;
use thiserror::Error;

/// Errors raised while loading, compiling or saving a scene. Every variant
/// is a load failure for the call that produced it.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Reading a text scene failed.
    #[error("{0}")]
    Read(String),

    /// Reading or writing a binary octree failed.
    #[error(transparent)]
    Binary(#[from] BinaryError),

    /// The octree file was written by an unknown version.
    #[error("unsupported octree version {0}")]
    BadVersion(u32),

    /// A primitive type tag outside the closed set of kinds.
    #[error("unknown primitive type tag {0}")]
    UnknownTag(u8),

    /// A primitive type keyword outside the closed set of kinds.
    #[error("line {line}: unknown primitive type '{name}'")]
    UnknownType { name: String, line: usize },

    /// Wrong number or value of arguments for a primitive.
    #[error("{kind} '{id}': {reason}")]
    BadArguments {
        id: String,
        kind: ObjectKind,
        reason: String,
    },

    /// A modifier was referenced before it was defined.
    #[error("line {line}: undefined modifier '{name}'")]
    UnresolvedModifier { name: String, line: usize },

    /// A modifier exists but cannot modify the object.
    #[error("'{id}' cannot be modified by '{modifier}'")]
    BadModifier { id: String, modifier: String },

    /// Octree structure is inconsistent.
    #[error("malformed octree. {0}")]
    MalformedOctree(String),

    /// The text scene does not follow the record grammar.
    #[error("syntax error. {0}")]
    Syntax(String),

    /// Valid input that this scene store does not handle.
    #[error("unsupported input. {0}")]
    Unsupported(String),
}
