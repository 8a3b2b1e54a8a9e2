//! Scene Store

#[macro_use]
extern crate log;
#[macro_use]
extern crate pest_derive;

mod error;
mod material;
mod object;
mod octfile;
mod octree;
mod parser;
mod primitive;
mod scene;

// Re-export.
pub use error::*;
pub use material::*;
pub use object::*;
pub use octree::*;
pub use parser::SceneParser;
pub use primitive::*;
pub use scene::*;
