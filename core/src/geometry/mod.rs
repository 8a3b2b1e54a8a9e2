//! Geometry

mod bounds3;
mod frame;
mod ray;
mod vector3;

// Re-export
pub use bounds3::*;
pub use frame::*;
pub use ray::*;
pub use vector3::*;
