//! BSDF Data and Cache

#[macro_use]
extern crate log;

mod cache;
mod data;
mod error;
mod fourier;
mod interpolation;
mod klems;

// Re-export.
pub use cache::*;
pub use data::*;
pub use error::*;
pub use fourier::*;
pub use klems::*;
