//! Core

#[macro_use]
extern crate hexf;
#[macro_use]
extern crate log;

// Re-export.
pub mod binio;
pub mod fileutil;
pub mod geometry;
pub mod math;
pub mod rng;
pub mod spectrum;
