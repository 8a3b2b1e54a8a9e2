//! Contributions

mod accumulator;
mod expr;
mod output;

// Re-export.
pub use accumulator::*;
pub use expr::*;
pub use output::*;
