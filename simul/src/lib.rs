//! Simulation Manager

#[macro_use]
extern crate log;
#[macro_use]
extern crate pest_derive;

mod callback;
mod config;
mod contrib;
mod error;
mod manager;
mod pool;
mod queue;
mod ray;
mod reorder;
mod sink;
mod tracer;

// Re-export.
pub use callback::*;
pub use config::*;
pub use contrib::*;
pub use error::*;
pub use manager::*;
pub use pool::WorkerPool;
pub use queue::*;
pub use ray::*;
pub use reorder::*;
pub use tracer::{TraceContext, Traced};
