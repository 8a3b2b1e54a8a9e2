//! Callbacks

use crate::ray::RayResult;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Status recorded when a callback panics.
pub const CALLBACK_PANICKED: i32 = -1;

/// A user callback for traced rays. A non-zero return value skips the
/// remaining processing of the ray; it never stops the pool.
pub trait RayCallback: Send + Sync {
    /// Called with a traced ray.
    ///
    /// * `result` - The ray.
    fn call(&self, result: &RayResult) -> i32;
}

impl<F> RayCallback for F
where
    F: Fn(&RayResult) -> i32 + Send + Sync,
{
    fn call(&self, result: &RayResult) -> i32 {
        self(result)
    }
}

/// Shared callback.
pub type ArcCallback = Arc<dyn RayCallback>;

/// The callbacks installed on a manager.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Called for every traced segment of a ray.
    pub traced: Option<ArcCallback>,

    /// Called once per primary ray with its final value.
    pub cooked: Option<ArcCallback>,
}

impl Callbacks {
    /// Create from optional callbacks.
    ///
    /// * `traced` - Segment callback.
    /// * `cooked` - Final value callback.
    pub fn new(traced: Option<ArcCallback>, cooked: Option<ArcCallback>) -> Self {
        Self { traced, cooked }
    }

    /// Call the segment callback. Returns 0 when none is installed.
    ///
    /// * `result` - The segment.
    pub fn traced(&self, result: &RayResult) -> i32 {
        self.traced.as_ref().map_or(0, |cb| guarded(cb, result))
    }

    /// Call the final value callback. Returns 0 when none is installed.
    ///
    /// * `result` - The primary ray.
    pub fn cooked(&self, result: &RayResult) -> i32 {
        self.cooked.as_ref().map_or(0, |cb| guarded(cb, result))
    }
}

/// Call a callback; a panic becomes `CALLBACK_PANICKED`.
fn guarded(cb: &ArcCallback, result: &RayResult) -> i32 {
    match catch_unwind(AssertUnwindSafe(|| cb.call(result))) {
        Ok(status) => status,
        Err(_) => {
            error!("Callback panicked on ray #{}", result.seq);
            CALLBACK_PANICKED
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("traced", &self.traced.is_some())
            .field("cooked", &self.cooked.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ray::*;
    use rcore::geometry::*;

    fn result(seq: u64) -> RayResult {
        let input = RayInput::new(Point3f::zero(), Vector3f::new(0.0, 0.0, 1.0));
        RayResult::failed(&RayWorkItem::new(&input, seq, 0), String::new())
    }

    #[test]
    fn missing_callbacks_return_zero() {
        let cbs = Callbacks::default();
        assert_eq!(cbs.traced(&result(0)), 0);
        assert_eq!(cbs.cooked(&result(0)), 0);
    }

    #[test]
    fn panicking_callbacks_report_a_status() {
        let cb: ArcCallback = Arc::new(|r: &RayResult| {
            if r.seq == 3 {
                panic!("bad ray");
            }
            7
        });
        let cbs = Callbacks::new(Some(Arc::clone(&cb)), Some(cb));
        assert_eq!(cbs.traced(&result(1)), 7);
        assert_eq!(cbs.traced(&result(3)), CALLBACK_PANICKED);
        assert_eq!(cbs.cooked(&result(3)), CALLBACK_PANICKED);
        assert_eq!(cbs.cooked(&result(4)), 7);
    }
}
