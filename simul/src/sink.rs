//! Result Sink
//!
//! Workers finish rays out of order. The sink restores submission order
//! with a reorder buffer before it commits contributions, issues FIFO
//! cooked callbacks and stores results, so the outcome of a run does not
//! depend on the number of workers.

use crate::config::*;
use crate::contrib::Accumulator;
use crate::ray::*;
use crate::reorder::ReorderBuffer;
use crate::tracer::*;
use parking_lot::Mutex;
use std::sync::Arc;

struct SinkState {
    /// `None` marks a ray that was discarded instead of traced.
    reorder: ReorderBuffer<Option<Traced>>,
    results: Vec<RayResult>,
    summary: RunSummary,
}

/// Receives traced rays from workers.
pub struct Sink {
    state: Mutex<SinkState>,
    ctx: Arc<TraceContext>,
    accumulator: Option<Arc<Accumulator>>,
    keep_results: bool,
}

impl Sink {
    /// Create a sink.
    ///
    /// * `ctx`         - Trace context; used for FIFO cooked callbacks.
    /// * `accumulator` - Accumulator in contribution mode.
    /// * `first_seq`   - Sequence number of the first ray to be delivered.
    /// * `config`      - Manager configuration.
    pub fn new(
        ctx: Arc<TraceContext>,
        accumulator: Option<Arc<Accumulator>>,
        first_seq: u64,
        config: &SimulConfig,
    ) -> Self {
        Self {
            state: Mutex::new(SinkState {
                reorder: ReorderBuffer::starting_at(first_seq),
                results: vec![],
                summary: RunSummary::default(),
            }),
            ctx,
            accumulator,
            keep_results: config.keep_results,
        }
    }

    /// Returns true if cooked callbacks are issued here in submission order.
    pub fn is_fifo(&self) -> bool {
        self.ctx.flags().contains(RtFlags::DO_FIFO)
    }

    /// Accept a traced ray and commit every ray that is now in order.
    ///
    /// * `traced` - The traced ray.
    pub fn deliver(&self, traced: Traced) {
        let seq = traced.result.seq;
        self.release(seq, Some(traced));
    }

    /// Account for a ray that was admitted but never traced. Later rays are
    /// still released in order.
    ///
    /// * `seq` - Sequence number of the ray.
    pub fn discard(&self, seq: u64) {
        self.release(seq, None);
    }

    fn release(&self, seq: u64, traced: Option<Traced>) {
        let mut state = self.state.lock();
        for (_, t) in state.reorder.insert(seq, traced) {
            let mut t = match t {
                Some(t) => t,
                None => {
                    state.summary.discarded += 1;
                    continue;
                }
            };
            if self.is_fifo() {
                self.ctx.cook(&mut t);
            }
            if let Some(acc) = self.accumulator.as_ref() {
                acc.commit(&t.contributions);
            }

            if t.result.is_ok() {
                state.summary.succeeded += 1;
            } else {
                state.summary.failed += 1;
            }
            if self.keep_results {
                state.results.push(t.result);
            }
        }
    }

    /// Remove and return the committed results in submission order.
    pub fn take_results(&self) -> Vec<RayResult> {
        std::mem::take(&mut self.state.lock().results)
    }

    /// Returns the counts of processed rays.
    pub fn summary(&self) -> RunSummary {
        self.state.lock().summary
    }

    /// Returns the number of rays waiting for an earlier ray.
    pub fn held(&self) -> usize {
        self.state.lock().reorder.held()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{ArcCallback, Callbacks};
    use crate::contrib::*;
    use bsdf::BsdfCache;
    use rcore::geometry::*;
    use rcore::spectrum::Spectrum;
    use scene::{BuildOptions, Scene};

    fn context(config: &SimulConfig, callbacks: Callbacks, acc: Option<&Accumulator>) -> Arc<TraceContext> {
        let scene = Scene::from_text("void glow sky 0 0 4 1 1 1 0\nsky source dome 0 0 4 0 0 1 360", &BuildOptions::default())
            .unwrap();
        let modifiers = acc.map(|a| a.modifiers()).unwrap_or_default();
        Arc::new(TraceContext::new(
            Arc::new(scene),
            Arc::new(BsdfCache::new()),
            config,
            callbacks,
            modifiers,
        ))
    }

    fn traced(ctx: &TraceContext, seq: u64) -> Traced {
        let input = RayInput::new(Point3f::zero(), Vector3f::new(0.0, 0.0, 1.0));
        ctx.trace(&RayWorkItem::new(&input, seq, 0))
    }

    #[test]
    fn results_are_committed_in_sequence() {
        let config = SimulConfig::new(4);
        let ctx = context(&config, Callbacks::default(), None);
        let sink = Sink::new(Arc::clone(&ctx), None, 0, &config);

        sink.deliver(traced(&ctx, 2));
        sink.deliver(traced(&ctx, 1));
        assert!(sink.take_results().is_empty());
        assert_eq!(sink.held(), 2);

        sink.deliver(traced(&ctx, 0));
        let seqs: Vec<u64> = sink.take_results().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(sink.summary().succeeded, 3);
    }

    #[test]
    fn fifo_cooked_callbacks_follow_submission_order() {
        let order = Arc::new(parking_lot::Mutex::new(vec![]));
        let o = Arc::clone(&order);
        let cooked: ArcCallback = Arc::new(move |r: &RayResult| {
            o.lock().push(r.seq);
            0
        });
        let config = SimulConfig::new(4).flags(RtFlags::DO_FIFO);
        let ctx = context(&config, Callbacks::new(None, Some(cooked)), None);
        let sink = Sink::new(Arc::clone(&ctx), None, 0, &config);

        for seq in [3, 1, 0, 2] {
            sink.deliver(traced(&ctx, seq));
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn contributions_are_committed_once() {
        let config = SimulConfig::new(4).mode(SimulMode::Contrib).keep_results(false);
        let acc = Arc::new(Accumulator::new(&config));
        acc.register("sky", BinSelector::single(), 1, OutputTarget::None).unwrap();
        let ctx = context(&config, Callbacks::default(), Some(&acc));
        let sink = Sink::new(Arc::clone(&ctx), Some(Arc::clone(&acc)), 0, &config);

        for seq in (0..5).rev() {
            sink.deliver(traced(&ctx, seq));
        }
        let bins = acc.snapshot("sky").unwrap();
        assert_eq!(bins[0].count, 5);
        assert_eq!(bins[0].sum, Spectrum::new(5.0));
        assert!(sink.take_results().is_empty());
        assert_eq!(sink.summary().completed(), 5);
    }

    #[test]
    fn failures_are_counted() {
        let config = SimulConfig::new(4);
        let ctx = context(&config, Callbacks::default(), None);
        let sink = Sink::new(Arc::clone(&ctx), None, 0, &config);
        let bad = RayInput::new(Point3f::zero(), Vector3f::zero());
        sink.deliver(ctx.trace(&RayWorkItem::new(&bad, 0, 0)));
        sink.deliver(traced(&ctx, 1));
        sink.discard(2);
        sink.discard(3);
        assert_eq!(
            sink.summary(),
            RunSummary {
                succeeded: 1,
                failed: 1,
                discarded: 2
            }
        );
    }

    #[test]
    fn discarded_rays_do_not_hold_back_later_rays() {
        let config = SimulConfig::new(4);
        let ctx = context(&config, Callbacks::default(), None);
        let sink = Sink::new(Arc::clone(&ctx), None, 0, &config);

        sink.deliver(traced(&ctx, 0));
        sink.deliver(traced(&ctx, 2));
        assert_eq!(sink.held(), 1);
        sink.discard(1);
        assert_eq!(sink.held(), 0);

        let seqs: Vec<u64> = sink.take_results().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 2]);
        assert_eq!(sink.summary().completed() + sink.summary().discarded, 3);
    }
}
