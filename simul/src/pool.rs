//! Worker Pool

use crate::queue::RayQueue;
use crate::ray::*;
use crate::sink::Sink;
use crate::tracer::*;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Takes a work item from the queue to the sink.
pub(crate) struct Dispatch {
    pub ctx: Arc<TraceContext>,
    pub sink: Arc<Sink>,
    pub queue: Arc<RayQueue>,

    /// Set by a hard cleanup; items dequeued afterwards are discarded.
    pub cancelled: AtomicBool,
}

impl Dispatch {
    /// Create a dispatcher.
    ///
    /// * `ctx`   - Trace context.
    /// * `sink`  - Result sink.
    /// * `queue` - The ray queue.
    pub fn new(ctx: Arc<TraceContext>, sink: Arc<Sink>, queue: Arc<RayQueue>) -> Self {
        Self {
            ctx,
            sink,
            queue,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Trace one item and deliver it. A panic while tracing fails only that
    /// ray.
    ///
    /// * `item` - The work item.
    pub fn run(&self, item: RayWorkItem) {
        let _done = Completion(&self.queue);
        if self.is_cancelled() {
            self.sink.discard(item.seq);
            return;
        }

        let ctx = &self.ctx;
        let mut traced = match catch_unwind(AssertUnwindSafe(|| ctx.trace(&item))) {
            Ok(t) => t,
            Err(_) => {
                error!("Tracing ray #{} panicked", item.seq);
                Traced {
                    result: RayResult::failed(&item, String::from("tracer panicked")),
                    contributions: vec![],
                }
            }
        };
        if !self.sink.is_fifo() {
            ctx.cook(&mut traced);
        }
        self.sink.deliver(traced);
    }

    /// Trace queued items on the calling thread until the queue is empty.
    pub fn run_queued(&self) -> usize {
        let mut n = 0;
        while let Some(item) = self.queue.try_dequeue() {
            self.run(item);
            n += 1;
        }
        n
    }

    /// Stop tracing; items dequeued from now on are discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true after `cancel()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Marks a dequeued item complete when dropped, however its processing ends.
struct Completion<'a>(&'a RayQueue);

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.0.complete(1);
    }
}

/// A worker thread and the channel that stops it.
struct Worker {
    id: usize,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// A resizable set of threads pulling rays from the queue.
pub struct WorkerPool {
    dispatch: Arc<Dispatch>,
    workers: Vec<Worker>,
    next_id: usize,
}

impl WorkerPool {
    /// Create a pool without threads.
    ///
    /// * `dispatch` - Shared dispatcher.
    pub(crate) fn new(dispatch: Arc<Dispatch>) -> Self {
        Self {
            dispatch,
            workers: vec![],
            next_id: 0,
        }
    }

    /// Returns the number of threads.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns true if rays are traced on the calling thread.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start or stop threads so that `n` are running. Stopped threads finish
    /// the ray they are tracing first.
    ///
    /// * `n` - Number of threads.
    pub fn resize(&mut self, n: usize) {
        while self.workers.len() < n {
            let id = self.next_id;
            self.next_id += 1;
            let (stop, stopped) = bounded(1);
            let dispatch = Arc::clone(&self.dispatch);
            let work = self.dispatch.queue.receiver();
            let handle = thread::Builder::new()
                .name(format!("ray-worker-{}", id))
                .spawn(move || worker_loop(id, dispatch, work, stopped));
            match handle {
                Ok(handle) => self.workers.push(Worker { id, stop, handle }),
                Err(e) => {
                    error!("Unable to start worker {}. {}", id, e);
                    break;
                }
            }
        }

        if self.workers.len() > n {
            let stopping = self.workers.split_off(n);
            for w in stopping.iter() {
                let _ = w.stop.send(());
            }
            for w in stopping {
                join(w);
            }
        }
    }

    /// Wait for every thread to exit. Threads exit once the queue is closed
    /// and empty.
    pub fn join(&mut self) {
        for w in self.workers.drain(..) {
            join(w);
        }
    }

    /// Stop every thread after its current ray.
    pub fn shutdown(&mut self) {
        self.resize(0);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join(w: Worker) {
    if w.handle.join().is_err() {
        error!("Worker {} panicked", w.id);
    }
}

fn worker_loop(id: usize, dispatch: Arc<Dispatch>, work: Receiver<RayWorkItem>, stop: Receiver<()>) {
    debug!("Worker {} started", id);
    let mut traced = 0_u64;
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(work) -> msg => match msg {
                Ok(item) => {
                    dispatch.run(item);
                    traced += 1;
                }
                Err(_) => break,
            },
        }
    }
    debug!("Worker {} stopped after {} rays", id, traced);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Callbacks;
    use crate::config::SimulConfig;
    use bsdf::BsdfCache;
    use rcore::geometry::*;
    use scene::{BuildOptions, Scene};

    fn dispatch(capacity: usize) -> Arc<Dispatch> {
        let config = SimulConfig::new(capacity);
        let scene = Scene::from_text("void light l 0 0 3 1 1 1\nl sphere s 0 0 4 0 0 0 1", &BuildOptions::default())
            .unwrap();
        let ctx = Arc::new(TraceContext::new(
            Arc::new(scene),
            Arc::new(BsdfCache::new()),
            &config,
            Callbacks::default(),
            vec![],
        ));
        let sink = Arc::new(Sink::new(Arc::clone(&ctx), None, 0, &config));
        Arc::new(Dispatch::new(ctx, sink, Arc::new(RayQueue::new(capacity))))
    }

    fn ray() -> RayInput {
        RayInput::new(Point3f::new(0.0, 0.0, -5.0), Vector3f::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn workers_drain_the_queue() {
        let d = dispatch(16);
        let mut pool = WorkerPool::new(Arc::clone(&d));
        pool.resize(3);
        assert_eq!(pool.len(), 3);
        for _ in 0..100 {
            d.queue.enqueue(&ray(), 0).unwrap();
        }
        d.queue.wait_idle();
        assert_eq!(d.sink.summary().succeeded, 100);

        d.queue.close();
        pool.join();
        assert!(pool.is_empty());
    }

    #[test]
    fn shrinking_stops_threads() {
        let d = dispatch(4);
        let mut pool = WorkerPool::new(Arc::clone(&d));
        pool.resize(4);
        pool.resize(1);
        assert_eq!(pool.len(), 1);
        d.queue.enqueue(&ray(), 0).unwrap();
        d.queue.wait_idle();
        assert_eq!(d.sink.summary().succeeded, 1);
        pool.shutdown();
        assert!(pool.is_empty());
    }

    #[test]
    fn cancelled_items_are_discarded() {
        let d = dispatch(8);
        for _ in 0..5 {
            d.queue.enqueue(&ray(), 0).unwrap();
        }
        d.cancel();
        assert_eq!(d.run_queued(), 5);
        assert_eq!(d.sink.summary().discarded, 5);
        assert_eq!(d.queue.pending(), 0);
    }

    #[test]
    fn queued_items_run_inline() {
        let d = dispatch(8);
        for _ in 0..8 {
            d.queue.enqueue(&ray(), 0).unwrap();
        }
        assert_eq!(d.run_queued(), 8);
        let results = d.sink.take_results();
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|r| r.value[0] == 1.0));
    }
}
