//! Simulation Manager
//!
//! Lifecycle: `Unconfigured → SceneLoaded → Running → Draining → Stopped`.
//! The first enqueue starts the run: it freezes the scene, callbacks and
//! modifiers into a trace context and starts the workers.

use crate::callback::*;
use crate::config::*;
use crate::contrib::*;
use crate::error::SimulError;
use crate::pool::*;
use crate::queue::*;
use crate::ray::*;
use crate::sink::Sink;
use crate::tracer::TraceContext;
use arc_swap::ArcSwapOption;
use bsdf::BsdfCache;
use parking_lot::Mutex;
use scene::{Scene, SceneHandle};
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a simulation manager.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ManagerState {
    /// No scene loaded.
    Unconfigured,

    /// Scene loaded; threads, modifiers and callbacks may be set.
    SceneLoaded,

    /// Rays have been enqueued.
    Running,

    /// Cleanup in progress.
    Draining,

    /// Cleaned up.
    Stopped,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unconfigured => "unconfigured",
            Self::SceneLoaded => "scene loaded",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// The pipeline of a run.
struct Run {
    dispatch: Arc<Dispatch>,
    pool: WorkerPool,
}

struct Inner {
    state: ManagerState,
    threads: usize,
    callbacks: Callbacks,
    run: Option<Run>,
}

/// Dispatches rays to worker threads against a shared scene and returns
/// results in submission order, or accumulates them into modifier bins.
pub struct SimulManager {
    config: SimulConfig,
    scene: ArcSwapOption<Scene>,
    bsdfs: Arc<BsdfCache>,
    queue: Arc<RayQueue>,
    accumulator: Arc<Accumulator>,
    inner: Mutex<Inner>,
}

impl SimulManager {
    /// Create a manager.
    ///
    /// * `config` - Configuration.
    pub fn new(config: SimulConfig) -> Result<Self, SimulError> {
        Self::with_cache(config, Arc::new(BsdfCache::new()))
    }

    /// Create a manager that loads BSDFs through a given cache.
    ///
    /// * `config` - Configuration.
    /// * `bsdfs`  - BSDF cache.
    pub fn with_cache(config: SimulConfig, bsdfs: Arc<BsdfCache>) -> Result<Self, SimulError> {
        if config.queue_capacity == 0 {
            return Err(SimulError::InvalidConfig(String::from(
                "queue capacity must be positive",
            )));
        }
        let queue = Arc::new(RayQueue::new(config.queue_capacity));
        let accumulator = Arc::new(Accumulator::new(&config));
        let threads = config.threads;
        Ok(Self {
            config,
            scene: ArcSwapOption::const_empty(),
            bsdfs,
            queue,
            accumulator,
            inner: Mutex::new(Inner {
                state: ManagerState::Unconfigured,
                threads,
                callbacks: Callbacks::default(),
                run: None,
            }),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SimulConfig {
        &self.config
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.inner.lock().state
    }

    /// Returns true if a scene is loaded and the manager is not stopped.
    pub fn ready(&self) -> bool {
        matches!(self.state(), ManagerState::SceneLoaded | ManagerState::Running)
    }

    /// Returns the number of admitted rays that have not produced a result.
    pub fn pending(&self) -> u64 {
        self.queue.pending()
    }

    /// Load the scene from an octree file. A second load fails or replaces
    /// the scene according to the scene policy; it always fails once rays
    /// have been enqueued.
    ///
    /// * `path` - The octree file.
    pub fn load_octree(&self, path: &str) -> Result<(), SimulError> {
        let mut inner = self.inner.lock();
        check(&inner, "load_octree", &[ManagerState::Unconfigured, ManagerState::SceneLoaded])?;
        if inner.state == ManagerState::SceneLoaded && self.config.scene_policy == ScenePolicy::Reject {
            return Err(SimulError::InvalidState {
                op: "load_octree",
                state: inner.state,
            });
        }

        let scene = Scene::load(path)?;
        if self.scene.swap(Some(Arc::new(scene))).is_some() {
            info!("Replaced scene with '{}'", path);
        }
        transition(&mut inner, ManagerState::SceneLoaded);
        Ok(())
    }

    /// Returns the loaded scene.
    pub fn scene(&self) -> Result<SceneHandle, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "scene", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        self.scene.load_full().ok_or(SimulError::InvalidState {
            op: "scene",
            state: inner.state,
        })
    }

    /// Set the number of worker threads. 0 traces rays on the calling thread
    /// during `enqueue()` and `flush()`.
    ///
    /// * `n` - Number of threads.
    pub fn set_thread_count(&self, n: usize) -> Result<(), SimulError> {
        let mut inner = self.inner.lock();
        check(&inner, "set_thread_count", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        inner.threads = n;
        if let Some(run) = inner.run.as_mut() {
            run.pool.resize(n);
        }
        debug!("Thread count set to {}", n);
        Ok(())
    }

    /// Returns the number of worker threads.
    pub fn thread_count(&self) -> Result<usize, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "thread_count", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        Ok(inner.threads)
    }

    /// Install the callbacks.
    ///
    /// * `traced` - Called for every traced segment.
    /// * `cooked` - Called once per primary ray with its final value.
    pub fn set_callbacks(&self, traced: Option<ArcCallback>, cooked: Option<ArcCallback>) -> Result<(), SimulError> {
        let mut inner = self.inner.lock();
        check(&inner, "set_callbacks", &[ManagerState::SceneLoaded])?;
        inner.callbacks = Callbacks::new(traced, cooked);
        Ok(())
    }

    /// Remove the callbacks.
    pub fn clear_callbacks(&self) -> Result<(), SimulError> {
        self.set_callbacks(None, None)
    }

    /// Register a modifier in contribution mode.
    ///
    /// * `name`      - Name of the material whose hits contribute.
    /// * `selector`  - Bin selector.
    /// * `bin_count` - Number of bins.
    /// * `target`    - Where records go.
    pub fn register_modifier(
        &self,
        name: &str,
        selector: BinSelector,
        bin_count: usize,
        target: OutputTarget,
    ) -> Result<usize, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "register_modifier", &[ManagerState::SceneLoaded])?;
        if self.config.mode != SimulMode::Contrib {
            return Err(SimulError::InvalidModifier {
                name: name.to_string(),
                reason: String::from("manager is in trace mode"),
            });
        }
        if let Some(scene) = self.scene.load_full() {
            if !scene.find(name).map_or(false, |rec| rec.kind.is_material()) {
                warn!("Modifier '{}' is not a material of the scene", name);
            }
        }
        self.accumulator.register(name, selector, bin_count, target)
    }

    /// Register every modifier named in a file with a shared selector, bin
    /// count and output template.
    ///
    /// * `path`      - File of white space separated modifier names.
    /// * `selector`  - Bin selector.
    /// * `bin_count` - Number of bins.
    /// * `template`  - Output path template; `%s` is replaced by each name.
    pub fn register_modifier_file(
        &self,
        path: &str,
        selector: BinSelector,
        bin_count: usize,
        template: Option<&str>,
    ) -> Result<Vec<usize>, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "register_modifier_file", &[ManagerState::SceneLoaded])?;
        if self.config.mode != SimulMode::Contrib {
            return Err(SimulError::InvalidModifier {
                name: path.to_string(),
                reason: String::from("manager is in trace mode"),
            });
        }
        let ids = self.accumulator.register_from_file(path, &selector, bin_count, template)?;
        if let Some(scene) = self.scene.load_full() {
            let modifiers = self.accumulator.modifiers();
            for m in ids.iter().filter_map(|&id| modifiers.get(id)) {
                if !scene.find(&m.name).map_or(false, |rec| rec.kind.is_material()) {
                    warn!("Modifier '{}' is not a material of the scene", m.name);
                }
            }
        }
        Ok(ids)
    }

    /// Returns the names of the registered modifiers in registration order.
    pub fn modifier_names(&self) -> Result<Vec<String>, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "modifier_names", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        Ok(self.accumulator.modifiers().iter().map(|m| m.name.clone()).collect())
    }

    /// Remove every modifier.
    pub fn clear_modifiers(&self) -> Result<(), SimulError> {
        let inner = self.inner.lock();
        check(&inner, "clear_modifiers", &[ManagerState::SceneLoaded])?;
        self.accumulator.clear();
        Ok(())
    }

    /// Admit rays, blocking while the queue is full. Returns the sequence
    /// number of the first ray.
    ///
    /// * `rays`   - The bundle.
    /// * `bundle` - Correlation id attached to every ray of the bundle.
    pub fn enqueue(&self, rays: &[RayInput], bundle: u64) -> Result<u64, SimulError> {
        let (dispatch, inline) = self.start("enqueue")?;
        let mut first = None;
        for ray in rays {
            let seq = if inline {
                loop {
                    match self.queue.try_enqueue(ray, bundle) {
                        Ok(seq) => break seq,
                        Err(AdmitError::Full) => {
                            dispatch.run_queued();
                        }
                        Err(AdmitError::Closed) => return Err(SimulError::ManagerStopped),
                    }
                }
            } else {
                self.queue.enqueue(ray, bundle).map_err(|_| SimulError::ManagerStopped)?
            };
            first.get_or_insert(seq);
        }
        trace!("Enqueued {} rays in bundle {}", rays.len(), bundle);
        Ok(first.unwrap_or_else(|| self.queue.next_seq()))
    }

    /// Admit rays without blocking. When the queue fills, the rays admitted
    /// so far stay queued and `QueueFull` reports how many there were.
    ///
    /// * `rays`   - The bundle.
    /// * `bundle` - Correlation id attached to every ray of the bundle.
    pub fn try_enqueue(&self, rays: &[RayInput], bundle: u64) -> Result<u64, SimulError> {
        self.start("try_enqueue")?;
        let mut first = None;
        for (admitted, ray) in rays.iter().enumerate() {
            match self.queue.try_enqueue(ray, bundle) {
                Ok(seq) => {
                    first.get_or_insert(seq);
                }
                Err(AdmitError::Full) => return Err(SimulError::QueueFull { admitted }),
                Err(AdmitError::Closed) => return Err(SimulError::ManagerStopped),
            }
        }
        Ok(first.unwrap_or_else(|| self.queue.next_seq()))
    }

    /// Returns the dispatcher of the run, starting the run on first use, and
    /// whether rays are traced on the calling thread.
    fn start(&self, op: &'static str) -> Result<(Arc<Dispatch>, bool), SimulError> {
        let mut inner = self.inner.lock();
        check(&inner, op, &[ManagerState::SceneLoaded, ManagerState::Running])?;

        if inner.run.is_none() {
            let scene = self.scene.load_full().ok_or(SimulError::InvalidState { op, state: inner.state })?;
            let contrib = self.config.mode == SimulMode::Contrib;
            let modifiers = if contrib { self.accumulator.modifiers() } else { vec![] };
            let ctx = Arc::new(TraceContext::new(
                scene,
                Arc::clone(&self.bsdfs),
                &self.config,
                inner.callbacks.clone(),
                modifiers,
            ));
            let accumulator = if contrib { Some(Arc::clone(&self.accumulator)) } else { None };
            let sink = Arc::new(Sink::new(
                Arc::clone(&ctx),
                accumulator,
                self.queue.next_seq(),
                &self.config,
            ));
            let dispatch = Arc::new(Dispatch::new(ctx, sink, Arc::clone(&self.queue)));
            let mut pool = WorkerPool::new(Arc::clone(&dispatch));
            pool.resize(inner.threads);
            inner.run = Some(Run { dispatch, pool });
            transition(&mut inner, ManagerState::Running);
        }

        match inner.run.as_ref() {
            Some(run) => Ok((Arc::clone(&run.dispatch), run.pool.is_empty())),
            None => Err(SimulError::InvalidState { op, state: inner.state }),
        }
    }

    /// Wait until every ray admitted before the call has produced a result
    /// and write finished contribution rows. The queue stays open.
    pub fn flush(&self) -> Result<RunSummary, SimulError> {
        let dispatch = self.drain("flush")?;
        self.accumulator.flush()?;

        let summary = dispatch.map(|d| d.sink.summary()).unwrap_or_default();
        if summary.failed > 0 {
            warn!("Flushed with failures: {}", summary);
        } else {
            debug!("Flushed: {}", summary);
        }
        Ok(summary)
    }

    /// Wait until every admitted ray has been committed. Returns the
    /// dispatcher of the run, if one was started.
    fn drain(&self, op: &'static str) -> Result<Option<Arc<Dispatch>>, SimulError> {
        let (dispatch, inline) = {
            let inner = self.inner.lock();
            check(&inner, op, &[ManagerState::SceneLoaded, ManagerState::Running])?;
            match inner.run.as_ref() {
                Some(run) => (Arc::clone(&run.dispatch), run.pool.is_empty()),
                None => return Ok(None),
            }
        };
        if inline {
            dispatch.run_queued();
        }
        self.queue.wait_idle();
        Ok(Some(dispatch))
    }

    /// Returns the number of output rows that received a committed ray.
    pub fn row_count(&self) -> Result<u64, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "row_count", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        Ok(self.accumulator.row_count())
    }

    /// Returns the number of finished output rows.
    pub fn rows_finished(&self) -> Result<u64, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "rows_finished", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        Ok(self.accumulator.rows_finished())
    }

    /// Wait for admitted rays, then drop the partly filled output row so its
    /// rays can be traced again.
    pub fn reset_row(&self) -> Result<(), SimulError> {
        self.drain("reset_row")?;
        self.accumulator.reset_row();
        Ok(())
    }

    /// Remove and return the results committed so far, in submission order.
    pub fn take_results(&self) -> Result<Vec<RayResult>, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "take_results", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        Ok(inner.run.as_ref().map(|r| r.dispatch.sink.take_results()).unwrap_or_default())
    }

    /// Returns the counts of processed rays.
    pub fn summary(&self) -> Result<RunSummary, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "summary", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        Ok(inner.run.as_ref().map(|r| r.dispatch.sink.summary()).unwrap_or_default())
    }

    /// Returns the totals of every bin of a modifier.
    ///
    /// * `name` - Modifier name.
    pub fn snapshot(&self, name: &str) -> Result<Vec<Bin>, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "snapshot", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        self.accumulator.snapshot(name).ok_or_else(|| SimulError::InvalidModifier {
            name: name.to_string(),
            reason: String::from("not registered"),
        })
    }

    /// Zero every bin.
    pub fn reset_bins(&self) -> Result<(), SimulError> {
        let inner = self.inner.lock();
        check(&inner, "reset_bins", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        self.accumulator.reset();
        Ok(())
    }

    /// Returns the path or description of a modifier's output, or `None` if
    /// its records are not written.
    ///
    /// * `name` - Modifier name.
    pub fn output(&self, name: &str) -> Result<Option<String>, SimulError> {
        let inner = self.inner.lock();
        check(&inner, "output", &[ManagerState::SceneLoaded, ManagerState::Running])?;
        if self.accumulator.find(name).is_none() {
            return Err(SimulError::InvalidModifier {
                name: name.to_string(),
                reason: String::from("not registered"),
            });
        }
        Ok(self.accumulator.output_label(name))
    }

    /// Close the queue, join the workers and release the scene, BSDFs and
    /// outputs. A hard cleanup discards rays not yet being traced; otherwise
    /// every admitted ray is traced first.
    ///
    /// * `hard` - Discard queued rays.
    pub fn cleanup(&self, hard: bool) -> Result<RunSummary, SimulError> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, ManagerState::Draining | ManagerState::Stopped) {
            return Err(SimulError::ManagerStopped);
        }
        transition(&mut inner, ManagerState::Draining);

        let mut summary = RunSummary::default();
        match inner.run.take() {
            Some(mut run) => {
                if hard {
                    run.dispatch.cancel();
                }
                self.queue.close();
                run.pool.join();
                run.dispatch.run_queued();
                self.queue.wait_idle();
                summary = run.dispatch.sink.summary();
            }
            None => self.queue.close(),
        }

        let flushed = self.accumulator.finish();
        self.accumulator.clear();
        let evicted = self.bsdfs.evict_all();
        self.scene.store(None);
        transition(&mut inner, ManagerState::Stopped);
        info!("Simulation finished: {}; released {} BSDFs", summary, evicted);

        flushed.map(|_| summary)
    }
}

impl Drop for SimulManager {
    fn drop(&mut self) {
        let state = self.inner.get_mut().state;
        if state == ManagerState::Stopped {
            return;
        }
        if state == ManagerState::Running {
            warn!("Simulation manager dropped while running; queued rays are discarded");
        }
        if let Err(e) = self.cleanup(true) {
            error!("Cleanup failed. {}", e);
        }
    }
}

/// Fails with `ManagerStopped` after cleanup and with `InvalidState` if the
/// state is not one of `allowed`.
fn check(inner: &Inner, op: &'static str, allowed: &[ManagerState]) -> Result<(), SimulError> {
    match inner.state {
        ManagerState::Draining | ManagerState::Stopped => Err(SimulError::ManagerStopped),
        state if allowed.contains(&state) => Ok(()),
        state => Err(SimulError::InvalidState { op, state }),
    }
}

fn transition(inner: &mut Inner, to: ManagerState) {
    if inner.state != to {
        debug!("Simulation manager {} -> {}", inner.state, to);
        inner.state = to;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
