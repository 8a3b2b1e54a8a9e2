//! BSDF Cache

use crate::data::BsdfData;
use crate::error::{BsdfError, CacheError};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Loads BSDF data for a key.
pub type BsdfLoader = dyn Fn(&str) -> Result<BsdfData, BsdfError> + Send + Sync;

/// Result of a cache load.
pub type CacheResult = Result<Arc<BsdfData>, CacheError>;

/// A load in progress. Waiters block on `cond` until `result` is set.
#[derive(Default)]
struct Pending {
    result: Mutex<Option<CacheResult>>,
    cond: Condvar,
}

impl Pending {
    fn wait(&self) -> CacheResult {
        let mut result = self.result.lock();
        loop {
            if let Some(r) = result.as_ref() {
                return r.clone();
            }
            self.cond.wait(&mut result);
        }
    }

    fn publish(&self, r: CacheResult) {
        *self.result.lock() = Some(r);
        self.cond.notify_all();
    }
}

enum Slot {
    Loading(Arc<Pending>),
    Ready(Arc<BsdfData>),
}

/// Keyed cache of loaded BSDF data. At most one load runs per key; other
/// callers for the same key wait for it and share its result. Failed loads
/// leave no entry so a later call retries.
pub struct BsdfCache {
    slots: Mutex<HashMap<String, Slot>>,
    loader: Box<BsdfLoader>,
    loads: AtomicUsize,
}

impl BsdfCache {
    /// Create a cache that loads keys as file paths.
    pub fn new() -> Self {
        Self::with_loader(BsdfData::load)
    }

    /// Create a cache with a custom loader.
    ///
    /// * `loader` - Loads the data for a key.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(&str) -> Result<BsdfData, BsdfError> + Send + Sync + 'static,
    {
        Self {
            slots: Mutex::new(HashMap::new()),
            loader: Box::new(loader),
            loads: AtomicUsize::new(0),
        }
    }

    /// Returns the data for a key, loading it if needed.
    ///
    /// * `key` - The key.
    pub fn load(&self, key: &str) -> CacheResult {
        let pending = {
            let mut slots = self.slots.lock();
            match slots.get(key) {
                Some(Slot::Ready(data)) => {
                    trace!("BSDF cache hit '{}'", key);
                    return Ok(Arc::clone(data));
                }
                Some(Slot::Loading(pending)) => {
                    let pending = Arc::clone(pending);
                    drop(slots);
                    trace!("Waiting for BSDF '{}'", key);
                    return pending.wait();
                }
                None => {
                    debug!("BSDF cache miss '{}'", key);
                    let pending = Arc::new(Pending::default());
                    slots.insert(key.to_owned(), Slot::Loading(Arc::clone(&pending)));
                    pending
                }
            }
        };

        self.loads.fetch_add(1, Ordering::SeqCst);
        let result = match catch_unwind(AssertUnwindSafe(|| (self.loader)(key))) {
            Ok(Ok(data)) => Ok(Arc::new(data)),
            Ok(Err(e)) => Err(CacheError {
                key: key.to_owned(),
                message: e.to_string(),
            }),
            Err(_) => Err(CacheError {
                key: key.to_owned(),
                message: String::from("loader panicked"),
            }),
        };

        {
            let mut slots = self.slots.lock();
            // The slot may have been evicted while loading.
            let ours = matches!(slots.get(key), Some(Slot::Loading(p)) if Arc::ptr_eq(p, &pending));
            if ours {
                match &result {
                    Ok(data) => {
                        slots.insert(key.to_owned(), Slot::Ready(Arc::clone(data)));
                    }
                    Err(e) => {
                        warn!("{}", e);
                        slots.remove(key);
                    }
                }
            }
        }

        pending.publish(result.clone());
        result
    }

    /// Returns the data for a key if it is loaded.
    ///
    /// * `key` - The key.
    pub fn get(&self, key: &str) -> Option<Arc<BsdfData>> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(data)) => Some(Arc::clone(data)),
            _ => None,
        }
    }

    /// Removes a key. Holders of its data keep using it; a load in progress
    /// still completes for its waiters but is not stored. Returns true if the
    /// key was present.
    ///
    /// * `key` - The key.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.slots.lock().remove(key).is_some();
        if removed {
            debug!("Evicted BSDF '{}'", key);
        }
        removed
    }

    /// Removes every key and returns how many were present.
    pub fn evict_all(&self) -> usize {
        let n = {
            let mut slots = self.slots.lock();
            let n = slots.len();
            slots.clear();
            n
        };
        debug!("Evicted {} BSDFs", n);
        n
    }

    /// Returns the number of loaded keys.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    /// Returns true if no key is loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of loads started so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Default for BsdfCache {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
