//! Ray Queue
//!
//! Bounded multi-producer multi-consumer queue of work items. Sequence
//! numbers are assigned under the admission lock so that they follow the
//! order items enter the channel. The queue also counts admitted items that
//! have not been completed, which `wait_idle()` uses as a quiescence barrier.

use crate::ray::*;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::{Condvar, Mutex};

/// Why an item was not admitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdmitError {
    /// The queue is at capacity.
    Full,

    /// The queue is closed.
    Closed,
}

/// Admission side of the queue.
struct Admission {
    /// `None` once the queue is closed.
    sender: Option<Sender<RayWorkItem>>,

    /// Sequence number of the next admitted item.
    next_seq: u64,
}

/// Bounded ray queue.
pub struct RayQueue {
    admission: Mutex<Admission>,
    receiver: Receiver<RayWorkItem>,
    capacity: usize,

    /// Admitted items not yet completed.
    pending: Mutex<u64>,
    idle: Condvar,
}

impl RayQueue {
    /// Create a queue.
    ///
    /// * `capacity` - Maximum number of queued items.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            admission: Mutex::new(Admission {
                sender: Some(sender),
                next_seq: 0,
            }),
            receiver,
            capacity,
            pending: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    /// Admit a ray, blocking while the queue is full. Returns the item's
    /// sequence number.
    ///
    /// * `input`  - The ray.
    /// * `bundle` - Bundle correlation id.
    pub fn enqueue(&self, input: &RayInput, bundle: u64) -> Result<u64, AdmitError> {
        let mut adm = self.admission.lock();
        let seq = adm.next_seq;
        let sender = adm.sender.as_ref().ok_or(AdmitError::Closed)?;

        *self.pending.lock() += 1;
        match sender.send(RayWorkItem::new(input, seq, bundle)) {
            Ok(()) => {
                adm.next_seq += 1;
                Ok(seq)
            }
            Err(_) => {
                self.complete(1);
                Err(AdmitError::Closed)
            }
        }
    }

    /// Admit a ray if there is room. Returns the item's sequence number.
    ///
    /// * `input`  - The ray.
    /// * `bundle` - Bundle correlation id.
    pub fn try_enqueue(&self, input: &RayInput, bundle: u64) -> Result<u64, AdmitError> {
        let mut adm = self.admission.lock();
        let seq = adm.next_seq;
        let sender = adm.sender.as_ref().ok_or(AdmitError::Closed)?;

        *self.pending.lock() += 1;
        match sender.try_send(RayWorkItem::new(input, seq, bundle)) {
            Ok(()) => {
                adm.next_seq += 1;
                Ok(seq)
            }
            Err(e) => {
                self.complete(1);
                match e {
                    TrySendError::Full(_) => Err(AdmitError::Full),
                    TrySendError::Disconnected(_) => Err(AdmitError::Closed),
                }
            }
        }
    }

    /// Returns a receiver for workers. It reports disconnection once the
    /// queue is closed and drained.
    pub fn receiver(&self) -> Receiver<RayWorkItem> {
        self.receiver.clone()
    }

    /// Removes the next item without blocking.
    pub fn try_dequeue(&self) -> Option<RayWorkItem> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop admitting items. Queued items remain available to workers.
    pub fn close(&self) {
        if self.admission.lock().sender.take().is_some() {
            debug!("Ray queue closed");
        }
    }

    /// Returns true once the queue is closed.
    pub fn is_closed(&self) -> bool {
        self.admission.lock().sender.is_none()
    }

    /// Mark items as completed.
    ///
    /// * `n` - Number of items.
    pub fn complete(&self, n: u64) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(n);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    /// Block until every admitted item is completed.
    pub fn wait_idle(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.idle.wait(&mut pending);
        }
    }

    /// Returns the number of admitted items not yet completed.
    pub fn pending(&self) -> u64 {
        *self.pending.lock()
    }

    /// Returns the number of items waiting in the queue.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if no items are waiting.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Returns the bound of the queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the sequence number the next admitted item will get.
    pub fn next_seq(&self) -> u64 {
        self.admission.lock().next_seq
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rcore::geometry::Vector3f;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn ray() -> RayInput {
        RayInput::new(Vector3f::zero(), Vector3f::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn sequence_numbers_increase_per_admission() {
        let q = RayQueue::new(4);
        assert_eq!(q.try_enqueue(&ray(), 0), Ok(0));
        assert_eq!(q.enqueue(&ray(), 0), Ok(1));
        assert_eq!(q.try_dequeue().map(|i| i.seq), Some(0));
        assert_eq!(q.try_enqueue(&ray(), 7), Ok(2));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pending(), 3);
    }

    #[test]
    fn full_queue_rejects_without_consuming_a_sequence_number() {
        let q = RayQueue::new(2);
        q.try_enqueue(&ray(), 0).unwrap();
        q.try_enqueue(&ray(), 0).unwrap();
        assert_eq!(q.try_enqueue(&ray(), 0), Err(AdmitError::Full));
        assert_eq!(q.pending(), 2);
        q.try_dequeue().unwrap();
        assert_eq!(q.try_enqueue(&ray(), 0), Ok(2));
    }

    #[test]
    fn closed_queue_drains_then_disconnects() {
        let q = RayQueue::new(4);
        q.enqueue(&ray(), 0).unwrap();
        q.close();
        assert!(q.is_closed());
        assert_eq!(q.enqueue(&ray(), 0), Err(AdmitError::Closed));
        assert_eq!(q.try_enqueue(&ray(), 0), Err(AdmitError::Closed));

        let rx = q.receiver();
        assert!(rx.recv().is_ok());
        assert!(rx.recv().is_err());
    }

    #[test]
    fn blocking_enqueue_waits_for_room() {
        let q = Arc::new(RayQueue::new(1));
        q.enqueue(&ray(), 0).unwrap();

        let q2 = Arc::clone(&q);
        let producer = thread::spawn(move || q2.enqueue(&ray(), 0));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.len(), 1);

        assert_eq!(q.receiver().recv().map(|i| i.seq), Ok(0));
        assert_eq!(producer.join().unwrap(), Ok(1));
    }

    #[test]
    fn wait_idle_returns_after_completion() {
        let q = Arc::new(RayQueue::new(8));
        for _ in 0..3 {
            q.enqueue(&ray(), 0).unwrap();
        }
        let q2 = Arc::clone(&q);
        let worker = thread::spawn(move || {
            while let Some(_item) = q2.try_dequeue() {
                thread::sleep(Duration::from_millis(5));
                q2.complete(1);
            }
        });
        q.wait_idle();
        assert_eq!(q.pending(), 0);
        worker.join().unwrap();
    }
}
