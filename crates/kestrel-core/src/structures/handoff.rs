//! The ingress ↔ dispatcher batch handoff.
//!
//! One cache-padded publication cell carries a bounded batch of arrivals
//! toward the dispatcher and freed requests back toward the ingress side.
//! A single atomic flag transfers ownership of the cell body: while `EMPTY`
//! only the producer touches it, while `PUBLISHED` only the consumer does.
//! No locks; the producer polls for `EMPTY`, the dispatcher polls for
//! `PUBLISHED` once per loop iteration and drains the batch fully.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

use crate::constants::MAX_INGRESS_BATCH;
use crate::types::ids::QueueId;
use crate::types::request::Request;

const EMPTY: u8 = 0;
const PUBLISHED: u8 = 1;

/// One admitted request headed for a worker queue.
#[derive(Debug)]
pub struct Arrival {
    /// The request, owned by the batch while in flight.
    pub req: Box<Request>,
    /// Target queue, resolved from the wire destination at admission.
    pub queue: QueueId,
}

struct BatchCell {
    arrivals: [Option<Arrival>; MAX_INGRESS_BATCH],
    arrival_count: u8,
    freed: [Option<Box<Request>>; MAX_INGRESS_BATCH],
    freed_count: u8,
}

impl BatchCell {
    fn new() -> Self {
        Self {
            arrivals: std::array::from_fn(|_| None),
            arrival_count: 0,
            freed: std::array::from_fn(|_| None),
            freed_count: 0,
        }
    }
}

/// The shared handoff cell. Create once, then [`split`](Self::split) into
/// the two role handles.
pub struct IngressHandoff {
    state: CachePadded<AtomicU8>,
    cell: UnsafeCell<BatchCell>,
}

// The flag value decides which single thread may touch `cell`; transitions
// use Release stores paired with Acquire loads on the other side.
unsafe impl Send for IngressHandoff {}
unsafe impl Sync for IngressHandoff {}

impl IngressHandoff {
    /// Create the handoff and split it into producer and consumer handles.
    pub fn split() -> (IngressProducer, IngressConsumer) {
        let shared = Arc::new(IngressHandoff {
            state: CachePadded::new(AtomicU8::new(EMPTY)),
            cell: UnsafeCell::new(BatchCell::new()),
        });
        (
            IngressProducer {
                shared: Arc::clone(&shared),
            },
            IngressConsumer { shared },
        )
    }
}

/// Ingress-side handle: publishes arrivals, reclaims freed requests.
pub struct IngressProducer {
    shared: Arc<IngressHandoff>,
}

impl IngressProducer {
    /// Open the cell for filling if the dispatcher has drained the previous
    /// batch. Returns `None` while the batch is still outstanding.
    pub fn try_open(&mut self) -> Option<ProducerBatch<'_>> {
        if self.shared.state.load(Ordering::Acquire) != EMPTY {
            return None;
        }
        Some(ProducerBatch {
            shared: &*self.shared,
        })
    }
}

/// An open, producer-owned batch.
pub struct ProducerBatch<'a> {
    shared: &'a IngressHandoff,
}

impl ProducerBatch<'_> {
    fn cell(&mut self) -> &mut BatchCell {
        // Owned by the producer while the flag reads EMPTY.
        unsafe { &mut *self.shared.cell.get() }
    }

    /// Take one request freed by the dispatcher, for release to the pool.
    pub fn take_freed(&mut self) -> Option<Box<Request>> {
        let cell = self.cell();
        for slot in cell.freed.iter_mut() {
            if let Some(req) = slot.take() {
                cell.freed_count -= 1;
                return Some(req);
            }
        }
        None
    }

    /// Stage an arrival. Fails (returning it) once the batch is full.
    pub fn push(&mut self, arrival: Arrival) -> Result<(), Arrival> {
        let cell = self.cell();
        let idx = cell.arrival_count as usize;
        if idx >= MAX_INGRESS_BATCH {
            return Err(arrival);
        }
        cell.arrivals[idx] = Some(arrival);
        cell.arrival_count += 1;
        Ok(())
    }

    /// Room left for arrivals in this batch.
    pub fn remaining(&mut self) -> usize {
        MAX_INGRESS_BATCH - self.cell().arrival_count as usize
    }

    /// Hand the batch to the dispatcher.
    pub fn publish(self) {
        self.shared.state.store(PUBLISHED, Ordering::Release);
    }
}

/// Dispatcher-side handle: drains arrivals, returns freed requests.
pub struct IngressConsumer {
    shared: Arc<IngressHandoff>,
}

impl IngressConsumer {
    /// Open the published batch, if any.
    pub fn try_drain(&mut self) -> Option<ConsumerBatch<'_>> {
        if self.shared.state.load(Ordering::Acquire) != PUBLISHED {
            return None;
        }
        Some(ConsumerBatch {
            shared: &*self.shared,
        })
    }
}

/// An open, consumer-owned batch.
pub struct ConsumerBatch<'a> {
    shared: &'a IngressHandoff,
}

impl ConsumerBatch<'_> {
    fn cell(&mut self) -> &mut BatchCell {
        // Owned by the consumer while the flag reads PUBLISHED.
        unsafe { &mut *self.shared.cell.get() }
    }

    /// Take the next arrival out of the batch.
    pub fn pop_arrival(&mut self) -> Option<Arrival> {
        let cell = self.cell();
        for slot in cell.arrivals.iter_mut() {
            if let Some(arrival) = slot.take() {
                cell.arrival_count -= 1;
                return Some(arrival);
            }
        }
        None
    }

    /// Stage a finished request for return to the ingress free-list.
    /// Fails (returning it) once all freed slots are taken.
    pub fn push_freed(&mut self, req: Box<Request>) -> Result<(), Box<Request>> {
        let cell = self.cell();
        let idx = cell.freed_count as usize;
        if idx >= MAX_INGRESS_BATCH {
            return Err(req);
        }
        cell.freed[idx] = Some(req);
        cell.freed_count += 1;
        Ok(())
    }

    /// Give the cell back to the producer.
    pub fn finish(self) {
        self.shared.state.store(EMPTY, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(queue: u16) -> Arrival {
        let mut req = Box::new(Request::blank());
        req.begin(QueueId(queue), 1, false);
        Arrival {
            req,
            queue: QueueId(queue),
        }
    }

    #[test]
    fn publish_then_drain_round_trip() {
        // Goal: arrivals flow one way, freed requests the other, and the
        // producer cannot reopen the cell until the consumer finished.
        let (mut tx, mut rx) = IngressHandoff::split();

        let mut batch = tx.try_open().unwrap();
        batch.push(arrival(0)).unwrap();
        batch.push(arrival(1)).unwrap();
        batch.publish();

        assert!(tx.try_open().is_none());

        let mut drain = rx.try_drain().unwrap();
        let a = drain.pop_arrival().unwrap();
        assert_eq!(a.queue, QueueId(0));
        let b = drain.pop_arrival().unwrap();
        drain.push_freed(a.req).unwrap();
        drain.push_freed(b.req).unwrap();
        assert!(drain.pop_arrival().is_none());
        drain.finish();

        let mut batch = tx.try_open().unwrap();
        assert!(batch.take_freed().is_some());
        assert!(batch.take_freed().is_some());
        assert!(batch.take_freed().is_none());
    }

    #[test]
    fn batch_is_bounded() {
        let (mut tx, _rx) = IngressHandoff::split();
        let mut batch = tx.try_open().unwrap();
        for i in 0..MAX_INGRESS_BATCH {
            batch.push(arrival(i as u16)).unwrap();
        }
        assert!(batch.push(arrival(99)).is_err());
        assert_eq!(batch.remaining(), 0);
    }

    #[test]
    fn consumer_sees_nothing_before_publish() {
        let (mut tx, mut rx) = IngressHandoff::split();
        assert!(rx.try_drain().is_none());
        let batch = tx.try_open().unwrap();
        drop(batch);
        assert!(rx.try_drain().is_none());
    }
}
