//! Per-worker occupancy and the idle-signal protocol.
//!
//! `queue_length[w]` counts tasks admitted to worker `w` and not yet
//! finished; a preempted-then-resumed task counts once. `notify_owed[w]`
//! records that the upstream scheduler removed the worker from its idle set
//! (it arrived idle-selected) and has not yet been told the worker is idle
//! again. The dispatcher raises the flag on arrival, the worker reads it to
//! pick its completion-message kind, and the dispatcher settles it when
//! occupancy reaches zero — each transition direction has exactly one
//! writer, which is why no lock is needed.
//!
//! The counters are advisory cross-core state: the slot-flag handshakes
//! order the events that matter, so plain relaxed atomics suffice here.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

use crate::types::ids::QueueId;

/// Live occupancy state, one entry per worker.
pub struct Occupancy {
    queue_length: Box<[CachePadded<AtomicU32>]>,
    notify_owed: Box<[CachePadded<AtomicBool>]>,
}

impl Occupancy {
    /// Zeroed state for `workers` workers.
    pub fn new(workers: usize) -> Self {
        Self {
            queue_length: (0..workers)
                .map(|_| CachePadded::new(AtomicU32::new(0)))
                .collect(),
            notify_owed: (0..workers)
                .map(|_| CachePadded::new(AtomicBool::new(false)))
                .collect(),
        }
    }

    /// Number of workers tracked.
    pub fn workers(&self) -> usize {
        self.queue_length.len()
    }

    /// Tasks currently assigned to a worker.
    pub fn len(&self, queue: QueueId) -> u32 {
        self.queue_length[queue.index()].load(Ordering::Relaxed)
    }

    /// True when no worker has any assigned task.
    pub fn is_empty(&self) -> bool {
        self.queue_length
            .iter()
            .all(|l| l.load(Ordering::Relaxed) == 0)
    }

    /// Account one admitted task. Called by the dispatcher only.
    pub fn increment(&self, queue: QueueId) {
        self.queue_length[queue.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Account one finished task and return the new occupancy. Called by the
    /// dispatcher only. Underflow means a task was double-completed — the
    /// accounting is corrupt and the core halts.
    pub fn decrement(&self, queue: QueueId) -> u32 {
        let prev = self.queue_length[queue.index()].fetch_sub(1, Ordering::Relaxed);
        if prev == 0 {
            tracing::error!(queue = %queue, "occupancy underflow");
            panic!("occupancy underflow on queue {queue}");
        }
        prev - 1
    }

    /// Record that the upstream scheduler believes this worker busy and is
    /// owed a now-idle notification.
    pub fn mark_notify_owed(&self, queue: QueueId) {
        self.notify_owed[queue.index()].store(true, Ordering::Relaxed);
    }

    /// Whether a now-idle notification is owed.
    pub fn is_notify_owed(&self, queue: QueueId) -> bool {
        self.notify_owed[queue.index()].load(Ordering::Relaxed)
    }

    /// Clear the owed notification once the now-idle completion is
    /// accounted for.
    pub fn settle(&self, queue: QueueId) {
        self.notify_owed[queue.index()].store(false, Ordering::Relaxed);
    }
}

/// Monotonic engine counters.
///
/// Purely observational; read at shutdown or from tests via
/// [`snapshot`](Self::snapshot).
#[derive(Default)]
pub struct EngineStats {
    /// Tasks admitted into a queue.
    pub admitted: AtomicU64,
    /// Tasks that ran to completion.
    pub completed: AtomicU64,
    /// Preemption signals honored by workers.
    pub preemptions: AtomicU64,
    /// Admissions declined for lack of resources or routing.
    pub declined: AtomicU64,
    /// Completions that carried the now-idle variant.
    pub idle_signals: AtomicU64,
    /// Longest observed queue wait, nanoseconds.
    pub max_queue_wait_ns: AtomicU64,
}

impl EngineStats {
    /// Fold a queue-wait observation into the running maximum.
    pub fn note_queue_wait(&self, wait_ns: u64) {
        self.max_queue_wait_ns
            .fetch_max(wait_ns, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            declined: self.declined.load(Ordering::Relaxed),
            idle_signals: self.idle_signals.load(Ordering::Relaxed),
            max_queue_wait_ns: self.max_queue_wait_ns.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`EngineStats`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Tasks admitted into a queue.
    pub admitted: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Preemption signals honored by workers.
    pub preemptions: u64,
    /// Admissions declined for lack of resources or routing.
    pub declined: u64,
    /// Completions that carried the now-idle variant.
    pub idle_signals: u64,
    /// Longest observed queue wait, nanoseconds.
    pub max_queue_wait_ns: u64,
}
