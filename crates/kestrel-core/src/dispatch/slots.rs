//! Dispatcher ↔ worker slot pairs.
//!
//! Each worker owns one dispatch slot (dispatcher → worker) and one response
//! slot (worker → dispatcher), both cache-padded. A slot's atomic flag names
//! the current logical owner of its body; there are no locks. The writer set
//! per field is fixed by role and enforced here by handing each side a view
//! that only exposes its legal operations:
//!
//! - the dispatcher writes dispatch bodies, publishes `ACTIVE`, reads
//!   response flags and consumes reported bodies (`RUNNING`/`PROCESSED`);
//! - a worker claims `ACTIVE` dispatches, writes its own response body and
//!   reports `FINISHED`/`PREEMPTED`.
//!
//! Any other flag value read is a protocol violation and halts the core.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

use crate::dispatch::queue::TaskCategory;
use crate::dispatch::runnable::{RunOutcome, Runnable};
use crate::structures::pool::ContextTicket;
use crate::types::ids::QueueId;
use crate::types::request::Request;

const WAITING: u8 = 0;
const ACTIVE: u8 = 1;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const PREEMPTED: u8 = 2;
const PROCESSED: u8 = 3;

/// Response slot states, as observed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFlag {
    /// The worker is executing; the slot carries nothing.
    Running,
    /// The worker reported a clean completion.
    Finished,
    /// The worker reported a forced suspension.
    Preempted,
    /// The report was consumed; the worker is eligible for a new dispatch.
    Processed,
}

fn response_flag_from_raw(raw: u8) -> ResponseFlag {
    match raw {
        RUNNING => ResponseFlag::Running,
        FINISHED => ResponseFlag::Finished,
        PREEMPTED => ResponseFlag::Preempted,
        PROCESSED => ResponseFlag::Processed,
        other => {
            tracing::error!(flag = other, "corrupt response slot flag");
            panic!("corrupt response slot flag {other}");
        }
    }
}

/// Body of a dispatch slot: one task handed to a worker.
#[derive(Debug)]
pub struct DispatchBody {
    /// Suspended execution for resumed tasks.
    pub runnable: Option<Runnable>,
    /// Context reservation for fresh tasks.
    pub ticket: Option<ContextTicket>,
    /// The request being served.
    pub req: Option<Box<Request>>,
    /// Queue the task came from.
    pub queue: QueueId,
    /// Fresh or resumed.
    pub category: TaskCategory,
    /// Original enqueue timestamp, nanoseconds.
    pub enqueued_ns: u64,
}

impl DispatchBody {
    fn empty() -> Self {
        Self {
            runnable: None,
            ticket: None,
            req: None,
            queue: QueueId(0),
            category: TaskCategory::Fresh,
            enqueued_ns: 0,
        }
    }
}

/// Body of a response slot: one worker report.
#[derive(Debug)]
pub struct ResponseBody {
    /// The suspended execution, present on preemption reports.
    pub runnable: Option<Runnable>,
    /// The request, handed back on every report.
    pub req: Option<Box<Request>>,
    /// Queue the task belongs to.
    pub queue: QueueId,
    /// Category of the work if it runs again; always resumed.
    pub category: TaskCategory,
    /// Original enqueue timestamp, echoed from the dispatch.
    pub enqueued_ns: u64,
}

impl ResponseBody {
    fn empty() -> Self {
        Self {
            runnable: None,
            req: None,
            queue: QueueId(0),
            category: TaskCategory::Resumed,
            enqueued_ns: 0,
        }
    }
}

struct DispatchHalf {
    flag: AtomicU8,
    body: UnsafeCell<DispatchBody>,
}

struct ResponseHalf {
    flag: AtomicU8,
    body: UnsafeCell<ResponseBody>,
}

/// The slot pairs for all workers. Create once, then take the dispatcher
/// view and one worker view per core.
pub struct SlotArray {
    dispatch: Box<[CachePadded<DispatchHalf>]>,
    response: Box<[CachePadded<ResponseHalf>]>,
}

// SAFETY: each body is touched only by the side the flag value designates
// as owner; every ownership transfer is a Release store observed by an
// Acquire load before the other side reads or writes the body.
unsafe impl Send for SlotArray {}
unsafe impl Sync for SlotArray {}

impl SlotArray {
    /// Quiescent slots for `workers` workers. Response flags start
    /// `RUNNING`; each worker announces readiness by marking its own slot
    /// processed when its loop starts.
    pub fn new(workers: usize) -> Arc<Self> {
        Arc::new(Self {
            dispatch: (0..workers)
                .map(|_| {
                    CachePadded::new(DispatchHalf {
                        flag: AtomicU8::new(WAITING),
                        body: UnsafeCell::new(DispatchBody::empty()),
                    })
                })
                .collect(),
            response: (0..workers)
                .map(|_| {
                    CachePadded::new(ResponseHalf {
                        flag: AtomicU8::new(RUNNING),
                        body: UnsafeCell::new(ResponseBody::empty()),
                    })
                })
                .collect(),
        })
    }

    /// Number of slot pairs.
    pub fn workers(&self) -> usize {
        self.dispatch.len()
    }

    /// The dispatcher's view over every pair.
    pub fn dispatcher_view(self: &Arc<Self>) -> DispatcherSlots {
        DispatcherSlots {
            slots: Arc::clone(self),
        }
    }

    /// One worker's view over its own pair.
    pub fn worker_view(self: &Arc<Self>, worker: usize) -> WorkerSlot {
        assert!(worker < self.dispatch.len());
        WorkerSlot {
            slots: Arc::clone(self),
            worker,
        }
    }
}

/// Dispatcher-side operations over all slot pairs.
pub struct DispatcherSlots {
    slots: Arc<SlotArray>,
}

impl DispatcherSlots {
    /// Number of slot pairs.
    pub fn workers(&self) -> usize {
        self.slots.workers()
    }

    /// Current response state of one worker.
    pub fn response_flag(&self, worker: usize) -> ResponseFlag {
        response_flag_from_raw(self.slots.response[worker].flag.load(Ordering::Acquire))
    }

    /// Consume a reported response body. Caller must have observed
    /// `Finished` or `Preempted`.
    pub fn take_response(&self, worker: usize) -> ResponseBody {
        debug_assert!(matches!(
            self.response_flag(worker),
            ResponseFlag::Finished | ResponseFlag::Preempted
        ));
        // Owned by the dispatcher: the worker released the body with its
        // FINISHED/PREEMPTED store and will not touch it until the next
        // ACTIVE dispatch.
        let body = unsafe { &mut *self.slots.response[worker].body.get() };
        std::mem::replace(body, ResponseBody::empty())
    }

    /// Mark a consumed report processed, making the worker eligible for a
    /// new dispatch.
    pub fn mark_processed(&self, worker: usize) {
        self.slots.response[worker]
            .flag
            .store(PROCESSED, Ordering::Release);
    }

    /// Publish a task to a worker. The response flag moves to `RUNNING`
    /// first so the dispatcher stops servicing the pair until the worker
    /// reports.
    pub fn dispatch(&self, worker: usize, body: DispatchBody) {
        let half = &self.slots.dispatch[worker];
        debug_assert_eq!(half.flag.load(Ordering::Relaxed), WAITING);
        self.slots.response[worker]
            .flag
            .store(RUNNING, Ordering::Relaxed);
        // Owned by the dispatcher while the flag reads WAITING.
        unsafe {
            *half.body.get() = body;
        }
        half.flag.store(ACTIVE, Ordering::Release);
    }
}

/// Worker-side operations over the worker's own slot pair.
pub struct WorkerSlot {
    slots: Arc<SlotArray>,
    worker: usize,
}

impl WorkerSlot {
    /// Index of the worker this view belongs to.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Announce readiness for the first dispatch.
    pub fn init(&self) {
        self.slots.response[self.worker]
            .flag
            .store(PROCESSED, Ordering::Release);
    }

    /// Claim a published task, if any. Resets the dispatch flag so the pair
    /// is ready for the next publication.
    pub fn try_claim(&self) -> Option<DispatchBody> {
        let half = &self.slots.dispatch[self.worker];
        if half.flag.load(Ordering::Acquire) != ACTIVE {
            return None;
        }
        // Owned by the worker between the ACTIVE load and the WAITING store.
        let body = unsafe { std::mem::replace(&mut *half.body.get(), DispatchBody::empty()) };
        half.flag.store(WAITING, Ordering::Release);
        Some(body)
    }

    /// Report the outcome of the claimed task.
    pub fn respond(&self, body: ResponseBody, outcome: RunOutcome) {
        let half = &self.slots.response[self.worker];
        // Owned by the worker while the flag reads RUNNING.
        unsafe {
            *half.body.get() = body;
        }
        let flag = match outcome {
            RunOutcome::Finished => FINISHED,
            RunOutcome::Preempted => PREEMPTED,
        };
        half.flag.store(flag, Ordering::Release);
    }
}
