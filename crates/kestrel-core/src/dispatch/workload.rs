//! The business-logic boundary.
//!
//! A [`Workload`] is the per-request application routine invoked while a
//! task is dispatched. It runs on a dedicated coroutine stack with
//! interrupts enabled: the dispatcher may raise the worker's preemption
//! line at any moment, and delivery is consumed at the next interrupt
//! window the execution crosses — [`Interrupts::preempt_point`] — swapping
//! control back to the worker's supervisory loop with the full stack state
//! preserved. The scheduler treats the suspended execution as an opaque
//! resumable handle; it neither knows nor cares where in the body the swap
//! happened.

use std::cell::Cell;

use bytes::Bytes;
use corosensei::Yielder;

use crate::dispatch::preempt::PreemptLines;
use crate::types::message::Message;

/// Decoded view of the request a task body executes.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    /// The wire header from the request's first packet.
    pub header: Message,
    /// Application payload following the header.
    pub payload: Bytes,
}

/// Interrupt window handle passed to a running task body.
///
/// Workload implementations must not hold thread-affine state across a
/// window: under the objective-aware policy an execution may migrate to a
/// different worker core between suspension and resume.
pub struct Interrupts<'a> {
    yielder: &'a Yielder<usize, ()>,
    lines: &'a PreemptLines,
    executing: Cell<usize>,
    interruptions: Cell<u32>,
}

impl<'a> Interrupts<'a> {
    pub(crate) fn new(
        yielder: &'a Yielder<usize, ()>,
        lines: &'a PreemptLines,
        executing: usize,
    ) -> Self {
        Self {
            yielder,
            lines,
            executing: Cell::new(executing),
            interruptions: Cell::new(0),
        }
    }

    /// An interrupt window. If the executing worker's preemption line is
    /// raised, execution suspends here and control returns to the worker
    /// loop; the call returns `true` once the task is resumed. With no
    /// pending signal this is a single atomic swap.
    pub fn preempt_point(&self) -> bool {
        let line = self.lines.line(self.executing.get());
        if !line.consume() {
            return false;
        }
        self.interruptions.set(self.interruptions.get() + 1);
        let resumed_on = self.yielder.suspend(());
        self.executing.set(resumed_on);
        true
    }

    /// Times this execution has been suspended and resumed.
    pub fn interruptions(&self) -> u32 {
        self.interruptions.get()
    }

    /// Index of the worker currently executing the body.
    pub fn executing(&self) -> usize {
        self.executing.get()
    }
}

/// Per-request application routine.
pub trait Workload: Send + Sync + 'static {
    /// Execute one request. Returning `Some` payload produces a completion
    /// response; `None` completes the task silently.
    fn run(&self, req: &WorkRequest, irq: &Interrupts<'_>) -> Option<Bytes>;
}

/// Built-in workload that busy-spins for the header's requested duration,
/// crossing an interrupt window each iteration, then echoes the payload.
pub struct SpinWorkload;

impl Workload for SpinWorkload {
    fn run(&self, req: &WorkRequest, irq: &Interrupts<'_>) -> Option<Bytes> {
        let started = std::time::Instant::now();
        while (started.elapsed().as_nanos() as u64) < req.header.run_ns {
            irq.preempt_point();
            std::hint::spin_loop();
        }
        Some(req.payload.clone())
    }
}
