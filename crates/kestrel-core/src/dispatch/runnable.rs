//! Resumable execution contexts.
//!
//! Each dispatched task body runs on its own stack-switching coroutine. The
//! scheduler only ever sees the opaque [`Runnable`] handle: resuming it
//! either runs the body to completion or returns early because the body
//! consumed a preemption signal and swapped back to the supervisor stack,
//! registers and stack preserved in place.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use corosensei::{Coroutine, CoroutineResult};

use crate::dispatch::egress::EgressSink;
use crate::dispatch::occupancy::{EngineStats, Occupancy};
use crate::dispatch::preempt::PreemptLines;
use crate::dispatch::workload::{Interrupts, WorkRequest, Workload};
use crate::structures::pool::ContextTicket;
use crate::types::ids::QueueId;
use crate::types::message::{Message, MessageKind};

/// Everything a task body needs besides the request itself.
pub(crate) struct BodyEnv {
    /// Application routine.
    pub workload: Arc<dyn Workload>,
    /// Completion transmit path.
    pub egress: Arc<dyn EgressSink>,
    /// Live occupancy, read to pick the completion kind.
    pub occupancy: Arc<Occupancy>,
    /// Engine counters.
    pub stats: Arc<EngineStats>,
    /// Preemption lines, consumed at interrupt windows.
    pub lines: Arc<PreemptLines>,
    /// Queue the task was admitted to.
    pub queue: QueueId,
    /// Wire identity the completion is sent as.
    pub src_wire_id: u16,
}

/// Result of driving a [`Runnable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The body returned normally.
    Finished,
    /// The body consumed a preemption signal and suspended; the handle can
    /// be resumed later.
    Preempted,
}

/// An opaque, resumable task execution.
pub struct Runnable {
    coro: Coroutine<usize, (), ()>,
    // Held for its Drop: releases the context budget when the execution
    // dies, finished or abandoned.
    _ticket: Option<ContextTicket>,
}

// SAFETY: corosensei coroutines are conservatively !Send because a suspended
// stack may pin thread-affine state. A Runnable only ever travels between
// the dispatcher core (which treats it as opaque and never resumes it) and
// an executing worker; under the default core-granular policy that worker is
// always the one that created it. The Workload contract requires bodies not
// to hold thread-affine state across an interrupt window, which covers the
// objective-aware policy's migration case.
unsafe impl Send for Runnable {}

impl Runnable {
    /// Build the execution for a freshly dispatched request. The coroutine
    /// stack is created here, on the worker; the context budget was already
    /// reserved at admission via `ticket`.
    pub(crate) fn fresh(ticket: Option<ContextTicket>, work: WorkRequest, env: BodyEnv) -> Self {
        let coro: Coroutine<usize, (), ()> = Coroutine::new(move |yielder, started_on: usize| {
            let irq = Interrupts::new(yielder, &env.lines, started_on);
            let response = env.workload.run(&work, &irq);
            if let Some(payload) = response {
                send_completion(&env, &work.header, &payload);
            }
        });
        Self {
            coro,
            _ticket: ticket,
        }
    }

    /// Drive the execution on the given worker until it finishes or
    /// suspends.
    pub fn resume(&mut self, executing_worker: usize) -> RunOutcome {
        match self.coro.resume(executing_worker) {
            CoroutineResult::Yield(()) => RunOutcome::Preempted,
            CoroutineResult::Return(()) => RunOutcome::Finished,
        }
    }
}

impl std::fmt::Debug for Runnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runnable")
            .field("started", &self.coro.started())
            .field("done", &self.coro.done())
            .finish()
    }
}

/// Build and transmit the completion message from inside the task body.
///
/// The occupancy read still includes the completing task, hence the `- 1`:
/// the dispatcher decrements only after the response slot is reclaimed. The
/// now-idle variant is used exactly when this completion empties the worker
/// and the upstream scheduler is owed the notification.
fn send_completion(env: &BodyEnv, header: &Message, payload: &[u8]) {
    let depth_after = env.occupancy.len(env.queue).saturating_sub(1);
    let kind = if depth_after == 0 && env.occupancy.is_notify_owed(env.queue) {
        env.stats.idle_signals.fetch_add(1, Ordering::Relaxed);
        MessageKind::TaskDoneIdle
    } else {
        MessageKind::TaskDone
    };
    let msg = Message {
        kind,
        cluster_id: header.cluster_id,
        src_id: env.src_wire_id,
        dst_id: header.src_id,
        queue_depth: depth_after as u16,
        seq_num: header.seq_num,
        client_id: header.client_id,
        request_id: header.request_id,
        payload_len: payload.len() as u32,
        run_ns: header.run_ns,
        gen_ns: header.gen_ns,
    };
    env.egress.send(&msg, payload);
}
