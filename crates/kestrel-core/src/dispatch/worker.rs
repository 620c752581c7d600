//! The worker core.
//!
//! Each worker busy-polls its dispatch slot, claims published tasks and
//! drives them on coroutine stacks. A fresh task has its wire payload
//! decoded and a new execution context built around the workload; a resumed
//! task swaps straight back into its suspended context. The outcome —
//! clean return or consumed preemption signal — is reported through the
//! response slot, and the completion message is emitted from inside the
//! task body itself before it returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::WIRE_HEADER_SIZE;
use crate::dispatch::egress::EgressSink;
use crate::dispatch::occupancy::{EngineStats, Occupancy};
use crate::dispatch::preempt::PreemptLines;
use crate::dispatch::queue::TaskCategory;
use crate::dispatch::runnable::{BodyEnv, RunOutcome, Runnable};
use crate::dispatch::slots::{DispatchBody, ResponseBody, WorkerSlot};
use crate::dispatch::workload::{WorkRequest, Workload};
use crate::types::ids::WorkerMap;
use crate::types::message::Message;
use crate::types::request::Request;

/// One worker core's state and loop.
pub struct WorkerCore {
    worker: usize,
    slot: WorkerSlot,
    lines: Arc<PreemptLines>,
    occupancy: Arc<Occupancy>,
    stats: Arc<EngineStats>,
    egress: Arc<dyn EgressSink>,
    workload: Arc<dyn Workload>,
    map: WorkerMap,
}

impl WorkerCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        worker: usize,
        slot: WorkerSlot,
        lines: Arc<PreemptLines>,
        occupancy: Arc<Occupancy>,
        stats: Arc<EngineStats>,
        egress: Arc<dyn EgressSink>,
        workload: Arc<dyn Workload>,
        map: WorkerMap,
    ) -> Self {
        Self {
            worker,
            slot,
            lines,
            occupancy,
            stats,
            egress,
            workload,
            map,
        }
    }

    /// Run until the shutdown flag rises. Busy-polls the dispatch slot; a
    /// long idle stretch yields so unpinned deployments do not starve
    /// sibling threads.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        self.slot.init();
        tracing::info!(worker = self.worker, "worker waiting for dispatcher work");
        let mut idle_spins = 0u32;
        while !shutdown.load(Ordering::Relaxed) {
            if self.poll() {
                idle_spins = 0;
            } else {
                idle_spins = idle_spins.wrapping_add(1);
                if idle_spins & 0x3FF == 0 {
                    std::thread::yield_now();
                } else {
                    std::hint::spin_loop();
                }
            }
        }
        tracing::info!(worker = self.worker, "worker stopped");
    }

    /// Claim and execute one dispatch if published. Returns false when the
    /// slot was empty.
    pub fn poll(&mut self) -> bool {
        let Some(body) = self.slot.try_claim() else {
            return false;
        };
        self.execute(body);
        true
    }

    fn execute(&mut self, mut body: DispatchBody) {
        let (outcome, runnable) = match body.category {
            TaskCategory::Fresh => self.start_fresh(&mut body),
            TaskCategory::Resumed => {
                let Some(mut runnable) = body.runnable.take() else {
                    tracing::error!(worker = self.worker, "resumed dispatch without a context");
                    panic!("resumed dispatch without a context");
                };
                let outcome = runnable.resume(self.worker);
                (outcome, Some(runnable))
            }
        };

        let reported = match outcome {
            RunOutcome::Finished => {
                // A signal that lands after the body already returned is
                // stale; drop it so it cannot leak into the next task.
                self.lines.line(self.worker).clear();
                None
            }
            RunOutcome::Preempted => runnable,
        };
        self.slot.respond(
            ResponseBody {
                runnable: reported,
                req: body.req.take(),
                queue: body.queue,
                category: TaskCategory::Resumed,
                enqueued_ns: body.enqueued_ns,
            },
            outcome,
        );
    }

    /// Build and start the execution for a fresh request. An undecodable
    /// payload finishes the task immediately with no response; retries are
    /// the client's business, not ours.
    fn start_fresh(&mut self, body: &mut DispatchBody) -> (RunOutcome, Option<Runnable>) {
        let ticket = body.ticket.take();
        let Some(req) = body.req.as_deref() else {
            tracing::error!(worker = self.worker, "fresh dispatch without a request");
            panic!("fresh dispatch without a request");
        };
        let Some(work) = decode_work(req) else {
            tracing::warn!(
                worker = self.worker,
                "dropping task with undecodable payload"
            );
            // Dropping the ticket here releases the context budget.
            drop(ticket);
            return (RunOutcome::Finished, None);
        };
        let env = BodyEnv {
            workload: Arc::clone(&self.workload),
            egress: Arc::clone(&self.egress),
            occupancy: Arc::clone(&self.occupancy),
            stats: Arc::clone(&self.stats),
            lines: Arc::clone(&self.lines),
            queue: body.queue,
            src_wire_id: self.map.wire_id(body.queue),
        };
        let mut runnable = Runnable::fresh(ticket, work, env);
        let outcome = runnable.resume(self.worker);
        (outcome, Some(runnable))
    }
}

/// Decode the wire header and payload view from a request's first packet.
pub(crate) fn decode_work(req: &Request) -> Option<WorkRequest> {
    let pkt = req.first_packet()?;
    let header = Message::decode(pkt).ok()?;
    let start = WIRE_HEADER_SIZE;
    let end = start
        .saturating_add(header.payload_len as usize)
        .min(pkt.len());
    Some(WorkRequest {
        header,
        payload: pkt.slice(start..end),
    })
}
