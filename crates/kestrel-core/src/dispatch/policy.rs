//! Queue selection policies.
//!
//! Core-granular is the default: each worker dequeues strictly from its own
//! queue. The objective-aware alternative picks, across all queues, the one
//! furthest over its latency objective relative to that objective. It sits
//! behind the same interface and is selected by configuration only; nothing
//! in the default path exercises it.

use crate::dispatch::queue::TaskQueues;
use crate::types::ids::QueueId;

/// How the dispatcher picks the queue to refill an idle worker from.
#[derive(Debug, Clone)]
pub enum QueuePolicy {
    /// Dequeue only from the queue owned by the worker being serviced.
    CoreGranular,
    /// Dequeue from the queue whose head is furthest over budget:
    /// `argmax (now − head_enqueue) / objective`, strict comparison, first
    /// match wins ties.
    ObjectiveAware {
        /// Per-queue latency objective, nanoseconds.
        objectives_ns: Vec<u64>,
    },
}

impl QueuePolicy {
    /// Pick the queue to dequeue from while servicing `worker`, or `None`
    /// when no queue qualifies.
    pub fn select(&self, queues: &TaskQueues, worker: QueueId, now_ns: u64) -> Option<QueueId> {
        match self {
            QueuePolicy::CoreGranular => {
                if queues.is_empty(worker) {
                    None
                } else {
                    Some(worker)
                }
            }
            QueuePolicy::ObjectiveAware { objectives_ns } => {
                let mut best: Option<QueueId> = None;
                // A queue exactly on budget (ratio 0) is never picked; the
                // comparison floor stays at zero.
                let mut max = 0.0_f64;
                for q in 0..queues.num_queues() {
                    let Some(head_ns) = queues.head_timestamp(QueueId(q as u16)) else {
                        continue;
                    };
                    let objective = objectives_ns.get(q).copied().unwrap_or(1).max(1);
                    let wait = now_ns as i64 - head_ns as i64;
                    let ratio = wait as f64 / objective as f64;
                    if ratio > max {
                        max = ratio;
                        best = Some(QueueId(q as u16));
                    }
                }
                best
            }
        }
    }
}
