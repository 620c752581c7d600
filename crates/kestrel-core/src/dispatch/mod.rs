//! The dispatch engine.
//!
//! Everything between the ingress handoff and the egress sink: per-worker
//! task queues and dequeue policies, the lock-free slot pairs, the
//! dispatcher and worker core loops, the preemption machinery and the
//! occupancy tracker, assembled by [`Engine`].

/// Per-worker task queues and the task slab
pub mod queue;
/// Queue selection policies
pub mod policy;
/// Dispatcher ↔ worker slot pairs
pub mod slots;
/// Resumable execution contexts
pub mod runnable;
/// Preemption signal lines
pub mod preempt;
/// Occupancy, idle protocol and counters
pub mod occupancy;
/// The business-logic boundary
pub mod workload;
/// The transmit boundary
pub mod egress;
/// The dispatcher core loop
pub mod dispatcher;
/// The worker core loop
pub mod worker;
/// Engine assembly and lifecycle
pub mod engine;

pub use egress::{EgressSink, NullSink, RecordingSink};
pub use engine::Engine;
pub use occupancy::{EngineStats, Occupancy, StatsSnapshot};
pub use policy::QueuePolicy;
pub use preempt::{PreemptLine, PreemptLines};
pub use queue::{Task, TaskCategory, TaskQueues};
pub use runnable::{RunOutcome, Runnable};
pub use slots::{ResponseFlag, SlotArray};
pub use workload::{Interrupts, SpinWorkload, WorkRequest, Workload};
