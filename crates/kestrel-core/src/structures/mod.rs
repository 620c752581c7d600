//! Lock-free building blocks shared across cores.

/// Fixed-capacity object pools with allocate-may-fail semantics
pub mod pool;
/// The ingress ↔ dispatcher batch handoff slot
pub mod handoff;

pub use handoff::{Arrival, IngressConsumer, IngressHandoff, IngressProducer};
pub use pool::{ContextBudget, ContextTicket, RequestPool};
