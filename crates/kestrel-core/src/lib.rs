//! # Kestrel Core
//!
//! Core-granular, preemptive request scheduling engine. A single dispatcher
//! core feeds per-worker task queues and hands work to pinned worker cores
//! over lock-free, cache-padded slot pairs; tasks that overrun their budget
//! are suspended mid-flight and resumed ahead of newer arrivals.
//!
//! The crate contains the data plane only: the physical network layer that
//! produces packets, the client retransmission machinery and the per-request
//! business logic are all external collaborators, reached through the
//! [`Workload`](dispatch::Workload) and [`EgressSink`](dispatch::EgressSink)
//! boundaries and the ingress courier.

#![warn(missing_docs)]

/// System constants
pub mod constants;

/// Type definitions: ids, requests, wire messages, errors
pub mod types;

/// Lock-free building blocks: pools and the ingress handoff
pub mod structures;

/// The dispatch engine: queues, slots, dispatcher and worker loops
pub mod dispatch;

/// Ingress-side boundary glue: admission, reassembly, keep-alive
pub mod ingress;

/// Configuration loading
pub mod core;

/// Platform utilities: core pinning, monotonic clock
pub mod system;

pub use crate::core::config::{load_config_or_default, Config};
pub use dispatch::{Engine, EngineStats, RunOutcome, StatsSnapshot, Workload};
pub use dispatch::{EgressSink, Interrupts, WorkRequest};
pub use ingress::IngressCourier;
pub use types::message::{Message, MessageKind};
pub use types::request::Request;
