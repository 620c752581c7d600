//! System-wide constants.

/// Hard cap on worker cores an engine will drive.
pub const MAX_WORKERS: usize = 18;

/// Packet buffers a single request may span.
pub const MAX_PKTS_PER_REQUEST: usize = 8;

/// Arrivals (and freed requests) carried per ingress batch exchange.
pub const MAX_INGRESS_BATCH: usize = 8;

/// Size of the fixed wire header, bytes.
pub const WIRE_HEADER_SIZE: usize = 37;

/// Default live-request pool capacity.
pub const DEFAULT_REQUEST_CAPACITY: usize = 4096;

/// Default budget of live execution contexts.
pub const DEFAULT_CONTEXT_CAPACITY: usize = 1024;

/// Default reassembly ledger capacity (in-flight multi-packet requests).
pub const DEFAULT_REASSEMBLY_CELLS: usize = 256;

/// Default preemption delay: how long a task may run before the dispatcher
/// signals its worker, nanoseconds.
pub const DEFAULT_PREEMPTION_DELAY_NS: u64 = 5_000;

/// Default interval between ingress keep-alive messages, microseconds.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_US: u64 = 1_000_000;
