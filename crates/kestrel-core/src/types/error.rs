//! Error taxonomy.
//!
//! Resource exhaustion is a recoverable, expected condition and surfaces as
//! [`AdmitError`]; the caller declines the unit of work and the client's own
//! retransmission layer recovers. Protocol violations (corrupted slot flags,
//! occupancy underflow) are not errors at all: they are programming-invariant
//! breaks and the owning core halts.

use thiserror::Error;

/// Reasons a request admission was declined.
///
/// Every variant leaves accounting untouched: the declined request goes back
/// to the free-list and nothing is enqueued.
#[derive(Debug, Error)]
pub enum AdmitError {
    /// The live-request pool has no free objects.
    #[error("request pool exhausted")]
    RequestPoolExhausted,

    /// No execution context may be reserved for the request.
    #[error("execution context budget exhausted")]
    ContextExhausted,

    /// The task slab has no free node for the target queue.
    #[error("task queue arena full")]
    TaskArenaFull,

    /// The multi-packet reassembly ledger is full.
    #[error("reassembly ledger full")]
    ReassemblyFull,

    /// The wire destination does not resolve to a configured worker.
    #[error("unknown worker id {0}")]
    UnknownWorker(u16),

    /// The packet did not carry a decodable header.
    #[error("malformed packet: {0}")]
    Malformed(#[from] CodecError),
}

/// Wire header decode failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer shorter than the fixed header.
    #[error("short header: {0} bytes")]
    ShortHeader(usize),

    /// Unrecognized message kind discriminant.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`Config`](crate::Config).
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The parsed configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
