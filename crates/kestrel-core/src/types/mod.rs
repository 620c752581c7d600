//! Type definitions for the Kestrel engine, organized by category.

/// Identifier newtypes and the worker identity map
pub mod ids;
/// Request objects and ownership
pub mod request;
/// Wire message header codec
pub mod message;
/// Error taxonomy
pub mod error;

pub use error::{AdmitError, CodecError, ConfigError};
pub use ids::{ClientId, QueueId, RequestId, WorkerId, WorkerMap};
pub use message::{Message, MessageKind};
pub use request::Request;
