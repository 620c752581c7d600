//! The transmit boundary.
//!
//! The engine hands completion messages to an [`EgressSink`]; the physical
//! transmit path (UDP, NIC queues) lives outside this crate.

use std::sync::Mutex;

use crate::types::message::Message;

/// Consumes outbound messages. Implementations must be cheap and
/// non-blocking: the sink is called from inside running task bodies.
pub trait EgressSink: Send + Sync + 'static {
    /// Transmit one message with its application payload.
    fn send(&self, msg: &Message, payload: &[u8]);
}

/// Discards everything.
pub struct NullSink;

impl EgressSink for NullSink {
    fn send(&self, _msg: &Message, _payload: &[u8]) {}
}

/// Records every message, in send order. Used by tests and the demo driver.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(Message, Vec<u8>)>>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far.
    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().iter().map(|(m, _)| *m).collect()
    }

    /// Number of messages sent so far.
    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// True if nothing was sent.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all recorded sends.
    pub fn take(&self) -> Vec<(Message, Vec<u8>)> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

impl EgressSink for RecordingSink {
    fn send(&self, msg: &Message, payload: &[u8]) {
        self.sent.lock().unwrap().push((*msg, payload.to_vec()));
    }
}
