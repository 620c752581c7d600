//! Fixed-layout wire message header.
//!
//! Multi-byte fields are big-endian on the wire; everything in-process is
//! host-endian and converted only here. The header is followed by an opaque
//! application payload of `payload_len` bytes.

use crate::constants::WIRE_HEADER_SIZE;
use crate::types::error::CodecError;

/// Wire message kinds.
///
/// The engine itself emits only the completion class ([`TaskDone`] and
/// [`TaskDoneIdle`]); the rest of the vocabulary belongs to the upstream
/// scheduler and the ingress side but is decoded here so boundary code can
/// classify traffic.
///
/// [`TaskDone`]: MessageKind::TaskDone
/// [`TaskDoneIdle`]: MessageKind::TaskDoneIdle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// A new task for a specific worker.
    NewTask = 0,
    /// A new task for any worker.
    NewTaskRandom = 1,
    /// Task completed; worker still has queued work.
    TaskDone = 2,
    /// Task completed and the worker just became idle.
    TaskDoneIdle = 3,
    /// Upstream removed a queue entry.
    QueueRemove = 4,
    /// Upstream queue-scan signal.
    ScanQueueSignal = 5,
    /// Standalone idle announcement.
    IdleSignal = 6,
    /// Queue-depth announcement.
    QueueSignal = 7,
    /// Probe for idle workers.
    ProbeIdleQueue = 8,
    /// Response to an idle probe.
    ProbeIdleResponse = 9,
    /// Removal from the upstream idle set.
    IdleRemove = 10,
    /// Ingress liveness heartbeat carrying the worker roster.
    KeepAlive = 11,
    /// Acknowledgement of a received worker-id roster.
    WorkerIdAck = 12,
}

impl MessageKind {
    /// Decode a wire discriminant.
    pub fn from_wire(raw: u8) -> Result<Self, CodecError> {
        Ok(match raw {
            0 => Self::NewTask,
            1 => Self::NewTaskRandom,
            2 => Self::TaskDone,
            3 => Self::TaskDoneIdle,
            4 => Self::QueueRemove,
            5 => Self::ScanQueueSignal,
            6 => Self::IdleSignal,
            7 => Self::QueueSignal,
            8 => Self::ProbeIdleQueue,
            9 => Self::ProbeIdleResponse,
            10 => Self::IdleRemove,
            11 => Self::KeepAlive,
            12 => Self::WorkerIdAck,
            other => return Err(CodecError::UnknownKind(other)),
        })
    }
}

/// The fixed 37-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Message kind.
    pub kind: MessageKind,
    /// Cluster the sender belongs to.
    pub cluster_id: u16,
    /// Sender identity.
    pub src_id: u16,
    /// Destination identity. For inbound tasks this is the 0-based logical
    /// worker id.
    pub dst_id: u16,
    /// Queue depth. On completions this is the worker's occupancy after the
    /// completed task is accounted for; on inbound tasks the upstream
    /// scheduler reuses the field as its idle-selection tag.
    pub queue_depth: u16,
    /// Fragment sequence number for multi-packet requests.
    pub seq_num: u16,
    /// Client identity.
    pub client_id: u16,
    /// Per-client request identity.
    pub request_id: u32,
    /// Application payload length in bytes.
    pub payload_len: u32,
    /// Requested/consumed run duration, nanoseconds.
    pub run_ns: u64,
    /// Client-side generation timestamp, nanoseconds.
    pub gen_ns: u64,
}

impl Message {
    /// Encode into a fixed header buffer.
    pub fn encode(&self) -> [u8; WIRE_HEADER_SIZE] {
        let mut buf = [0u8; WIRE_HEADER_SIZE];
        buf[0] = self.kind as u8;
        buf[1..3].copy_from_slice(&self.cluster_id.to_be_bytes());
        buf[3..5].copy_from_slice(&self.src_id.to_be_bytes());
        buf[5..7].copy_from_slice(&self.dst_id.to_be_bytes());
        buf[7..9].copy_from_slice(&self.queue_depth.to_be_bytes());
        buf[9..11].copy_from_slice(&self.seq_num.to_be_bytes());
        buf[11..13].copy_from_slice(&self.client_id.to_be_bytes());
        buf[13..17].copy_from_slice(&self.request_id.to_be_bytes());
        buf[17..21].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[21..29].copy_from_slice(&self.run_ns.to_be_bytes());
        buf[29..37].copy_from_slice(&self.gen_ns.to_be_bytes());
        buf
    }

    /// Decode from the front of a packet buffer.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < WIRE_HEADER_SIZE {
            return Err(CodecError::ShortHeader(buf.len()));
        }
        let kind = MessageKind::from_wire(buf[0])?;
        Ok(Self {
            kind,
            cluster_id: u16::from_be_bytes([buf[1], buf[2]]),
            src_id: u16::from_be_bytes([buf[3], buf[4]]),
            dst_id: u16::from_be_bytes([buf[5], buf[6]]),
            queue_depth: u16::from_be_bytes([buf[7], buf[8]]),
            seq_num: u16::from_be_bytes([buf[9], buf[10]]),
            client_id: u16::from_be_bytes([buf[11], buf[12]]),
            request_id: u32::from_be_bytes([buf[13], buf[14], buf[15], buf[16]]),
            payload_len: u32::from_be_bytes([buf[17], buf[18], buf[19], buf[20]]),
            run_ns: u64::from_be_bytes(buf[21..29].try_into().expect("sized above")),
            gen_ns: u64::from_be_bytes(buf[29..37].try_into().expect("sized above")),
        })
    }
}
