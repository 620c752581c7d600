//! Request objects.
//!
//! A `Request` is the unit of ownership flowing through the engine: one or
//! more received packet buffers that together constitute one client call.
//! Requests are recycled through a fixed pool and move by value between
//! stages (ingress, task queue, dispatch slot, worker, free-list), so there
//! is exactly one owner at any time by construction.

use bytes::Bytes;

use crate::constants::MAX_PKTS_PER_REQUEST;
use crate::types::ids::QueueId;

/// One client call, assembled from up to [`MAX_PKTS_PER_REQUEST`] packets.
#[derive(Debug)]
pub struct Request {
    pkts: [Option<Bytes>; MAX_PKTS_PER_REQUEST],
    pkt_count: u8,
    queue: QueueId,
    idle_selected: bool,
}

impl Request {
    /// An empty request carrying no buffers. Engine code receives requests
    /// from the pool; this exists for pool pre-allocation and test setups.
    pub fn blank() -> Self {
        Self {
            pkts: std::array::from_fn(|_| None),
            pkt_count: 0,
            queue: QueueId(0),
            idle_selected: false,
        }
    }

    /// Initialize for a fresh admission. Fragment slots stay empty until
    /// [`set_fragment`](Self::set_fragment) fills them.
    pub fn begin(&mut self, queue: QueueId, pkt_count: u8, idle_selected: bool) {
        self.queue = queue;
        self.pkt_count = pkt_count;
        self.idle_selected = idle_selected;
    }

    /// Place one fragment. Out-of-range sequence numbers are dropped; the
    /// reassembly ledger never completes such a request and it ages out with
    /// its cell.
    pub fn set_fragment(&mut self, seq: usize, pkt: Bytes) {
        if seq < MAX_PKTS_PER_REQUEST {
            self.pkts[seq] = Some(pkt);
        }
    }

    /// Target queue this request was admitted for.
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    /// Number of packets this request spans.
    pub fn pkt_count(&self) -> u8 {
        self.pkt_count
    }

    /// True when the upstream scheduler chose the worker believing it idle.
    pub fn idle_selected(&self) -> bool {
        self.idle_selected
    }

    /// First packet buffer, the one carrying the header the worker decodes.
    pub fn first_packet(&self) -> Option<&Bytes> {
        self.pkts[0].as_ref()
    }

    /// Drop all buffers and reset metadata for reuse.
    pub fn reset(&mut self) {
        for slot in &mut self.pkts {
            *slot = None;
        }
        self.pkt_count = 0;
        self.queue = QueueId(0);
        self.idle_selected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_buffers_and_flags() {
        // Goal: a recycled request carries nothing over from its last life.
        let mut req = Request::blank();
        req.begin(QueueId(3), 2, true);
        req.set_fragment(0, Bytes::from_static(b"abc"));
        req.set_fragment(1, Bytes::from_static(b"def"));
        req.reset();
        assert!(req.first_packet().is_none());
        assert_eq!(req.pkt_count(), 0);
        assert!(!req.idle_selected());
    }

    #[test]
    fn out_of_range_fragment_is_dropped() {
        let mut req = Request::blank();
        req.begin(QueueId(0), 1, false);
        req.set_fragment(MAX_PKTS_PER_REQUEST + 1, Bytes::from_static(b"x"));
        assert!(req.first_packet().is_none());
    }
}
