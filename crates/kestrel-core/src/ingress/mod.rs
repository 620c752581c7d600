//! Ingress-side boundary glue.
//!
//! The courier is the producer half of the engine: it turns received packet
//! buffers into admitted requests (reassembling multi-packet ones), feeds
//! them to the dispatcher through the batch handoff, drains freed requests
//! back into the pool, and keeps the upstream scheduler alive with periodic
//! heartbeats. The physical receive path that produces the packets is
//! outside this crate.

/// Multi-packet request reassembly
pub mod reassembly;

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use crate::constants::{MAX_PKTS_PER_REQUEST, WIRE_HEADER_SIZE};
use crate::dispatch::egress::EgressSink;
use crate::dispatch::occupancy::EngineStats;
use crate::structures::handoff::{Arrival, IngressProducer};
use crate::structures::pool::RequestPool;
use crate::system::clock::Clock;
use crate::types::error::AdmitError;
use crate::types::ids::{WorkerId, WorkerMap};
use crate::types::message::{Message, MessageKind};

pub use reassembly::ReassemblyLedger;

/// The ingress producer: packet in, admitted request toward the dispatcher.
pub struct IngressCourier {
    producer: IngressProducer,
    pool: Arc<RequestPool>,
    map: WorkerMap,
    ledger: ReassemblyLedger,
    staged: VecDeque<Arrival>,
    stats: Arc<EngineStats>,
    egress: Arc<dyn EgressSink>,
    clock: Clock,
    cluster_id: u16,
    parent_id: u16,
    keep_alive_interval_ns: u64,
    last_keep_alive_ns: u64,
    keep_alive_seq: u32,
}

impl IngressCourier {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        producer: IngressProducer,
        pool: Arc<RequestPool>,
        map: WorkerMap,
        ledger_cells: usize,
        stats: Arc<EngineStats>,
        egress: Arc<dyn EgressSink>,
        clock: Clock,
        cluster_id: u16,
        parent_id: u16,
        keep_alive_interval_us: u64,
    ) -> Self {
        Self {
            producer,
            pool,
            map,
            ledger: ReassemblyLedger::new(ledger_cells),
            staged: VecDeque::new(),
            stats,
            egress,
            clock,
            cluster_id,
            parent_id,
            keep_alive_interval_ns: keep_alive_interval_us.saturating_mul(1_000),
            last_keep_alive_ns: clock.now_ns(),
            keep_alive_seq: 0,
        }
    }

    /// Fold one received packet in. Returns true when a complete request
    /// was staged for the dispatcher. Declined packets leave all accounting
    /// untouched; the client's retransmission layer recovers them.
    pub fn offer_packet(&mut self, pkt: Bytes) -> Result<bool, AdmitError> {
        let header = Message::decode(&pkt)?;
        let Some(queue) = self.map.resolve(WorkerId(header.dst_id)) else {
            self.stats
                .declined
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::warn!(dst = header.dst_id, "dropping packet for unknown worker");
            return Err(AdmitError::UnknownWorker(header.dst_id));
        };
        // The upstream scheduler reuses the depth field on inbound tasks as
        // its idle-selection tag.
        let idle_selected = header.queue_depth == 1;
        // Fragment count is carried as total payload bytes in header-sized
        // units; anything malformed or single-unit is one packet.
        let fragments = (header.payload_len as usize / WIRE_HEADER_SIZE)
            .clamp(1, MAX_PKTS_PER_REQUEST) as u8;

        let completed = if fragments == 1 {
            let mut req = self.pool.acquire().ok_or_else(|| {
                self.stats
                    .declined
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                AdmitError::RequestPoolExhausted
            })?;
            req.begin(queue, 1, idle_selected);
            req.set_fragment(0, pkt);
            Some(req)
        } else {
            self.ledger
                .offer(&header, pkt, queue, idle_selected, fragments, &self.pool)
                .map_err(|err| {
                    self.stats
                        .declined
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    err
                })?
        };

        match completed {
            Some(req) => {
                self.staged.push_back(Arrival { req, queue });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Exchange with the dispatcher: reclaim freed requests into the pool
    /// and publish staged arrivals, up to one batch. An empty batch is still
    /// published — the exchange is what carries freed requests back, so it
    /// must keep cycling even when no new work arrives. Returns the number
    /// of arrivals published.
    pub fn flush(&mut self) -> usize {
        let Some(mut batch) = self.producer.try_open() else {
            return 0;
        };
        while let Some(req) = batch.take_freed() {
            self.pool.release(req);
        }
        let mut published = 0;
        while let Some(arrival) = self.staged.pop_front() {
            match batch.push(arrival) {
                Ok(()) => published += 1,
                Err(arrival) => {
                    self.staged.push_front(arrival);
                    break;
                }
            }
        }
        batch.publish();
        published
    }

    /// Send a keep-alive heartbeat if the configured interval elapsed. The
    /// heartbeat carries the worker roster so the upstream scheduler can
    /// (re)learn which workers this host serves.
    pub fn poll_keep_alive(&mut self) {
        if self.keep_alive_interval_ns == 0 {
            return;
        }
        let now = self.clock.now_ns();
        if now.saturating_sub(self.last_keep_alive_ns) < self.keep_alive_interval_ns {
            return;
        }
        let roster = self.map.roster();
        let mut payload = Vec::with_capacity(roster.len() * 2);
        for id in roster {
            payload.extend_from_slice(&id.to_be_bytes());
        }
        let msg = Message {
            kind: MessageKind::KeepAlive,
            cluster_id: self.cluster_id,
            src_id: roster.first().copied().unwrap_or(0),
            dst_id: self.parent_id,
            queue_depth: roster.len() as u16,
            seq_num: 0,
            client_id: roster.first().copied().unwrap_or(0),
            request_id: self.keep_alive_seq,
            payload_len: payload.len() as u32,
            run_ns: 0,
            gen_ns: now,
        };
        self.egress.send(&msg, &payload);
        self.keep_alive_seq = self.keep_alive_seq.wrapping_add(1);
        self.last_keep_alive_ns = now;
    }

    /// Arrivals staged but not yet published.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Requests available in the pool. Test and introspection hook.
    pub fn pool_available(&self) -> usize {
        self.pool.available()
    }

    /// Requests being reassembled.
    pub fn reassembling(&self) -> usize {
        self.ledger.in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::egress::RecordingSink;
    use crate::structures::handoff::IngressHandoff;
    use crate::types::ids::QueueId;

    fn packet(dst_id: u16, request_id: u32, idle_selected: bool) -> Bytes {
        let header = Message {
            kind: MessageKind::NewTask,
            cluster_id: 0,
            src_id: 9,
            dst_id,
            queue_depth: if idle_selected { 1 } else { 0 },
            seq_num: 0,
            client_id: 1,
            request_id,
            payload_len: 4,
            run_ns: 0,
            gen_ns: 0,
        };
        let mut pkt = header.encode().to_vec();
        pkt.extend_from_slice(b"data");
        Bytes::from(pkt)
    }

    fn courier(pool_capacity: usize) -> (IngressCourier, crate::structures::handoff::IngressConsumer)
    {
        let (producer, consumer) = IngressHandoff::split();
        let courier = IngressCourier::new(
            producer,
            RequestPool::new(pool_capacity),
            WorkerMap::new(vec![1, 2]),
            4,
            Arc::new(EngineStats::default()),
            Arc::new(RecordingSink::new()),
            Clock::new(),
            0,
            0,
            0,
        );
        (courier, consumer)
    }

    #[test]
    fn single_packet_request_is_staged_and_published() {
        // Goal: a decodable single-packet request flows into the handoff
        // with its idle-selection tag preserved.
        let (mut courier, mut consumer) = courier(4);
        assert!(courier.offer_packet(packet(0, 1, true)).unwrap());
        assert_eq!(courier.pending(), 1);
        assert_eq!(courier.flush(), 1);
        assert_eq!(courier.pending(), 0);

        let mut batch = consumer.try_drain().expect("published batch");
        let arrival = batch.pop_arrival().expect("one arrival");
        assert_eq!(arrival.queue, QueueId(0));
        assert!(arrival.req.idle_selected());
        batch.finish();
    }

    #[test]
    fn unknown_worker_is_declined() {
        let (mut courier, _consumer) = courier(4);
        let err = courier.offer_packet(packet(40, 1, false)).unwrap_err();
        assert!(matches!(err, AdmitError::UnknownWorker(40)));
        assert_eq!(courier.pending(), 0);
        assert_eq!(courier.pool_available(), 4);
    }

    #[test]
    fn exhausted_pool_declines_with_accounting_intact() {
        // Goal: the arena stays consistent across a declined admission.
        let (mut courier, _consumer) = courier(1);
        assert!(courier.offer_packet(packet(0, 1, false)).unwrap());
        let err = courier.offer_packet(packet(0, 2, false)).unwrap_err();
        assert!(matches!(err, AdmitError::RequestPoolExhausted));
        assert_eq!(courier.pending(), 1);
        assert_eq!(courier.pool_available(), 0);
    }

    #[test]
    fn malformed_packet_is_rejected_before_any_allocation() {
        let (mut courier, _consumer) = courier(4);
        let err = courier
            .offer_packet(Bytes::from_static(b"nonsense"))
            .unwrap_err();
        assert!(matches!(err, AdmitError::Malformed(_)));
        assert_eq!(courier.pool_available(), 4);
    }

    #[test]
    fn keep_alive_carries_roster() {
        let (producer, _consumer) = IngressHandoff::split();
        let sink = Arc::new(RecordingSink::new());
        let mut courier = IngressCourier::new(
            producer,
            RequestPool::new(2),
            WorkerMap::new(vec![3, 4]),
            2,
            Arc::new(EngineStats::default()),
            Arc::clone(&sink) as Arc<dyn EgressSink>,
            Clock::new(),
            5,
            7,
            1, // one microsecond: elapses immediately
        );
        std::thread::sleep(std::time::Duration::from_millis(1));
        courier.poll_keep_alive();
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        let (msg, payload) = &sent[0];
        assert_eq!(msg.kind, MessageKind::KeepAlive);
        assert_eq!(msg.dst_id, 7);
        assert_eq!(msg.cluster_id, 5);
        assert_eq!(payload, &vec![0, 3, 0, 4]);
    }
}
