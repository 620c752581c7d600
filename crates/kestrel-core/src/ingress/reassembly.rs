//! Multi-packet request reassembly.
//!
//! Requests spanning several packets are collected in a fixed-capacity
//! ledger keyed by (client, request). Cells are scanned linearly — the
//! ledger is small and in-flight multi-packet requests are rare. The last
//! fragment to land completes the request and frees the cell.

use bytes::Bytes;

use crate::structures::pool::RequestPool;
use crate::types::error::AdmitError;
use crate::types::ids::QueueId;
use crate::types::message::Message;
use crate::types::request::Request;

struct Cell {
    client_id: u16,
    request_id: u32,
    remaining: u8,
    req: Box<Request>,
}

/// The fragment ledger.
pub struct ReassemblyLedger {
    cells: Vec<Option<Cell>>,
}

impl ReassemblyLedger {
    /// Ledger with room for `capacity` in-flight requests.
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: (0..capacity.max(1)).map(|_| None).collect(),
        }
    }

    /// Requests currently being assembled.
    pub fn in_flight(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Fold one fragment in. Returns the completed request when this was
    /// the last missing fragment.
    pub fn offer(
        &mut self,
        header: &Message,
        pkt: Bytes,
        queue: QueueId,
        idle_selected: bool,
        fragments: u8,
        pool: &RequestPool,
    ) -> Result<Option<Box<Request>>, AdmitError> {
        for slot in self.cells.iter_mut() {
            let matches = slot.as_ref().is_some_and(|cell| {
                cell.client_id == header.client_id && cell.request_id == header.request_id
            });
            if matches {
                let cell = slot.as_mut().expect("matched above");
                cell.req.set_fragment(header.seq_num as usize, pkt);
                cell.remaining -= 1;
                if cell.remaining == 0 {
                    let cell = slot.take().expect("matched above");
                    return Ok(Some(cell.req));
                }
                return Ok(None);
            }
        }

        let free = self
            .cells
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(AdmitError::ReassemblyFull)?;
        let mut req = pool.acquire().ok_or(AdmitError::RequestPoolExhausted)?;
        req.begin(queue, fragments, idle_selected);
        req.set_fragment(header.seq_num as usize, pkt);
        *free = Some(Cell {
            client_id: header.client_id,
            request_id: header.request_id,
            remaining: fragments - 1,
            req,
        });
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::MessageKind;

    fn header(client_id: u16, request_id: u32, seq_num: u16) -> Message {
        Message {
            kind: MessageKind::NewTask,
            cluster_id: 0,
            src_id: 0,
            dst_id: 0,
            queue_depth: 0,
            seq_num,
            client_id,
            request_id,
            payload_len: 0,
            run_ns: 0,
            gen_ns: 0,
        }
    }

    #[test]
    fn two_fragments_complete_in_any_order() {
        // Goal: the last fragment to land completes the request.
        let pool = RequestPool::new(4);
        let mut ledger = ReassemblyLedger::new(2);
        let h0 = header(1, 10, 1);
        let h1 = header(1, 10, 0);
        assert!(ledger
            .offer(&h0, Bytes::from_static(b"b"), QueueId(0), false, 2, &pool)
            .unwrap()
            .is_none());
        assert_eq!(ledger.in_flight(), 1);
        let req = ledger
            .offer(&h1, Bytes::from_static(b"a"), QueueId(0), false, 2, &pool)
            .unwrap()
            .expect("completed");
        assert_eq!(ledger.in_flight(), 0);
        assert_eq!(req.pkt_count(), 2);
        assert_eq!(&req.first_packet().unwrap()[..], b"a");
    }

    #[test]
    fn interleaved_clients_do_not_mix() {
        let pool = RequestPool::new(4);
        let mut ledger = ReassemblyLedger::new(4);
        ledger
            .offer(&header(1, 10, 0), Bytes::new(), QueueId(0), false, 2, &pool)
            .unwrap();
        ledger
            .offer(&header(2, 10, 0), Bytes::new(), QueueId(1), false, 2, &pool)
            .unwrap();
        assert_eq!(ledger.in_flight(), 2);
        let done = ledger
            .offer(&header(2, 10, 1), Bytes::new(), QueueId(1), false, 2, &pool)
            .unwrap()
            .expect("client 2 completed");
        assert_eq!(done.queue(), QueueId(1));
        assert_eq!(ledger.in_flight(), 1);
    }

    #[test]
    fn full_ledger_declines() {
        let pool = RequestPool::new(4);
        let mut ledger = ReassemblyLedger::new(1);
        ledger
            .offer(&header(1, 1, 0), Bytes::new(), QueueId(0), false, 2, &pool)
            .unwrap();
        let err = ledger
            .offer(&header(2, 2, 0), Bytes::new(), QueueId(0), false, 2, &pool)
            .unwrap_err();
        assert!(matches!(err, AdmitError::ReassemblyFull));
    }

    #[test]
    fn exhausted_pool_declines_new_cell() {
        let pool = RequestPool::new(1);
        let held = pool.acquire().unwrap();
        let mut ledger = ReassemblyLedger::new(2);
        let err = ledger
            .offer(&header(1, 1, 0), Bytes::new(), QueueId(0), false, 2, &pool)
            .unwrap_err();
        assert!(matches!(err, AdmitError::RequestPoolExhausted));
        pool.release(held);
    }
}
