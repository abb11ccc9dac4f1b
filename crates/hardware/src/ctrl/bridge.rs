//! The transaction bridge: the external-facing edge of the controller.
//!
//! Flow control is explicit token exchange, exactly as the real link
//! protocol does it: a sender holds an integer credit counter sized to the
//! receiver's queue, spends one credit per send, and gets credits back only
//! when the receiver has drained entries, and only at a tick boundary,
//! never mid-cycle. `submit` with zero credits is a rejection, not an
//! error: the caller backs off and retries.

use std::collections::{HashMap, VecDeque};

use crate::addr::AddressMapper;
use crate::common::{Completion, Cycle, MemOp, Transaction, TxnId};

/// Fill byte for read payloads. This is a timing model; data content is
/// opaque.
const READ_FILL: u8 = 0xA5;

struct PendingTxn {
    op: MemOp,
    addr: u64,
    size_bytes: u32,
    arrival: Cycle,
}

pub struct TxnBridge {
    /// Credits toward the transaction scheduler's queue.
    req_credits: u32,
    /// Credits toward our own completion queue, spent by the pipeline
    /// when it delivers a response, returned when the caller drains.
    res_credits: u32,

    max_outstanding: u32,
    outstanding: u32,

    next_id: u64,
    /// Accepted this cycle, handed to the scheduler at the next tick.
    staging: VecDeque<Transaction>,
    /// Completed, waiting for the caller to drain.
    completions: VecDeque<Completion>,
    /// In-flight transactions by id; completions match by id, never by
    /// position, since banks finish out of order.
    pending: HashMap<u64, PendingTxn>,

    /// Response credits the caller has returned, applied at tick time.
    drained: u32,
}

impl TxnBridge {
    pub fn new(txn_q_depth: u32, max_outstanding: u32) -> Self {
        Self {
            req_credits: txn_q_depth,
            res_credits: max_outstanding,
            max_outstanding,
            outstanding: 0,
            next_id: 0,
            staging: VecDeque::new(),
            completions: VecDeque::new(),
            pending: HashMap::new(),
            drained: 0,
        }
    }

    pub fn req_credits(&self) -> u32 {
        self.req_credits
    }

    pub fn res_credits(&self) -> u32 {
        self.res_credits
    }

    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }

    /// Offers a transaction to the controller. Returns the assigned id,
    /// or `None` under backpressure (no request credit, or the
    /// outstanding-transaction cap is reached).
    pub fn submit(
        &mut self,
        op: MemOp,
        addr: u64,
        size_bytes: u32,
        now: Cycle,
        mapper: &AddressMapper,
    ) -> Option<TxnId> {
        if self.req_credits == 0 || self.outstanding >= self.max_outstanding {
            return None;
        }
        self.req_credits -= 1;
        self.outstanding += 1;

        let id = TxnId(self.next_id);
        self.next_id += 1;

        self.pending.insert(
            id.0,
            PendingTxn {
                op,
                addr,
                size_bytes,
                arrival: now,
            },
        );
        self.staging.push_back(Transaction {
            id,
            addr,
            op,
            size_bytes,
            arrival: now,
            target: mapper.map(addr),
        });
        Some(id)
    }

    /// Moves this cycle's arrivals toward the scheduler.
    pub fn flush_staging(&mut self) -> impl Iterator<Item = Transaction> + '_ {
        self.staging.drain(..)
    }

    /// Whether a response can be accepted this cycle.
    pub fn can_accept_response(&self) -> bool {
        self.res_credits > 0
    }

    /// Delivers a completion up from the pipeline, spending one response
    /// credit. Returns the measured latency and operation, or `None` for
    /// an unknown id (which would be a pipeline bug; ids are never
    /// invented).
    pub fn complete(&mut self, txn_id: TxnId, done: Cycle) -> Option<(Cycle, MemOp)> {
        let pending = self.pending.remove(&txn_id.0)?;
        debug_assert!(self.res_credits > 0, "response delivered without a credit");

        self.res_credits -= 1;
        self.outstanding -= 1;

        let latency = done - pending.arrival;
        let data = match pending.op {
            MemOp::Read => {
                Some(vec![READ_FILL; pending.size_bytes as usize].into_boxed_slice())
            }
            MemOp::Write => None,
        };
        self.completions.push_back(Completion {
            txn_id,
            op: pending.op,
            addr: pending.addr,
            completed: done,
            latency,
            data,
        });
        Some((latency, pending.op))
    }

    /// Hands every buffered completion to the caller. The freed response
    /// credits become visible to the pipeline at the next tick.
    pub fn drain_completions(&mut self) -> Vec<Completion> {
        self.drained += self.completions.len() as u32;
        self.completions.drain(..).collect()
    }

    pub fn completions_waiting(&self) -> usize {
        self.completions.len()
    }

    /// Tick-boundary credit movement.
    pub fn add_req_credits(&mut self, credits: u32) {
        self.req_credits += credits;
    }

    pub fn apply_drained_credits(&mut self) {
        self.res_credits += std::mem::take(&mut self.drained);
    }

    /// No transaction anywhere between acceptance and completion
    /// delivery. Undrained completions do not count against idleness.
    pub fn idle(&self) -> bool {
        self.outstanding == 0 && self.staging.is_empty()
    }
}
