//! Transaction scheduling: queue policy, write-drain hysteresis, and
//! expansion of transactions into DRAM command sequences.

use log::trace;

use crate::common::{CmdKind, Command, Cycle, MemOp, Transaction};
use crate::config::{BankPolicy, PolicyConfig, TxnPolicy};
use crate::ctrl::cmd_scheduler::{CmdScheduler, ShadowRow};
use crate::stats::CtrlStats;

pub struct TxnScheduler {
    queue: Vec<Transaction>,
    capacity: usize,

    policy: TxnPolicy,
    bank_policy: BankPolicy,
    read_first: bool,
    max_write_frac: f32,
    min_write_frac: f32,

    /// Write-drain hysteresis state: once pending writes exceed the max
    /// fraction, only writes are scheduled until they fall below the min.
    draining_writes: bool,

    /// Credits into the command scheduler's queue.
    cmd_credits: u32,
    /// Transaction-queue slots freed since the last collection.
    freed: u32,
}

impl TxnScheduler {
    pub fn new(policy: &PolicyConfig, capacity: usize, cmd_q_depth: u32) -> Self {
        Self {
            queue: Vec::with_capacity(capacity),
            capacity,
            policy: policy.txn_scheduling_policy,
            bank_policy: policy.bank_policy,
            read_first: policy.read_first,
            max_write_frac: policy.max_pending_write_frac,
            min_write_frac: policy.min_pending_write_frac,
            draining_writes: false,
            cmd_credits: cmd_q_depth,
            freed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Accepts an arriving transaction. The bridge's request credits
    /// bound arrivals, so the queue cannot overflow here.
    pub fn push(&mut self, txn: Transaction) {
        debug_assert!(self.queue.len() < self.capacity, "transaction queue overrun");
        self.queue.push(txn);
    }

    pub fn add_cmd_credits(&mut self, credits: u32) {
        self.cmd_credits += credits;
    }

    pub fn take_freed(&mut self) -> u32 {
        std::mem::take(&mut self.freed)
    }

    /// One scheduling opportunity: pick at most one transaction, expand it
    /// against the shadow row state, and hand the commands down if enough
    /// command-queue credits are in hand.
    pub fn schedule_pass(
        &mut self,
        now: Cycle,
        cmd_sched: &mut CmdScheduler,
        stats: &mut CtrlStats,
    ) {
        if self.queue.is_empty() {
            return;
        }

        self.update_drain_mode();

        let Some(pick) = self.pick(cmd_sched) else {
            return;
        };

        let expansion = expand(&self.queue[pick], cmd_sched, self.bank_policy);
        if expansion.len() > self.cmd_credits as usize {
            return;
        }

        let txn = self.queue.remove(pick);
        trace!(
            "cycle {now}: txn {} ({:?}) -> {} cmd(s)",
            txn.id.0,
            txn.op,
            expansion.len()
        );

        match expansion.len() {
            1 => stats.row_hits += 1,
            2 => stats.row_misses += 1,
            _ => stats.row_conflicts += 1,
        }

        self.cmd_credits -= expansion.len() as u32;
        cmd_sched.push(expansion);
        self.freed += 1;
    }

    fn update_drain_mode(&mut self) {
        // Hysteresis only means something when the scheduler may reorder;
        // a strictly in-order queue drains whatever is at the head.
        if self.policy == TxnPolicy::InOrder {
            return;
        }
        let writes = self
            .queue
            .iter()
            .filter(|t| t.op == MemOp::Write)
            .count() as f32;
        if writes == 0.0 {
            self.draining_writes = false;
            return;
        }
        let frac = writes / self.queue.len() as f32;
        if frac >= self.max_write_frac {
            self.draining_writes = true;
        } else if frac <= self.min_write_frac {
            self.draining_writes = false;
        }
    }

    /// Index of the transaction to schedule this cycle, or `None`.
    ///
    /// `InOrder` considers only the head. `Frfcfs` ranks by (row hit,
    /// age), optionally putting reads ahead of writes, and flips to
    /// writes-only while draining.
    fn pick(&self, cmd_sched: &CmdScheduler) -> Option<usize> {
        match self.policy {
            TxnPolicy::InOrder => Some(0),
            TxnPolicy::Frfcfs => {
                let mut best: Option<(u8, u8, u64, usize)> = None;
                for (idx, txn) in self.queue.iter().enumerate() {
                    if self.draining_writes && txn.op == MemOp::Read {
                        continue;
                    }
                    let row_hit =
                        cmd_sched.shadow(txn.target.bank_id) == ShadowRow::Open(txn.target.row);
                    let op_class = if self.read_first && !self.draining_writes {
                        (txn.op == MemOp::Write) as u8
                    } else {
                        0
                    };
                    let key = (op_class, !row_hit as u8, txn.id.0, idx);
                    if best.map_or(true, |b| (key.0, key.1, key.2) < (b.0, b.1, b.2)) {
                        best = Some(key);
                    }
                }
                best.map(|(_, _, _, idx)| idx)
            }
        }
    }
}

/// Expands a transaction into its command sequence given the row the
/// target bank will have open by the time these commands reach the head
/// of their bank's order.
fn expand(txn: &Transaction, cmd_sched: &CmdScheduler, bank_policy: BankPolicy) -> Vec<Command> {
    let t = txn.target;
    let data_kind = match (bank_policy, txn.op) {
        (BankPolicy::Closed, MemOp::Read) => CmdKind::ReadA,
        (BankPolicy::Closed, MemOp::Write) => CmdKind::WriteA,
        (BankPolicy::Open, MemOp::Read) => CmdKind::Read,
        (BankPolicy::Open, MemOp::Write) => CmdKind::Write,
    };

    let mut cmds = Vec::with_capacity(3);
    match cmd_sched.shadow(t.bank_id) {
        ShadowRow::Open(row) if row == t.row && bank_policy == BankPolicy::Open => {}
        ShadowRow::Open(_) => {
            cmds.push(Command::new(txn.id, CmdKind::Pre, txn.addr, t));
            cmds.push(Command::new(txn.id, CmdKind::Act, txn.addr, t));
        }
        ShadowRow::Idle => {
            cmds.push(Command::new(txn.id, CmdKind::Act, txn.addr, t));
        }
    }
    cmds.push(Command::new(txn.id, data_kind, txn.addr, t));
    cmds
}
