//! Command scheduling: the issue pass, command-bus arbitration, and the
//! per-rank refresh engine.
//!
//! The queue is kept strictly in insertion order, and insertion order is
//! transaction-id order. The issue scan walks front to back, so whenever
//! several commands are simultaneously issuable the lowest transaction id
//! wins. That single rule is what makes schedules reproducible.

use std::collections::{HashSet, VecDeque};
use std::io::Write;

use log::debug;

use crate::common::{CmdKind, Command, Cycle, DecodedAddr, SimError};
use crate::config::{PolicyConfig, TimingConfig};
use crate::device::{BankState, Dimm};
use crate::stats::CtrlStats;

/// The row each bank will have open once every queued command against it
/// has retired. Expansion consults this instead of live bank state so a
/// transaction scheduled behind a queued ACT sees the row that ACT will
/// open, not the one currently latched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowRow {
    Idle,
    Open(u32),
}

pub struct CmdScheduler {
    queue: VecDeque<Command>,
    capacity: usize,
    shadow: Vec<ShadowRow>,

    find_any_issuable: bool,
    dual_command_bus: bool,
    multi_cycle_act: bool,
    use_refresh: bool,

    /// Remaining busy cycles per channel, row- and column-command bus.
    row_bus_busy: Vec<u32>,
    col_bus_busy: Vec<u32>,

    /// Per-rank cycles until the next refresh is due.
    refi_count: Vec<Cycle>,
    /// Per-rank pending refresh command sequence (PRE, REF, row restores).
    refresh_q: Vec<VecDeque<Command>>,

    freed: u32,
}

impl CmdScheduler {
    pub fn new(
        policy: &PolicyConfig,
        timing: &TimingConfig,
        capacity: usize,
        num_banks: usize,
        num_ranks: usize,
        num_channels: usize,
    ) -> Self {
        // Refreshes are staggered across ranks so their tRFC windows do
        // not line up and stall every channel at once.
        let refi_count = (0..num_ranks as u64)
            .map(|rank| timing.n_refi / (rank + 1))
            .collect();

        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            shadow: vec![ShadowRow::Idle; num_banks],
            find_any_issuable: policy.find_any_issuable,
            dual_command_bus: policy.dual_command_bus,
            multi_cycle_act: policy.multi_cycle_act,
            use_refresh: policy.use_refresh,
            row_bus_busy: vec![0; num_channels],
            col_bus_busy: vec![0; num_channels],
            refi_count,
            refresh_q: vec![VecDeque::new(); num_ranks],
            freed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn space(&self) -> usize {
        self.capacity - self.queue.len()
    }

    pub fn shadow(&self, bank_id: usize) -> ShadowRow {
        self.shadow[bank_id]
    }

    /// Accepts an expanded transaction's commands. The transaction
    /// scheduler holds the credits, so space is an invariant here, not a
    /// condition to handle.
    pub fn push(&mut self, cmds: Vec<Command>) {
        debug_assert!(cmds.len() <= self.space(), "command queue overrun");
        for cmd in cmds {
            let bank_id = cmd.target.bank_id;
            match cmd.kind {
                CmdKind::Act => self.shadow[bank_id] = ShadowRow::Open(cmd.target.row),
                CmdKind::Pre | CmdKind::ReadA | CmdKind::WriteA => {
                    self.shadow[bank_id] = ShadowRow::Idle
                }
                _ => {}
            }
            self.queue.push_back(cmd);
        }
    }

    /// Command-queue slots freed since the last call; the transaction
    /// scheduler turns these back into credits one tick later.
    pub fn take_freed(&mut self) -> u32 {
        std::mem::take(&mut self.freed)
    }

    /// Whether `rank_id` is either inside tRFC or still has refresh
    /// commands waiting. Normal traffic to the rank holds off for both.
    fn rank_in_refresh(&self, dimm: &Dimm, rank_id: usize, now: Cycle) -> bool {
        !self.refresh_q[rank_id].is_empty() || dimm.rank_refreshing(rank_id, now)
    }

    fn bus_free(&self, channel: usize, kind: CmdKind) -> bool {
        if self.dual_command_bus {
            if kind.is_column() {
                self.col_bus_busy[channel] == 0
            } else {
                self.row_bus_busy[channel] == 0
            }
        } else {
            self.row_bus_busy[channel] == 0 && self.col_bus_busy[channel] == 0
        }
    }

    fn occupy_bus(&mut self, channel: usize, kind: CmdKind) {
        if self.dual_command_bus {
            // HBM-style two-cycle activates only matter once the row bus
            // is arbitrated separately.
            let cycles = if kind == CmdKind::Act && self.multi_cycle_act {
                2
            } else {
                1
            };
            if kind.is_column() {
                self.col_bus_busy[channel] = 1;
            } else {
                self.row_bus_busy[channel] = cycles;
            }
        } else {
            self.row_bus_busy[channel] = 1;
            self.col_bus_busy[channel] = 1;
        }
    }

    fn all_buses_busy(&self) -> bool {
        self.row_bus_busy.iter().all(|&b| b > 0) && self.col_bus_busy.iter().all(|&b| b > 0)
    }

    /// Ages out command-bus occupancy. Runs at the top of every cycle,
    /// before refresh or issue takes the bus again.
    pub fn release_buses(&mut self) {
        for busy in self
            .row_bus_busy
            .iter_mut()
            .chain(self.col_bus_busy.iter_mut())
        {
            *busy = busy.saturating_sub(1);
        }
    }

    /// Per-rank refresh countdown and refresh-command issue. Refresh owns
    /// the front of the pipeline: it runs before the normal issue pass and
    /// normal commands skip any rank it is working on.
    pub fn refresh_tick(
        &mut self,
        now: Cycle,
        dimm: &mut Dimm,
        stats: &mut CtrlStats,
        trace: &mut Option<Box<dyn Write>>,
    ) -> Result<(), SimError> {
        if !self.use_refresh {
            return Ok(());
        }

        for rank_id in 0..self.refresh_q.len() {
            if self.refi_count[rank_id] > 0 {
                self.refi_count[rank_id] -= 1;
            } else {
                if !self.refresh_q[rank_id].is_empty() {
                    return Err(SimError::MissedRefresh {
                        rank: rank_id as u32,
                        cycle: now,
                    });
                }
                self.build_refresh_cmds(rank_id, dimm);
                self.refi_count[rank_id] = dimm.timing().n_refi;
            }

            let issuable = match self.refresh_q[rank_id].front() {
                Some(head) => {
                    let channel = dimm.channel_of(head.target.bank_id);
                    self.bus_free(channel, head.kind) && dimm.can_issue(head, now)
                }
                None => false,
            };
            if !issuable {
                continue;
            }

            if let Some(head) = self.refresh_q[rank_id].pop_front() {
                let channel = dimm.channel_of(head.target.bank_id);
                dimm.apply(&head, now)?;
                self.occupy_bus(channel, head.kind);
                stats.count_cmd(head.kind);
                if head.kind == CmdKind::Ref {
                    stats.refreshes += 1;
                }
                write_trace(trace, now, &head);
            }
        }
        Ok(())
    }

    /// All-bank refresh for one rank: precharge whatever is open, refresh,
    /// then re-activate the rows that were open so queued row-hit commands
    /// still find them. The original controller restores rows the same
    /// way; without it, a queued data command whose row a refresh closed
    /// could never issue again.
    fn build_refresh_cmds(&mut self, rank_id: usize, dimm: &Dimm) {
        let mut open = Vec::new();
        for bank_id in dimm.banks_of_rank(rank_id) {
            if let (BankState::Active, Some(row)) =
                (dimm.bank(bank_id).state(), dimm.bank(bank_id).open_row())
            {
                open.push((bank_id, row));
            }
        }

        let all_banks: Vec<usize> = dimm.banks_of_rank(rank_id).collect();
        let rep = dimm.decoded_for(all_banks[0], 0);

        let q = &mut self.refresh_q[rank_id];
        if !open.is_empty() {
            q.push_back(Command::refresh(
                CmdKind::Pre,
                rep,
                open.iter().map(|&(bank_id, _)| bank_id).collect(),
            ));
        }
        q.push_back(Command::refresh(CmdKind::Ref, rep, all_banks));
        for (bank_id, row) in open {
            q.push_back(Command::refresh(
                CmdKind::Act,
                dimm.decoded_for(bank_id, row),
                Vec::new(),
            ));
        }

        debug!("rank {rank_id}: refresh sequence queued ({} cmds)", q.len());
    }

    /// One scheduling opportunity: walk the queue oldest-first and issue
    /// everything that clears the bank, bus, and JEDEC gates, stopping
    /// when the command buses are exhausted. With `find_any_issuable`
    /// off, only the queue head is considered.
    pub fn issue_pass(
        &mut self,
        now: Cycle,
        dimm: &mut Dimm,
        stats: &mut CtrlStats,
        trace: &mut Option<Box<dyn Write>>,
    ) -> Result<(), SimError> {
        if self.queue.is_empty() {
            return Ok(());
        }

        let mut block_bank = vec![false; self.shadow.len()];
        let mut inflight_writes: HashSet<u64> = HashSet::new();
        let mut issued: Vec<usize> = Vec::new();

        let scan = if self.find_any_issuable {
            self.queue.len()
        } else {
            1
        };

        for idx in 0..scan {
            let cmd = &self.queue[idx];
            let bank_id = cmd.target.bank_id;
            let rank_id = dimm.rank_of(bank_id);

            if self.rank_in_refresh(dimm, rank_id, now) {
                continue;
            }

            // Commands to the same bank stay strictly ordered: the first
            // queued command claims the bank whether or not it issues.
            let mut proceed = !block_bank[bank_id];
            block_bank[bank_id] = true;

            // A younger access to an address with an in-flight write this
            // pass holds off; the write settles first.
            if inflight_writes.contains(&cmd.addr) {
                proceed = false;
            }
            if cmd.kind.is_write() {
                inflight_writes.insert(cmd.addr);
            }

            if !proceed {
                continue;
            }

            let channel = dimm.channel_of(bank_id);
            if !self.bus_free(channel, cmd.kind) {
                continue;
            }
            if !dimm.can_issue(cmd, now) {
                continue;
            }

            dimm.apply(cmd, now)?;
            let kind = cmd.kind;
            stats.count_cmd(kind);
            write_trace(trace, now, cmd);
            self.occupy_bus(channel, kind);
            issued.push(idx);

            if self.all_buses_busy() {
                break;
            }
        }

        for idx in issued.into_iter().rev() {
            let _ = self.queue.remove(idx);
            self.freed += 1;
        }
        Ok(())
    }
}

fn write_trace(trace: &mut Option<Box<dyn Write>>, now: Cycle, cmd: &Command) {
    let Some(out) = trace.as_mut() else {
        return;
    };
    let seq = cmd.txn_id.map_or(0, |id| id.0);
    let DecodedAddr {
        channel,
        rank,
        bank_group,
        bank,
        row,
        col,
        bank_id,
    } = cmd.target;
    // Per-line format mirrors the trace consumers expect:
    // @cycle CMD seq 0xaddr ch rank bg bank row col <tab> bankId
    let _ = writeln!(
        out,
        "@{now} {} {seq} {:#x} {channel} {rank} {bank_group} {bank} {row} {col}\t{bank_id}",
        cmd.kind.mnemonic(),
        cmd.addr,
    );
}
