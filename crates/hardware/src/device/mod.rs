//! DIMM device model: the bank-state arena and command application.
//!
//! All bank, bank-group, rank, and channel timing state is held here in
//! flat arenas indexed by the ids the address mapper computes. Every
//! mutation flows through [`Dimm::apply`]; nothing else aliases the
//! arenas. [`Dimm::can_issue`] is the complete JEDEC gate: if it says
//! yes, `apply` is legal this cycle, and the scheduler relies on exactly
//! that contract.

pub mod bank;
pub mod rank;

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::debug;

use crate::common::{CmdKind, Command, Cycle, SimError, TxnId};
use crate::config::{TimingConfig, TopologyConfig};

pub use bank::{Bank, BankState};
pub use rank::{BankGroupState, ChannelState, RankState};

/// A data command whose latency is still elapsing.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Inflight {
    done_at: Cycle,
    seq: u64,
    txn_id: TxnId,
}

impl Ord for Inflight {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.done_at, self.seq, self.txn_id).cmp(&(other.done_at, other.seq, other.txn_id))
    }
}

impl PartialOrd for Inflight {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Dimm {
    timing: TimingConfig,

    banks: Vec<Bank>,
    bank_groups: Vec<BankGroupState>,
    ranks: Vec<RankState>,
    channels: Vec<ChannelState>,

    banks_per_group: usize,
    groups_per_rank: usize,
    ranks_per_channel: usize,

    inflight: BinaryHeap<Reverse<Inflight>>,
    issue_seq: u64,
}

impl Dimm {
    pub fn new(topology: &TopologyConfig, timing: TimingConfig) -> Self {
        let num_banks = topology.num_banks() as usize;
        let num_groups = topology.num_bank_groups() as usize;
        let num_ranks = topology.num_ranks() as usize;
        let num_channels = topology.num_channels as usize;

        debug!(
            "device arena: {num_channels} channel(s), {num_ranks} rank(s), \
             {num_groups} bank group(s), {num_banks} bank(s)"
        );

        Self {
            timing,
            banks: vec![Bank::new(); num_banks],
            bank_groups: vec![BankGroupState::default(); num_groups],
            ranks: vec![RankState::new(); num_ranks],
            channels: vec![ChannelState::default(); num_channels],
            banks_per_group: topology.num_banks_per_bank_group as usize,
            groups_per_rank: topology.num_bank_groups_per_rank as usize,
            ranks_per_channel: topology.num_ranks_per_channel as usize,
            inflight: BinaryHeap::new(),
            issue_seq: 0,
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn bank(&self, bank_id: usize) -> &Bank {
        &self.banks[bank_id]
    }

    pub fn rank_of(&self, bank_id: usize) -> usize {
        bank_id / (self.banks_per_group * self.groups_per_rank)
    }

    pub fn group_of(&self, bank_id: usize) -> usize {
        bank_id / self.banks_per_group
    }

    pub fn channel_of(&self, bank_id: usize) -> usize {
        self.rank_of(bank_id) / self.ranks_per_channel
    }

    pub fn rank(&self, rank_id: usize) -> &RankState {
        &self.ranks[rank_id]
    }

    pub fn num_ranks(&self) -> usize {
        self.ranks.len()
    }

    /// Flat ids of every bank in `rank_id`, in arena order.
    pub fn banks_of_rank(&self, rank_id: usize) -> std::ops::Range<usize> {
        let per_rank = self.banks_per_group * self.groups_per_rank;
        rank_id * per_rank..(rank_id + 1) * per_rank
    }

    /// Reconstructs full coordinates for a flat bank id; used when the
    /// refresh engine synthesizes commands that never passed through the
    /// address mapper.
    pub fn decoded_for(&self, bank_id: usize, row: u32) -> crate::common::DecodedAddr {
        let rank_id = self.rank_of(bank_id);
        crate::common::DecodedAddr {
            channel: (rank_id / self.ranks_per_channel) as u32,
            rank: (rank_id % self.ranks_per_channel) as u32,
            bank_group: (self.group_of(bank_id) % self.groups_per_rank) as u32,
            bank: (bank_id % self.banks_per_group) as u32,
            row,
            col: 0,
            bank_id,
        }
    }

    /// Resolves timed bank transitions. Run once at the top of each cycle.
    pub fn tick(&mut self, now: Cycle) {
        for bank in &mut self.banks {
            bank.tick(now);
        }
    }

    pub fn rank_refreshing(&self, rank_id: usize, now: Cycle) -> bool {
        self.ranks[rank_id].refreshing(now)
    }

    /// The full timing gate: same-bank windows plus every cross-bank
    /// constraint scoped to the command's bank group, rank, and channel.
    pub fn can_issue(&self, cmd: &Command, now: Cycle) -> bool {
        let t = &self.timing;

        match cmd.kind {
            CmdKind::Ref => {
                let rank_id = self.rank_of(cmd.banks()[0]);
                if self.ranks[rank_id].refreshing(now) {
                    return false;
                }
                cmd.banks()
                    .iter()
                    .all(|&b| self.banks[b].can_accept(CmdKind::Ref, 0, now))
            }
            CmdKind::Pre => cmd
                .banks()
                .iter()
                .all(|&b| self.banks[b].can_accept(CmdKind::Pre, 0, now)),
            CmdKind::Act => {
                let bank_id = cmd.target.bank_id;
                let rank = &self.ranks[self.rank_of(bank_id)];
                let group = &self.bank_groups[self.group_of(bank_id)];

                if rank.refreshing(now) {
                    return false;
                }
                if !self.banks[bank_id].can_accept(CmdKind::Act, cmd.target.row, now) {
                    return false;
                }
                if rank.acts_in_faw(now, t) >= 4 {
                    return false;
                }
                if matches!(group.last_act, Some(at) if now < at + t.n_rrd_l) {
                    return false;
                }
                if matches!(rank.last_act, Some(at) if now < at + t.n_rrd_s) {
                    return false;
                }
                true
            }
            kind @ (CmdKind::Read | CmdKind::ReadA | CmdKind::Write | CmdKind::WriteA) => {
                let bank_id = cmd.target.bank_id;
                let rank = &self.ranks[self.rank_of(bank_id)];
                let group = &self.bank_groups[self.group_of(bank_id)];
                let channel = &self.channels[self.channel_of(bank_id)];

                if rank.refreshing(now) {
                    return false;
                }
                if !self.banks[bank_id].can_accept(kind, cmd.target.row, now) {
                    return false;
                }
                if now < group.next_col || now < channel.next_col {
                    return false;
                }
                if kind.is_read() && (now < group.next_read || now < rank.next_read) {
                    return false;
                }
                if kind.is_write() && now < channel.next_write {
                    return false;
                }
                true
            }
        }
    }

    /// Applies an issued command, opening the timing windows it implies and
    /// scheduling the upstream completion for data commands.
    ///
    /// Returns `SimError::TimingViolation` if the command was not actually
    /// issuable, which is a scheduler bug, never an input condition.
    pub fn apply(&mut self, cmd: &Command, now: Cycle) -> Result<(), SimError> {
        if !self.can_issue(cmd, now) {
            debug_assert!(false, "command applied while a timing window is open");
            return Err(SimError::TimingViolation {
                cycle: now,
                bank_id: cmd.target.bank_id,
                mnemonic: cmd.kind.mnemonic(),
            });
        }

        let t = self.timing.clone();
        match cmd.kind {
            CmdKind::Ref => {
                let rank_id = self.rank_of(cmd.banks()[0]);
                for &b in cmd.banks() {
                    self.banks[b].apply(CmdKind::Ref, 0, now, &t);
                }
                self.ranks[rank_id].refreshing_until = now + t.n_rfc;
            }
            CmdKind::Pre => {
                for &b in cmd.banks() {
                    self.banks[b].apply(CmdKind::Pre, 0, now, &t);
                }
            }
            CmdKind::Act => {
                let bank_id = cmd.target.bank_id;
                self.banks[bank_id].apply(CmdKind::Act, cmd.target.row, now, &t);
                let group_idx = self.group_of(bank_id);
                self.bank_groups[group_idx].last_act = Some(now);
                let rank_idx = self.rank_of(bank_id);
                self.ranks[rank_idx].record_act(now, &t);
            }
            kind => {
                let bank_id = cmd.target.bank_id;
                self.banks[bank_id].apply(kind, cmd.target.row, now, &t);

                let group_idx = self.group_of(bank_id);
                let group = &mut self.bank_groups[group_idx];
                group.next_col = now + t.n_ccd_l;
                if kind.is_write() {
                    group.next_read = group.next_read.max(now + t.n_cwl + t.n_bl + t.n_wtr_l);
                }

                let rank_idx = self.rank_of(bank_id);
                let rank = &mut self.ranks[rank_idx];
                if kind.is_write() {
                    rank.next_read = rank.next_read.max(now + t.n_cwl + t.n_bl + t.n_wtr_s);
                }

                let channel_idx = self.channel_of(bank_id);
                let channel = &mut self.channels[channel_idx];
                channel.next_col = now + t.n_ccd_s;
                if kind.is_read() {
                    channel.next_write = channel.next_write.max(now + t.n_rtw);
                }

                let latency = if kind.is_read() {
                    t.read_latency()
                } else {
                    t.write_latency()
                };
                if let Some(txn_id) = cmd.txn_id {
                    self.issue_seq += 1;
                    self.inflight.push(Reverse(Inflight {
                        done_at: now + latency,
                        seq: self.issue_seq,
                        txn_id,
                    }));
                }
            }
        }
        Ok(())
    }

    /// Transactions whose data command finished by `now`, in deterministic
    /// (completion-cycle, issue-order) order.
    pub fn take_completions(&mut self, now: Cycle) -> Vec<(TxnId, Cycle)> {
        let mut done = Vec::new();
        while matches!(self.inflight.peek(), Some(Reverse(head)) if head.done_at <= now) {
            if let Some(Reverse(head)) = self.inflight.pop() {
                done.push((head.txn_id, head.done_at));
            }
        }
        done
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }
}
