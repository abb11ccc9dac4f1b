//! Per-bank state machine and timing-window bookkeeping.
//!
//! Each bank tracks the earliest cycle at which it can legally accept each
//! class of command. Commands update those windows as they are applied;
//! `can_accept` is the single gate the scheduler consults, so a command that
//! reaches `apply` while a window is still open is an internal bug, not a
//! recoverable condition.
//!
//! Cross-bank constraints (tRRD, tCCD, tFAW, write/read turnaround, refresh
//! occupancy) live in the rank/bank-group/channel records in
//! [`super::rank`]; this module owns only same-bank spacing.

use crate::common::{CmdKind, Cycle};
use crate::config::TimingConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BankState {
    Idle,
    Active,
    /// Between PRE issue and tRP elapsing.
    Precharging,
    /// Rank-wide REF in progress.
    Refreshing,
}

#[derive(Clone, Debug)]
pub struct Bank {
    state: BankState,
    open_row: Option<u32>,
    /// Cycle at which Precharging/Refreshing resolves back to Idle.
    idle_at: Cycle,

    next_act: Cycle,
    next_read: Cycle,
    next_write: Cycle,
    next_pre: Cycle,
}

impl Bank {
    pub fn new() -> Self {
        Self {
            state: BankState::Idle,
            open_row: None,
            idle_at: 0,
            next_act: 0,
            next_read: 0,
            next_write: 0,
            next_pre: 0,
        }
    }

    pub fn state(&self) -> BankState {
        self.state
    }

    pub fn open_row(&self) -> Option<u32> {
        self.open_row
    }

    /// Resolves timed transitions. Called once per cycle before any
    /// scheduling decision looks at the bank.
    pub fn tick(&mut self, now: Cycle) {
        if matches!(self.state, BankState::Precharging | BankState::Refreshing)
            && now >= self.idle_at
        {
            self.state = BankState::Idle;
        }
    }

    /// Whether `kind` targeting `row` may issue at `now`, considering only
    /// same-bank constraints.
    pub fn can_accept(&self, kind: CmdKind, row: u32, now: Cycle) -> bool {
        match kind {
            CmdKind::Act => self.state == BankState::Idle && now >= self.next_act,
            CmdKind::Read | CmdKind::ReadA => {
                self.state == BankState::Active
                    && self.open_row == Some(row)
                    && now >= self.next_read
            }
            CmdKind::Write | CmdKind::WriteA => {
                self.state == BankState::Active
                    && self.open_row == Some(row)
                    && now >= self.next_write
            }
            CmdKind::Pre => self.state == BankState::Active && now >= self.next_pre,
            // REF needs the bank precharged and its row cycle finished.
            CmdKind::Ref => self.state == BankState::Idle && now >= self.next_act,
        }
    }

    /// Applies `kind` at `now`, updating every same-bank window it opens.
    /// The caller has already checked `can_accept`.
    pub fn apply(&mut self, kind: CmdKind, row: u32, now: Cycle, t: &TimingConfig) {
        match kind {
            CmdKind::Act => {
                self.state = BankState::Active;
                self.open_row = Some(row);
                self.next_read = now + t.n_rcd;
                self.next_write = now + t.n_rcd;
                self.next_pre = self.next_pre.max(now + t.n_ras);
                self.next_act = self.next_act.max(now + t.n_rc);
            }
            CmdKind::Read => {
                self.next_pre = self.next_pre.max(now + t.n_rtp);
            }
            CmdKind::ReadA => {
                // Auto-precharge starts as soon as tRTP (and any pending
                // write recovery) allows.
                let pre_at = self.next_pre.max(now + t.n_rtp);
                self.close(pre_at, t);
            }
            CmdKind::Write => {
                self.next_pre = self.next_pre.max(now + t.write_latency());
            }
            CmdKind::WriteA => {
                let pre_at = self.next_pre.max(now + t.write_latency());
                self.close(pre_at, t);
            }
            CmdKind::Pre => {
                self.close(now, t);
            }
            CmdKind::Ref => {
                self.state = BankState::Refreshing;
                self.open_row = None;
                self.idle_at = now + t.n_rfc;
                self.next_act = self.next_act.max(now + t.n_rfc);
            }
        }
    }

    fn close(&mut self, pre_at: Cycle, t: &TimingConfig) {
        self.state = BankState::Precharging;
        self.open_row = None;
        self.idle_at = pre_at + t.n_rp;
        self.next_act = self.next_act.max(pre_at + t.n_rp);
    }
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}
