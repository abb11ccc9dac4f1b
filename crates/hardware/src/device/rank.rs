//! Rank, bank-group, and channel aggregate timing state.
//!
//! The same-scope/cross-scope split follows the usual DDR4 pattern: the
//! tighter `_L` constraint is recorded at bank-group scope and the looser
//! `_S` constraint one level up, so checking `max(group, rank)` (or
//! `max(group, channel)`) yields the right bound for both the same-group
//! and cross-group cases.

use std::collections::VecDeque;

use crate::common::Cycle;
use crate::config::TimingConfig;

/// Activates-per-rank bookkeeping for tFAW plus rank-scope turnaround and
/// refresh occupancy.
#[derive(Clone, Debug)]
pub struct RankState {
    /// Issue cycles of recent ACTs, pruned to the tFAW window.
    act_window: VecDeque<Cycle>,
    /// Most recent ACT anywhere in the rank (tRRD_S).
    pub last_act: Option<Cycle>,
    /// Earliest READ after a write anywhere in the rank (tWTR_S).
    pub next_read: Cycle,
    /// Rank is occupied by REF until this cycle.
    pub refreshing_until: Cycle,
}

impl RankState {
    pub fn new() -> Self {
        Self {
            act_window: VecDeque::new(),
            last_act: None,
            next_read: 0,
            refreshing_until: 0,
        }
    }

    pub fn refreshing(&self, now: Cycle) -> bool {
        now < self.refreshing_until
    }

    /// ACTs issued within the trailing tFAW window ending at `now`.
    pub fn acts_in_faw(&self, now: Cycle, t: &TimingConfig) -> usize {
        let window_start = now.saturating_sub(t.n_faw - 1);
        self.act_window
            .iter()
            .filter(|&&at| at >= window_start)
            .count()
    }

    pub fn record_act(&mut self, now: Cycle, t: &TimingConfig) {
        self.last_act = Some(now);
        self.act_window.push_back(now);
        let window_start = now.saturating_sub(t.n_faw - 1);
        while matches!(self.act_window.front(), Some(&at) if at < window_start) {
            self.act_window.pop_front();
        }
    }
}

/// Bank-group scope: tRRD_L, tCCD_L, tWTR_L.
#[derive(Clone, Debug, Default)]
pub struct BankGroupState {
    pub last_act: Option<Cycle>,
    pub next_col: Cycle,
    pub next_read: Cycle,
}

/// Channel scope: the shared data bus (tCCD_S baseline) and read-to-write
/// turnaround. Command-bus occupancy is the scheduler's business, not the
/// device's, and lives with it.
#[derive(Clone, Debug, Default)]
pub struct ChannelState {
    pub next_col: Cycle,
    pub next_write: Cycle,
}

impl Default for RankState {
    fn default() -> Self {
        Self::new()
    }
}
