//! Run statistics: counters, latency accumulation, and queue-occupancy
//! tracking for mean-depth reporting.

use log::info;

use crate::common::CmdKind;

#[derive(Debug, Default, Clone)]
pub struct CtrlStats {
    pub cycles: u64,

    pub reads_submitted: u64,
    pub writes_submitted: u64,
    pub submits_rejected: u64,

    pub reads_completed: u64,
    pub writes_completed: u64,
    pub latency_sum: u64,

    pub row_hits: u64,
    pub row_misses: u64,
    pub row_conflicts: u64,

    pub cmd_act: u64,
    pub cmd_pre: u64,
    pub cmd_read: u64,
    pub cmd_write: u64,
    pub cmd_ref: u64,
    pub refreshes: u64,

    pub txn_q_occupancy_sum: u64,
    pub cmd_q_occupancy_sum: u64,
}

impl CtrlStats {
    pub fn count_cmd(&mut self, kind: CmdKind) {
        match kind {
            CmdKind::Act => self.cmd_act += 1,
            CmdKind::Pre => self.cmd_pre += 1,
            CmdKind::Read | CmdKind::ReadA => self.cmd_read += 1,
            CmdKind::Write | CmdKind::WriteA => self.cmd_write += 1,
            CmdKind::Ref => self.cmd_ref += 1,
        }
    }

    pub fn completed(&self) -> u64 {
        self.reads_completed + self.writes_completed
    }

    pub fn avg_latency(&self) -> f64 {
        if self.completed() == 0 {
            return 0.0;
        }
        self.latency_sum as f64 / self.completed() as f64
    }

    pub fn report(&self) {
        info!("---- controller statistics ----");
        info!("cycles:               {}", self.cycles);
        info!(
            "submitted:            {} reads, {} writes ({} rejected)",
            self.reads_submitted, self.writes_submitted, self.submits_rejected
        );
        info!(
            "completed:            {} reads, {} writes",
            self.reads_completed, self.writes_completed
        );
        info!("avg latency:          {:.1} cycles", self.avg_latency());
        info!(
            "row locality:         {} hits, {} misses, {} conflicts",
            self.row_hits, self.row_misses, self.row_conflicts
        );
        info!(
            "commands:             {} ACT, {} PRE, {} RD, {} WR, {} REF",
            self.cmd_act, self.cmd_pre, self.cmd_read, self.cmd_write, self.cmd_ref
        );
        if self.cycles > 0 {
            info!(
                "mean queue depth:     {:.2} txn, {:.2} cmd",
                self.txn_q_occupancy_sum as f64 / self.cycles as f64,
                self.cmd_q_occupancy_sum as f64 / self.cycles as f64
            );
        }
    }
}
