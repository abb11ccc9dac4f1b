//! The memory controller: bridge, schedulers, and device model advanced
//! in lockstep on a shared cycle counter.
//!
//! Everything is single-threaded discrete-event simulation. Banks are
//! logically concurrent (many can hold in-flight commands at once), but
//! progress happens only inside `tick`, in a fixed phase order, which is
//! what makes runs bit-for-bit reproducible.

pub mod bridge;
pub mod cmd_scheduler;
pub mod txn_scheduler;

use std::collections::VecDeque;
use std::io::Write;

use log::info;

use crate::addr::AddressMapper;
use crate::common::{Completion, ConfigError, Cycle, MemOp, SimError, TxnId};
use crate::config::Config;
use crate::device::Dimm;
use crate::stats::CtrlStats;

pub use bridge::TxnBridge;
pub use cmd_scheduler::{CmdScheduler, ShadowRow};
pub use txn_scheduler::TxnScheduler;

pub struct MemController {
    mapper: AddressMapper,
    bridge: TxnBridge,
    txn_sched: TxnScheduler,
    cmd_sched: CmdScheduler,
    dimm: Dimm,

    stats: CtrlStats,
    cycle: Cycle,
    /// Completions retired by the device but not yet accepted by the
    /// bridge (waiting on response credits).
    ready_responses: VecDeque<(TxnId, Cycle)>,
    trace: Option<Box<dyn Write>>,
}

impl MemController {
    /// Builds the full pipeline from a validated configuration. Every
    /// configuration problem surfaces here, before the first cycle.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let mapper = AddressMapper::new(&config.topology)?;

        let topology = &config.topology;
        info!(
            "memory controller: {} channel(s) x {} rank(s) x {} bank group(s) x {} bank(s), \
             {} rows x {} cols, {} B/txn",
            topology.num_channels,
            topology.num_ranks_per_channel,
            topology.num_bank_groups_per_rank,
            topology.num_banks_per_bank_group,
            topology.num_rows_per_bank,
            topology.num_cols_per_bank,
            topology.num_bytes_per_transaction,
        );

        let dimm = Dimm::new(topology, config.timing.clone());
        let cmd_sched = CmdScheduler::new(
            &config.policy,
            &config.timing,
            config.queues.num_cmd_q_entries as usize,
            topology.num_banks() as usize,
            topology.num_ranks() as usize,
            topology.num_channels as usize,
        );
        let txn_sched = TxnScheduler::new(
            &config.policy,
            config.queues.num_txn_q_entries as usize,
            config.queues.num_cmd_q_entries,
        );
        let bridge = TxnBridge::new(
            config.queues.num_txn_q_entries,
            config.queues.max_outstanding_reqs,
        );

        Ok(Self {
            mapper,
            bridge,
            txn_sched,
            cmd_sched,
            dimm,
            stats: CtrlStats::default(),
            cycle: 0,
            ready_responses: VecDeque::new(),
            trace: None,
        })
    }

    /// Routes the per-issue command trace to `sink`.
    pub fn set_cmd_trace(&mut self, sink: Box<dyn Write>) {
        self.trace = Some(sink);
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn stats(&self) -> &CtrlStats {
        &self.stats
    }

    pub fn mapper(&self) -> &AddressMapper {
        &self.mapper
    }

    pub fn bridge(&self) -> &TxnBridge {
        &self.bridge
    }

    pub fn txn_queue_len(&self) -> usize {
        self.txn_sched.len()
    }

    pub fn cmd_queue_len(&self) -> usize {
        self.cmd_sched.len()
    }

    /// Offers a transaction. `None` means backpressure (no credit, or too
    /// many outstanding); the caller should retry after a tick.
    pub fn submit(&mut self, op: MemOp, addr: u64, size_bytes: u32) -> Option<TxnId> {
        match self.bridge.submit(op, addr, size_bytes, self.cycle, &self.mapper) {
            Some(id) => {
                match op {
                    MemOp::Read => self.stats.reads_submitted += 1,
                    MemOp::Write => self.stats.writes_submitted += 1,
                }
                Some(id)
            }
            None => {
                self.stats.submits_rejected += 1;
                None
            }
        }
    }

    /// Completions accumulated since the last drain, oldest first.
    pub fn drain_completions(&mut self) -> Vec<Completion> {
        self.bridge.drain_completions()
    }

    /// Advances the whole pipeline by one cycle.
    pub fn tick(&mut self) -> Result<(), SimError> {
        self.cycle += 1;
        let now = self.cycle;
        self.stats.cycles += 1;

        // 1. Arrivals accepted since the last tick enter the scheduler.
        for txn in self.bridge.flush_staging() {
            self.txn_sched.push(txn);
        }

        // 2. Device: resolve bank transitions, retire finished commands.
        self.dimm.tick(now);
        for (txn_id, done) in self.dimm.take_completions(now) {
            self.ready_responses.push_back((txn_id, done));
        }

        // 3. Responses climb to the bridge while it has credits.
        while self.bridge.can_accept_response() {
            let Some((txn_id, done)) = self.ready_responses.pop_front() else {
                break;
            };
            if let Some((latency, op)) = self.bridge.complete(txn_id, done) {
                self.stats.latency_sum += latency;
                match op {
                    MemOp::Read => self.stats.reads_completed += 1,
                    MemOp::Write => self.stats.writes_completed += 1,
                }
            }
        }

        // 4. Command buses age out, then refresh gets first claim on them.
        self.cmd_sched.release_buses();
        self.cmd_sched
            .refresh_tick(now, &mut self.dimm, &mut self.stats, &mut self.trace)?;

        // 5. Issue pass over the command queue.
        self.cmd_sched
            .issue_pass(now, &mut self.dimm, &mut self.stats, &mut self.trace)?;

        // 6. Transaction scheduling into the command queue.
        self.txn_sched
            .schedule_pass(now, &mut self.cmd_sched, &mut self.stats);

        // 7. Credits freed by this cycle's dequeues move upstream; they
        //    become spendable next cycle, never within this one.
        let freed_cmd = self.cmd_sched.take_freed();
        self.txn_sched.add_cmd_credits(freed_cmd);
        let freed_txn = self.txn_sched.take_freed();
        self.bridge.add_req_credits(freed_txn);
        self.bridge.apply_drained_credits();

        self.stats.txn_q_occupancy_sum += self.txn_sched.len() as u64;
        self.stats.cmd_q_occupancy_sum += self.cmd_sched.len() as u64;

        Ok(())
    }

    /// No transaction in flight anywhere in the pipeline. Undrained
    /// completions and background refresh do not count.
    pub fn idle(&self) -> bool {
        self.bridge.idle()
            && self.txn_sched.is_empty()
            && self.cmd_sched.is_empty()
            && self.ready_responses.is_empty()
            && self.dimm.inflight_len() == 0
    }

    /// Ticks until the pipeline is idle or `max_cycles` have elapsed.
    /// Returns the cycle count reached; check `idle()` to distinguish.
    pub fn run_until_idle(&mut self, max_cycles: u64) -> Result<Cycle, SimError> {
        let deadline = self.cycle + max_cycles;
        while !self.idle() && self.cycle < deadline {
            self.tick()?;
        }
        Ok(self.cycle)
    }
}
