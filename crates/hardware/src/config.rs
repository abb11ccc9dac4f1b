use serde::Deserialize;

use crate::common::ConfigError;

const DEFAULT_ADDRESS_MAP: &str = "r:15_R:1_B:2_b:2_c:10_h:5_";

fn default_num_channels() -> u32 {
    1
}
fn default_ranks_per_channel() -> u32 {
    2
}
fn default_bank_groups_per_rank() -> u32 {
    4
}
fn default_banks_per_bank_group() -> u32 {
    4
}
fn default_rows_per_bank() -> u32 {
    32768
}
fn default_cols_per_bank() -> u32 {
    1024
}
fn default_bytes_per_transaction() -> u32 {
    32
}
fn default_address_map() -> String {
    DEFAULT_ADDRESS_MAP.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    #[serde(default = "default_num_channels")]
    pub num_channels: u32,

    #[serde(default = "default_ranks_per_channel")]
    pub num_ranks_per_channel: u32,

    #[serde(default = "default_bank_groups_per_rank")]
    pub num_bank_groups_per_rank: u32,

    #[serde(default = "default_banks_per_bank_group")]
    pub num_banks_per_bank_group: u32,

    #[serde(default = "default_rows_per_bank")]
    pub num_rows_per_bank: u32,

    #[serde(default = "default_cols_per_bank")]
    pub num_cols_per_bank: u32,

    #[serde(default = "default_bytes_per_transaction")]
    pub num_bytes_per_transaction: u32,

    #[serde(default = "default_address_map")]
    pub address_map: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            num_channels: default_num_channels(),
            num_ranks_per_channel: default_ranks_per_channel(),
            num_bank_groups_per_rank: default_bank_groups_per_rank(),
            num_banks_per_bank_group: default_banks_per_bank_group(),
            num_rows_per_bank: default_rows_per_bank(),
            num_cols_per_bank: default_cols_per_bank(),
            num_bytes_per_transaction: default_bytes_per_transaction(),
            address_map: default_address_map(),
        }
    }
}

impl TopologyConfig {
    pub fn num_ranks(&self) -> u32 {
        self.num_channels * self.num_ranks_per_channel
    }

    pub fn num_bank_groups(&self) -> u32 {
        self.num_ranks() * self.num_bank_groups_per_rank
    }

    pub fn num_banks(&self) -> u32 {
        self.num_bank_groups() * self.num_banks_per_bank_group
    }

    /// Total addressable bytes across all channels.
    pub fn capacity_bytes(&self) -> u64 {
        u64::from(self.num_banks())
            * u64::from(self.num_rows_per_bank)
            * u64::from(self.num_cols_per_bank)
            * u64::from(self.num_bytes_per_transaction)
    }
}

// DDR4-2400 cycle counts, matching the defaults the original controller
// configs were verified against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub n_rc: u64,
    pub n_rrd_l: u64,
    pub n_rrd_s: u64,
    pub n_rcd: u64,
    pub n_ccd_l: u64,
    pub n_ccd_s: u64,
    pub n_cl: u64,
    pub n_cwl: u64,
    pub n_wr: u64,
    pub n_wtr_l: u64,
    pub n_wtr_s: u64,
    pub n_rtw: u64,
    pub n_ras: u64,
    pub n_rtp: u64,
    pub n_rp: u64,
    pub n_rfc: u64,
    pub n_refi: u64,
    pub n_faw: u64,
    pub n_bl: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            n_rc: 55,
            n_rrd_l: 6,
            n_rrd_s: 4,
            n_rcd: 16,
            n_ccd_l: 5,
            n_ccd_s: 4,
            n_cl: 16,
            n_cwl: 12,
            n_wr: 18,
            n_wtr_l: 9,
            n_wtr_s: 3,
            n_rtw: 4,
            n_ras: 39,
            n_rtp: 9,
            n_rp: 16,
            n_rfc: 420,
            n_refi: 9360,
            n_faw: 16,
            n_bl: 4,
        }
    }
}

impl TimingConfig {
    /// Cycles from READ issue to the last data beat.
    pub fn read_latency(&self) -> u64 {
        self.n_cl + self.n_bl
    }

    /// Cycles from WRITE issue to write-recovery completion.
    pub fn write_latency(&self) -> u64 {
        self.n_cwl + self.n_bl + self.n_wr
    }
}

fn default_txn_q_entries() -> u32 {
    32
}
fn default_cmd_q_entries() -> u32 {
    32
}
fn default_max_outstanding() -> u32 {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_txn_q_entries")]
    pub num_txn_q_entries: u32,

    #[serde(default = "default_cmd_q_entries")]
    pub num_cmd_q_entries: u32,

    #[serde(default = "default_max_outstanding")]
    pub max_outstanding_reqs: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            num_txn_q_entries: default_txn_q_entries(),
            num_cmd_q_entries: default_cmd_q_entries(),
            max_outstanding_reqs: default_max_outstanding(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BankPolicy {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TxnPolicy {
    InOrder,
    Frfcfs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub bank_policy: BankPolicy,
    pub txn_scheduling_policy: TxnPolicy,
    /// Ready reads beat ready writes, outside write-drain mode.
    pub read_first: bool,
    /// Entering write-drain mode when pending writes exceed this fraction
    /// of the transaction queue.
    pub max_pending_write_frac: f32,
    /// Leaving write-drain mode when pending writes fall below this.
    pub min_pending_write_frac: f32,
    /// Scan the whole command queue for an issuable command rather than
    /// inspecting only the head.
    pub find_any_issuable: bool,
    /// Separate row-command and column-command buses per channel.
    pub dual_command_bus: bool,
    /// ACT occupies the row bus for two cycles (HBM-style).
    pub multi_cycle_act: bool,
    pub use_refresh: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            bank_policy: BankPolicy::Open,
            txn_scheduling_policy: TxnPolicy::Frfcfs,
            read_first: false,
            max_pending_write_frac: 0.8,
            min_pending_write_frac: 0.2,
            find_any_issuable: true,
            dual_command_bus: false,
            multi_cycle_act: false,
            use_refresh: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub print_cmd_trace: bool,
    /// Trace destination. "-" means stdout; anything else is a file path.
    pub cmd_trace_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub topology: TopologyConfig,
    pub timing: TimingConfig,
    pub queues: QueueConfig,
    pub policy: PolicyConfig,
    pub trace: TraceConfig,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Rejects inconsistent configurations before any component is built.
    /// The address map is validated separately when the mapper is
    /// constructed, since it needs the parsed field layout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.topology;
        for (name, value) in [
            ("num_channels", t.num_channels),
            ("num_ranks_per_channel", t.num_ranks_per_channel),
            ("num_bank_groups_per_rank", t.num_bank_groups_per_rank),
            ("num_banks_per_bank_group", t.num_banks_per_bank_group),
            ("num_rows_per_bank", t.num_rows_per_bank),
            ("num_cols_per_bank", t.num_cols_per_bank),
            ("num_bytes_per_transaction", t.num_bytes_per_transaction),
        ] {
            if value == 0 || !value.is_power_of_two() {
                return Err(ConfigError::InvalidTopology(format!(
                    "{name} must be a nonzero power of two, got {value}"
                )));
            }
        }

        let q = &self.queues;
        for (name, value) in [
            ("num_txn_q_entries", q.num_txn_q_entries),
            ("num_cmd_q_entries", q.num_cmd_q_entries),
            ("max_outstanding_reqs", q.max_outstanding_reqs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidQueueDepth(format!(
                    "{name} must be nonzero"
                )));
            }
        }

        let p = &self.policy;
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !in_range(p.max_pending_write_frac) || !in_range(p.min_pending_write_frac) {
            return Err(ConfigError::InvalidThreshold(format!(
                "write thresholds must lie in [0, 1], got min={} max={}",
                p.min_pending_write_frac, p.max_pending_write_frac
            )));
        }
        if p.min_pending_write_frac > p.max_pending_write_frac {
            return Err(ConfigError::InvalidThreshold(format!(
                "min_pending_write_frac {} exceeds max_pending_write_frac {}",
                p.min_pending_write_frac, p.max_pending_write_frac
            )));
        }

        let n = &self.timing;
        if n.n_bl == 0 {
            return Err(ConfigError::InvalidTiming("n_bl must be nonzero".into()));
        }
        if n.n_faw == 0 {
            return Err(ConfigError::InvalidTiming("n_faw must be nonzero".into()));
        }
        if p.use_refresh {
            if n.n_refi <= n.n_rfc {
                return Err(ConfigError::InvalidTiming(format!(
                    "n_refi ({}) must exceed n_rfc ({})",
                    n.n_refi, n.n_rfc
                )));
            }
        }

        Ok(())
    }
}
