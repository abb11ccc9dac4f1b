use std::fmt;

/// Configuration rejected at construction time. None of these are
/// recoverable: the controller refuses to build rather than deferring the
/// failure to first use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Address-map string is malformed or its field widths disagree with
    /// the configured topology.
    InvalidAddressMap(String),
    /// A topology count is zero or not a power of two.
    InvalidTopology(String),
    InvalidQueueDepth(String),
    /// Write-drain hysteresis thresholds outside [0, 1] or inverted.
    InvalidThreshold(String),
    InvalidTiming(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidAddressMap(msg) => write!(f, "invalid address map: {msg}"),
            ConfigError::InvalidTopology(msg) => write!(f, "invalid topology: {msg}"),
            ConfigError::InvalidQueueDepth(msg) => write!(f, "invalid queue depth: {msg}"),
            ConfigError::InvalidThreshold(msg) => write!(f, "invalid threshold: {msg}"),
            ConfigError::InvalidTiming(msg) => write!(f, "invalid timing: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fatal runtime failures. Neither occurs under a valid configuration and
/// a correct scheduler; both indicate the run's results cannot be trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// A rank's refresh interval elapsed while its previous refresh was
    /// still pending. The refresh interval is too short for the configured
    /// traffic or tRFC.
    MissedRefresh { rank: u32, cycle: u64 },
    /// A command was applied to the device in violation of a JEDEC window.
    /// Internal invariant violation, not a user-facing condition.
    TimingViolation {
        cycle: u64,
        bank_id: usize,
        mnemonic: &'static str,
    },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::MissedRefresh { rank, cycle } => {
                write!(f, "rank {rank} missed its refresh window at cycle {cycle}")
            }
            SimError::TimingViolation {
                cycle,
                bank_id,
                mnemonic,
            } => write!(
                f,
                "timing violation: {mnemonic} to bank {bank_id} at cycle {cycle}"
            ),
        }
    }
}

impl std::error::Error for SimError {}
