pub mod error;

pub use error::{ConfigError, SimError};

/// Simulation time, in memory-clock cycles.
pub type Cycle = u64;

/// Monotonically increasing transaction identifier assigned by the bridge.
///
/// Ids double as the global age order: the scheduler tie-break rule is
/// "lowest id wins", which makes schedules reproducible run to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemOp {
    Read,
    Write,
}

/// A memory transaction as seen at the bridge boundary.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: TxnId,
    pub addr: u64,
    pub op: MemOp,
    pub size_bytes: u32,
    pub arrival: Cycle,
    pub target: DecodedAddr,
}

/// Physical DRAM coordinates decoded from a flat byte address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodedAddr {
    pub channel: u32,
    pub rank: u32,
    pub bank_group: u32,
    pub bank: u32,
    pub row: u32,
    pub col: u32,
    /// Flat index into the bank arena:
    /// `((channel * ranks + rank) * groups + group) * banks + bank`.
    pub bank_id: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmdKind {
    Act,
    Read,
    ReadA,
    Write,
    WriteA,
    Pre,
    Ref,
}

impl CmdKind {
    /// Column (data-bus) commands, as opposed to row commands.
    pub fn is_column(self) -> bool {
        matches!(
            self,
            CmdKind::Read | CmdKind::ReadA | CmdKind::Write | CmdKind::WriteA
        )
    }

    pub fn is_read(self) -> bool {
        matches!(self, CmdKind::Read | CmdKind::ReadA)
    }

    pub fn is_write(self) -> bool {
        matches!(self, CmdKind::Write | CmdKind::WriteA)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            CmdKind::Act => "ACT",
            CmdKind::Read => "READ",
            CmdKind::ReadA => "READA",
            CmdKind::Write => "WRITE",
            CmdKind::WriteA => "WRITEA",
            CmdKind::Pre => "PRE",
            CmdKind::Ref => "REF",
        }
    }
}

/// A DRAM device command.
///
/// Normal commands target a single bank through `target`. Refresh-path
/// commands (all-bank PRE and REF) instead carry the affected banks in
/// `bank_ids` and have no owning transaction.
#[derive(Clone, Debug)]
pub struct Command {
    pub txn_id: Option<TxnId>,
    pub kind: CmdKind,
    pub addr: u64,
    pub target: DecodedAddr,
    pub bank_ids: Vec<usize>,
}

impl Command {
    pub fn new(txn_id: TxnId, kind: CmdKind, addr: u64, target: DecodedAddr) -> Self {
        Self {
            txn_id: Some(txn_id),
            kind,
            addr,
            target,
            bank_ids: Vec::new(),
        }
    }

    /// A command synthesized by the refresh engine, spanning `bank_ids`.
    pub fn refresh(kind: CmdKind, target: DecodedAddr, bank_ids: Vec<usize>) -> Self {
        Self {
            txn_id: None,
            kind,
            addr: 0,
            target,
            bank_ids,
        }
    }

    /// Banks this command applies to.
    pub fn banks(&self) -> &[usize] {
        if self.bank_ids.is_empty() {
            std::slice::from_ref(&self.target.bank_id)
        } else {
            &self.bank_ids
        }
    }
}

/// Completion notice delivered back to the bridge caller.
#[derive(Clone, Debug)]
pub struct Completion {
    pub txn_id: TxnId,
    pub op: MemOp,
    pub addr: u64,
    pub completed: Cycle,
    pub latency: Cycle,
    /// Read data. This is a timing model: reads return a fixed fill
    /// pattern, writes return nothing.
    pub data: Option<Box<[u8]>>,
}
