//! Flat-address to DRAM-coordinate mapping.
//!
//! The map is configured as a string of `letter:width` fields listed from
//! most-significant bit to least, e.g. `"r:15_R:1_B:2_b:2_c:10_h:5_"`:
//!
//! | letter | field                                  |
//! |--------|----------------------------------------|
//! | `C`    | channel                                |
//! | `R`    | rank                                   |
//! | `B`    | bank group                             |
//! | `b`    | bank                                   |
//! | `r`    | row                                    |
//! | `c`    | column                                 |
//! | `l`    | cacheline interleave (column low bits) |
//! | `h`    | byte offset within a burst (discarded) |
//!
//! A letter may appear more than once; its slices concatenate MSB-first.
//! Widths are checked against the topology at construction: a map that
//! disagrees with the configured channel/rank/bank/row/column counts is a
//! configuration error, not a runtime surprise.

use crate::common::{ConfigError, DecodedAddr};
use crate::config::TopologyConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Channel,
    Rank,
    BankGroup,
    Bank,
    Row,
    Col,
    Cacheline,
    Offset,
}

impl Field {
    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'C' => Some(Field::Channel),
            'R' => Some(Field::Rank),
            'B' => Some(Field::BankGroup),
            'b' => Some(Field::Bank),
            'r' => Some(Field::Row),
            'c' => Some(Field::Col),
            'l' => Some(Field::Cacheline),
            'h' => Some(Field::Offset),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Slice {
    field: Field,
    width: u32,
}

/// Pure, deterministic address decoder. Built once at configuration time,
/// then shared read-only by the bridge.
#[derive(Clone, Debug)]
pub struct AddressMapper {
    slices: Vec<Slice>,
    total_bits: u32,
    ranks_per_channel: u32,
    bank_groups_per_rank: u32,
    banks_per_bank_group: u32,
}

impl AddressMapper {
    pub fn new(topology: &TopologyConfig) -> Result<Self, ConfigError> {
        let slices = parse_map(&topology.address_map)?;

        let total_bits: u32 = slices.iter().map(|s| s.width).sum();
        let want_bits = topology.capacity_bytes().trailing_zeros();
        if total_bits != want_bits {
            return Err(ConfigError::InvalidAddressMap(format!(
                "field widths sum to {total_bits} bits but the topology addresses {want_bits} bits"
            )));
        }

        let width_of = |field: Field| -> u32 {
            slices
                .iter()
                .filter(|s| s.field == field)
                .map(|s| s.width)
                .sum()
        };

        let log2 = |v: u32| v.trailing_zeros();
        let checks = [
            (Field::Channel, log2(topology.num_channels), "channel"),
            (Field::Rank, log2(topology.num_ranks_per_channel), "rank"),
            (
                Field::BankGroup,
                log2(topology.num_bank_groups_per_rank),
                "bank group",
            ),
            (Field::Bank, log2(topology.num_banks_per_bank_group), "bank"),
            (Field::Row, log2(topology.num_rows_per_bank), "row"),
            (
                Field::Offset,
                log2(topology.num_bytes_per_transaction),
                "byte offset",
            ),
        ];
        for (field, want, name) in checks {
            let got = width_of(field);
            if got != want {
                return Err(ConfigError::InvalidAddressMap(format!(
                    "{name} field is {got} bits wide but the topology needs {want}"
                )));
            }
        }

        // Cacheline interleave bits are column bits that landed elsewhere in
        // the map; together they must cover the column space.
        let col_bits = width_of(Field::Col) + width_of(Field::Cacheline);
        let want_col = log2(topology.num_cols_per_bank);
        if col_bits != want_col {
            return Err(ConfigError::InvalidAddressMap(format!(
                "column+cacheline fields are {col_bits} bits wide but the topology needs {want_col}"
            )));
        }

        Ok(Self {
            slices,
            total_bits,
            ranks_per_channel: topology.num_ranks_per_channel,
            bank_groups_per_rank: topology.num_bank_groups_per_rank,
            banks_per_bank_group: topology.num_banks_per_bank_group,
        })
    }

    /// Bits of address space this mapper decodes. Higher address bits wrap.
    pub fn address_bits(&self) -> u32 {
        self.total_bits
    }

    /// Decodes `addr` into DRAM coordinates. Total over the address space:
    /// bits above `address_bits()` are ignored.
    pub fn map(&self, addr: u64) -> DecodedAddr {
        let mut remaining = self.total_bits;
        let mut channel = 0u64;
        let mut rank = 0u64;
        let mut bank_group = 0u64;
        let mut bank = 0u64;
        let mut row = 0u64;
        let mut col = 0u64;

        for slice in &self.slices {
            remaining -= slice.width;
            let bits = (addr >> remaining) & ((1u64 << slice.width) - 1);
            let acc = match slice.field {
                Field::Channel => &mut channel,
                Field::Rank => &mut rank,
                Field::BankGroup => &mut bank_group,
                Field::Bank => &mut bank,
                Field::Row => &mut row,
                Field::Col | Field::Cacheline => &mut col,
                Field::Offset => continue,
            };
            *acc = (*acc << slice.width) | bits;
        }

        let bank_id = ((channel * u64::from(self.ranks_per_channel) + rank)
            * u64::from(self.bank_groups_per_rank)
            + bank_group)
            * u64::from(self.banks_per_bank_group)
            + bank;

        DecodedAddr {
            channel: channel as u32,
            rank: rank as u32,
            bank_group: bank_group as u32,
            bank: bank as u32,
            row: row as u32,
            col: col as u32,
            bank_id: bank_id as usize,
        }
    }
}

fn parse_map(map: &str) -> Result<Vec<Slice>, ConfigError> {
    let mut slices = Vec::new();

    for token in map.split('_').filter(|t| !t.is_empty()) {
        let (letter, width) = token.split_once(':').ok_or_else(|| {
            ConfigError::InvalidAddressMap(format!("field `{token}` is not letter:width"))
        })?;

        let mut chars = letter.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(ConfigError::InvalidAddressMap(format!(
                "field name `{letter}` must be a single letter"
            )));
        };
        let field = Field::from_letter(c).ok_or_else(|| {
            ConfigError::InvalidAddressMap(format!("unknown field letter `{c}`"))
        })?;

        let width: u32 = width.parse().map_err(|_| {
            ConfigError::InvalidAddressMap(format!("field `{token}` has a malformed width"))
        })?;
        if width == 0 || width > 40 {
            return Err(ConfigError::InvalidAddressMap(format!(
                "field `{token}` width out of range"
            )));
        }

        slices.push(Slice { field, width });
    }

    if slices.is_empty() {
        return Err(ConfigError::InvalidAddressMap("map string is empty".into()));
    }
    Ok(slices)
}
