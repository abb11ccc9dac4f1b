//! Address-map parsing and decoding.

use dramspect::addr::AddressMapper;
use dramspect::common::ConfigError;
use dramspect::config::TopologyConfig;
use pretty_assertions::assert_eq;

fn topology(map: &str) -> TopologyConfig {
    TopologyConfig {
        address_map: map.to_string(),
        ..TopologyConfig::default()
    }
}

#[test]
fn test_default_map_parses() {
    let mapper = AddressMapper::new(&TopologyConfig::default()).unwrap();
    // 1 ch x 2 ranks x 4 bg x 4 banks x 32768 rows x 1024 cols x 32 B
    assert_eq!(mapper.address_bits(), 35);
}

#[test]
fn test_decode_offset_bits_discarded() {
    let mapper = AddressMapper::new(&TopologyConfig::default()).unwrap();
    let a = mapper.map(0x0);
    let b = mapper.map(0x1F); // same transaction, different byte
    assert_eq!(a, b);
}

#[test]
fn test_decode_walks_columns_first() {
    // Map is r:15_R:1_B:2_b:2_c:10_h:5; bit 5 is the lowest column bit.
    let mapper = AddressMapper::new(&TopologyConfig::default()).unwrap();
    let a = mapper.map(0);
    let b = mapper.map(32);
    assert_eq!(b.col, a.col + 1);
    assert_eq!(b.bank_id, a.bank_id);
    assert_eq!(b.row, a.row);
}

#[test]
fn test_decode_bank_bits() {
    let mapper = AddressMapper::new(&TopologyConfig::default()).unwrap();
    // Bank bits sit directly above the 10 column + 5 offset bits.
    let d = mapper.map(1 << 15);
    assert_eq!(d.bank, 1);
    assert_eq!(d.bank_group, 0);
    assert_eq!(d.row, 0);

    let d = mapper.map(1 << 17);
    assert_eq!(d.bank, 0);
    assert_eq!(d.bank_group, 1);

    let d = mapper.map(1 << 19);
    assert_eq!(d.rank, 1);

    let d = mapper.map(1 << 20);
    assert_eq!(d.row, 1);
}

#[test]
fn test_bank_id_is_flat_arena_index() {
    let mapper = AddressMapper::new(&TopologyConfig::default()).unwrap();
    // rank 1, bank group 2, bank 3 with 2 ranks x 4 groups x 4 banks.
    let addr = (1u64 << 19) | (2 << 17) | (3 << 15);
    let d = mapper.map(addr);
    assert_eq!(d.rank, 1);
    assert_eq!(d.bank_group, 2);
    assert_eq!(d.bank, 3);
    assert_eq!(d.bank_id, (1 * 4 + 2) * 4 + 3);
}

#[test]
fn test_split_field_concatenates_msb_first() {
    // Row bits split around the rank bit: r:8 holds the high row bits,
    // r:7 the low ones.
    let topo = TopologyConfig {
        address_map: "r:8_R:1_r:7_B:2_b:2_c:10_h:5_".to_string(),
        ..TopologyConfig::default()
    };
    let mapper = AddressMapper::new(&topo).unwrap();

    // Lowest bit of the low row slice: bit 19 (above B:2 b:2 c:10 h:5).
    let d = mapper.map(1 << 19);
    assert_eq!(d.row, 1);
    // Lowest bit of the high slice: bit 27 (above the rank bit at 26).
    let d = mapper.map(1 << 27);
    assert_eq!(d.row, 1 << 7);
    let d = mapper.map(1 << 26);
    assert_eq!(d.rank, 1);
    assert_eq!(d.row, 0);
}

#[test]
fn test_rejects_width_sum_mismatch() {
    let err = AddressMapper::new(&topology("r:15_R:1_B:2_b:2_c:10_h:4_")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddressMap(_)));
}

#[test]
fn test_rejects_field_width_mismatch() {
    // Row and column widths swapped against the topology.
    let err = AddressMapper::new(&topology("r:10_R:1_B:2_b:2_c:15_h:5_")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddressMap(_)));
}

#[test]
fn test_rejects_unknown_letter() {
    let err = AddressMapper::new(&topology("r:15_R:1_B:2_b:2_x:10_h:5_")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddressMap(_)));
}

#[test]
fn test_rejects_malformed_field() {
    for map in ["r15", "r:", ":5", "r:abc", ""] {
        let err = AddressMapper::new(&topology(map)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddressMap(_)), "map {map:?}");
    }
}

#[test]
fn test_map_is_deterministic() {
    let mapper = AddressMapper::new(&TopologyConfig::default()).unwrap();
    for addr in [0u64, 0x1234_5678, 0x7_FFFF_FFE0] {
        assert_eq!(mapper.map(addr), mapper.map(addr));
    }
}
