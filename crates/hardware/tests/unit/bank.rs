//! Bank state machine: legal transitions and same-bank timing windows.

use dramspect::common::CmdKind;
use dramspect::config::TimingConfig;
use dramspect::device::{Bank, BankState};

fn timing() -> TimingConfig {
    TimingConfig::default()
}

#[test]
fn test_starts_idle() {
    let bank = Bank::new();
    assert_eq!(bank.state(), BankState::Idle);
    assert_eq!(bank.open_row(), None);
    assert!(bank.can_accept(CmdKind::Act, 7, 0));
}

#[test]
fn test_act_opens_row() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 10, &t);

    assert_eq!(bank.state(), BankState::Active);
    assert_eq!(bank.open_row(), Some(7));
}

#[test]
fn test_read_waits_for_trcd() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 10, &t);

    assert!(!bank.can_accept(CmdKind::Read, 7, 10 + t.n_rcd - 1));
    assert!(bank.can_accept(CmdKind::Read, 7, 10 + t.n_rcd));
}

#[test]
fn test_read_rejects_wrong_row() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 10, &t);

    assert!(!bank.can_accept(CmdKind::Read, 8, 10 + t.n_rcd));
}

#[test]
fn test_idle_bank_rejects_data_commands() {
    let bank = Bank::new();
    assert!(!bank.can_accept(CmdKind::Read, 0, 100));
    assert!(!bank.can_accept(CmdKind::Write, 0, 100));
    assert!(!bank.can_accept(CmdKind::Pre, 0, 100));
}

#[test]
fn test_pre_waits_for_tras() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 0, &t);

    assert!(!bank.can_accept(CmdKind::Pre, 0, t.n_ras - 1));
    assert!(bank.can_accept(CmdKind::Pre, 0, t.n_ras));
}

#[test]
fn test_read_extends_pre_window_by_trtp() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 0, &t);
    // Late read pushes precharge past tRAS.
    let read_at = t.n_ras;
    bank.apply(CmdKind::Read, 7, read_at, &t);

    assert!(!bank.can_accept(CmdKind::Pre, 0, read_at + t.n_rtp - 1));
    assert!(bank.can_accept(CmdKind::Pre, 0, read_at + t.n_rtp));
}

#[test]
fn test_write_recovery_gates_precharge() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 0, &t);
    let write_at = t.n_rcd;
    bank.apply(CmdKind::Write, 7, write_at, &t);

    let pre_ok = write_at + t.n_cwl + t.n_bl + t.n_wr;
    assert!(!bank.can_accept(CmdKind::Pre, 0, pre_ok - 1));
    assert!(bank.can_accept(CmdKind::Pre, 0, pre_ok));
}

#[test]
fn test_precharge_closes_after_trp() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 0, &t);
    bank.apply(CmdKind::Pre, 0, t.n_ras, &t);

    assert_eq!(bank.state(), BankState::Precharging);
    assert_eq!(bank.open_row(), None);

    bank.tick(t.n_ras + t.n_rp - 1);
    assert_eq!(bank.state(), BankState::Precharging);
    bank.tick(t.n_ras + t.n_rp);
    assert_eq!(bank.state(), BankState::Idle);
}

#[test]
fn test_act_to_act_respects_trc() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 0, &t);
    bank.apply(CmdKind::Pre, 0, t.n_ras, &t);
    bank.tick(t.n_ras + t.n_rp);

    // tRAS + tRP == tRC with the default timings, so the precharge gate
    // and the row-cycle gate line up exactly.
    assert!(!bank.can_accept(CmdKind::Act, 8, t.n_rc - 1));
    assert!(bank.can_accept(CmdKind::Act, 8, t.n_rc));
}

#[test]
fn test_reada_folds_in_precharge() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Act, 7, 0, &t);
    let read_at = t.n_rcd;
    bank.apply(CmdKind::ReadA, 7, read_at, &t);

    assert_eq!(bank.state(), BankState::Precharging);
    // Auto-precharge starts at the tRAS boundary (later than read+tRTP
    // here), and the bank idles tRP after that.
    let idle_at = t.n_ras + t.n_rp;
    bank.tick(idle_at - 1);
    assert_eq!(bank.state(), BankState::Precharging);
    bank.tick(idle_at);
    assert_eq!(bank.state(), BankState::Idle);
    assert!(bank.can_accept(CmdKind::Act, 9, t.n_rc.max(idle_at)));
}

#[test]
fn test_refresh_occupies_bank_for_trfc() {
    let t = timing();
    let mut bank = Bank::new();
    bank.apply(CmdKind::Ref, 0, 100, &t);

    assert_eq!(bank.state(), BankState::Refreshing);
    assert!(!bank.can_accept(CmdKind::Act, 0, 100 + t.n_rfc - 1));

    bank.tick(100 + t.n_rfc);
    assert_eq!(bank.state(), BankState::Idle);
    assert!(bank.can_accept(CmdKind::Act, 0, 100 + t.n_rfc));
}
