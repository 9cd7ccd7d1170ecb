//! Advertising policy against the simulated radio.

use blepinpad::adapters::ble::SimOp;
use blepinpad::app::ports::Characteristic;
use blepinpad::config::{PinpadConfig, SecurityMode};

use crate::mock_hw::{pinpad, try_pinpad, MemCounter, MockClock, RecordingSink, TestPinpad};

fn config(start: bool, stop: bool) -> PinpadConfig {
    PinpadConfig {
        start_advertising: start,
        stop_advertising: stop,
        ..PinpadConfig::new(SecurityMode::None, "1234")
    }
}

fn radio_ops(svc: &TestPinpad) -> Vec<SimOp> {
    svc.ble()
        .sim_ops()
        .iter()
        .filter(|op| matches!(op, SimOp::StartAdvertising | SimOp::StopAdvertising))
        .cloned()
        .collect()
}

#[test]
fn boot_policy_matrix() {
    let cases = [
        (false, false, vec![], false),
        (true, false, vec![SimOp::StartAdvertising], true),
        (false, true, vec![], false),
        (
            true,
            true,
            vec![SimOp::StartAdvertising, SimOp::StopAdvertising],
            false,
        ),
    ];
    for (start, stop, ops, advertising) in cases {
        let svc = pinpad(config(start, stop), MemCounter::default(), MockClock::default());
        assert_eq!(radio_ops(&svc), ops, "start={} stop={}", start, stop);
        assert_eq!(svc.is_advertising(), advertising);
    }
}

#[test]
fn radio_untouched_before_setup() {
    let svc = try_pinpad(config(true, false), MemCounter::default(), MockClock::default()).unwrap();
    assert!(svc.ble().sim_ops().is_empty());
    assert!(!svc.is_advertising());
}

#[test]
fn start_and_stop_are_idempotent() {
    let mut svc = pinpad(config(false, false), MemCounter::default(), MockClock::default());
    svc.start_advertising();
    svc.start_advertising();
    assert_eq!(radio_ops(&svc), vec![SimOp::StartAdvertising]);
    assert!(svc.is_advertising());

    svc.stop_advertising();
    svc.stop_advertising();
    assert_eq!(
        radio_ops(&svc),
        vec![SimOp::StartAdvertising, SimOp::StopAdvertising]
    );
    assert!(!svc.is_advertising());
}

#[test]
fn stopping_advertising_keeps_connection() {
    let mut svc = pinpad(config(true, false), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);
    svc.stop_advertising();

    assert_eq!(svc.active_connection(), Some(1));
    assert!(!svc.ble().sim_ops().contains(&SimOp::Disconnect(1)));
    svc.on_write(1, Characteristic::Rpc, b"bob:1234", &mut sink);
    assert_eq!(sink.events.len(), 1);
}

#[test]
fn advertising_resumes_after_connect_when_desired() {
    let mut svc = pinpad(config(true, false), MemCounter::default(), MockClock::default());
    svc.on_connect(1);
    // The stack halted advertising on connect; the service restarts it.
    assert_eq!(
        radio_ops(&svc),
        vec![SimOp::StartAdvertising, SimOp::StartAdvertising]
    );
    svc.on_disconnect(1);
    assert_eq!(radio_ops(&svc).len(), 2);
    assert!(svc.is_advertising());
}

#[test]
fn non_discoverable_stays_dark_across_connections() {
    let mut svc = pinpad(config(true, true), MemCounter::default(), MockClock::default());
    svc.on_connect(1);
    svc.on_disconnect(1);
    assert_eq!(
        radio_ops(&svc),
        vec![SimOp::StartAdvertising, SimOp::StopAdvertising]
    );
}

#[test]
fn stop_on_accept_goes_dark_after_success_only() {
    let config = PinpadConfig {
        stop_advertising_on_accept: true,
        ..config(true, false)
    };
    let mut svc = pinpad(config, MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);

    svc.on_write(1, Characteristic::Rpc, b"bob:0000", &mut sink);
    assert!(svc.is_advertising());

    svc.on_write(1, Characteristic::Rpc, b"bob:1234", &mut sink);
    assert!(!svc.is_advertising());
    assert_eq!(radio_ops(&svc).last(), Some(&SimOp::StopAdvertising));
    assert_eq!(svc.active_connection(), Some(1));
}
