//! End-to-end flows through `PinpadService` with the simulated radio.

use blepinpad::adapters::ble::SimOp;
use blepinpad::app::events::{EventKind, PinpadEvent};
use blepinpad::app::ports::{Characteristic, IndicatorSignal};
use blepinpad::app::service::{PinpadState, PinpadStatus};
use blepinpad::app::triggers::Triggers;
use blepinpad::config::{PinpadConfig, SecurityMode};
use blepinpad::error::ConfigError;

use std::cell::RefCell;
use std::rc::Rc;

use crate::mock_hw::{pinpad, try_pinpad, MemCounter, MockClock, RecordingSink};

fn static_pin(pin: &str) -> PinpadConfig {
    PinpadConfig::new(SecurityMode::None, pin)
}

fn kinds(events: &[PinpadEvent]) -> Vec<EventKind> {
    events.iter().map(PinpadEvent::kind).collect()
}

#[test]
fn static_pin_end_to_end() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();

    svc.on_connect(1);
    assert_eq!(svc.state(), PinpadState::Connected);

    svc.on_write(1, Characteristic::Rpc, b"bob:1234", &mut sink);
    assert_eq!(sink.events.len(), 1);
    assert_eq!(sink.events[0].kind(), EventKind::Accepted);
    assert_eq!(sink.events[0].user(), "bob");
    assert_eq!(svc.indicator().signals, vec![IndicatorSignal::Accepted]);
    assert_eq!(svc.ble().value(Characteristic::Status), b"accepted");
    assert_eq!(svc.selected_user(), None);

    svc.on_write(1, Characteristic::Rpc, b"bob:9999", &mut sink);
    assert_eq!(sink.events[1].kind(), EventKind::Rejected);
    assert_eq!(sink.events[1].user(), "bob");

    svc.on_write(1, Characteristic::Rpc, b"@carol", &mut sink);
    assert_eq!(
        sink.events[2],
        PinpadEvent::UserSelected {
            user: "carol".try_into().unwrap()
        }
    );
    // Selection does not validate.
    assert_eq!(svc.indicator().signals.len(), 2);

    svc.on_disconnect(1);
    assert_eq!(svc.state(), PinpadState::Idle);
    assert_eq!(svc.active_connection(), None);

    svc.on_write(1, Characteristic::Rpc, b"bob:1234", &mut sink);
    assert_eq!(sink.events.len(), 3);
}

#[test]
fn selected_user_is_used_for_bare_submission() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(7);

    svc.on_write(7, Characteristic::UserId, b"alice", &mut sink);
    assert_eq!(svc.selected_user(), Some("alice"));
    svc.on_write(7, Characteristic::Rpc, b":1234", &mut sink);

    let events = sink.take();
    assert_eq!(kinds(&events), vec![EventKind::UserSelected, EventKind::Accepted]);
    assert_eq!(events[1].user(), "alice");
}

#[test]
fn pending_command_rides_along_with_outcome() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);

    svc.on_write(1, Characteristic::Cmd, b"open_garage\r\n", &mut sink);
    assert_eq!(svc.pending_command(), Some("open_garage"));
    svc.on_write(1, Characteristic::Rpc, b"bob:1234", &mut sink);

    let events = sink.take();
    assert_eq!(kinds(&events), vec![EventKind::UserCommand, EventKind::Accepted]);
    match &events[1] {
        PinpadEvent::Accepted { command, .. } => assert_eq!(command.as_str(), "open_garage"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(svc.pending_command(), None);
}

#[test]
fn free_text_on_rpc_is_a_command_not_an_attempt() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);

    svc.on_write(1, Characteristic::Rpc, b"lights", &mut sink);
    assert_eq!(kinds(&sink.events), vec![EventKind::UserCommand]);
    assert!(svc.indicator().signals.is_empty());
    assert_eq!(svc.status(), PinpadStatus::Idle);
}

#[test]
fn malformed_submission_is_rejected_noise_is_ignored() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);

    // Over-long and submit-shaped.
    let mut long = b"bob:".to_vec();
    long.extend_from_slice(&[b'1'; 100]);
    svc.on_write(1, Characteristic::Rpc, &long, &mut sink);
    assert_eq!(kinds(&sink.take()), vec![EventKind::Rejected]);

    // Bad user name in a submission.
    svc.on_write(1, Characteristic::Rpc, b"b\x01b:1234", &mut sink);
    assert_eq!(kinds(&sink.take()), vec![EventKind::Rejected]);

    // Empty and invalid UTF-8 without a delimiter: nothing happens.
    svc.on_write(1, Characteristic::Rpc, b"", &mut sink);
    svc.on_write(1, Characteristic::Rpc, &[0xff, 0xfe], &mut sink);
    svc.on_write(1, Characteristic::Rpc, &[b'x'; 100], &mut sink);
    assert!(sink.events.is_empty());
}

#[test]
fn wrong_length_pin_is_rejected() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);
    for code in [&b"bob:123"[..], b"bob:12345", b"bob:"] {
        svc.on_write(1, Characteristic::Rpc, code, &mut sink);
    }
    assert_eq!(
        kinds(&sink.events),
        vec![EventKind::Rejected, EventKind::Rejected, EventKind::Rejected]
    );
}

#[test]
fn writes_to_read_only_characteristics_are_ignored() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);
    svc.on_write(1, Characteristic::Status, b"accepted", &mut sink);
    svc.on_write(1, Characteristic::HotpCounter, b"0", &mut sink);
    assert!(sink.events.is_empty());
    assert_eq!(svc.ble().value(Characteristic::Status), b"idle");
}

#[test]
fn new_connection_evicts_previous_session() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);
    svc.on_write(1, Characteristic::UserId, b"alice", &mut sink);

    svc.on_connect(2);
    assert_eq!(svc.active_connection(), Some(2));
    assert_eq!(svc.selected_user(), None);
    assert!(svc.ble().sim_ops().contains(&SimOp::Disconnect(1)));

    // The evicted client can no longer submit; its late disconnect is stale.
    svc.on_write(1, Characteristic::Rpc, b":1234", &mut sink);
    svc.on_disconnect(1);
    assert_eq!(svc.active_connection(), Some(2));
    assert_eq!(kinds(&sink.events), vec![EventKind::UserSelected]);
}

#[test]
fn end_session_on_outcome_disconnects_client() {
    let config = PinpadConfig {
        end_session_on_outcome: true,
        ..static_pin("1234")
    };
    let mut svc = pinpad(config, MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(4);
    svc.on_write(4, Characteristic::Rpc, b"bob:0000", &mut sink);

    assert_eq!(kinds(&sink.events), vec![EventKind::Rejected]);
    assert_eq!(svc.active_connection(), None);
    assert!(svc.ble().sim_ops().contains(&SimOp::Disconnect(4)));
}

#[test]
fn idle_session_times_out() {
    let config = PinpadConfig {
        session_timeout_secs: 5,
        ..static_pin("1234")
    };
    let mut svc = pinpad(config, MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);

    svc.clock().advance_ms(4_000);
    svc.on_write(1, Characteristic::UserId, b"bob", &mut sink);
    svc.clock().advance_ms(4_999);
    svc.tick();
    assert_eq!(svc.active_connection(), Some(1));

    svc.clock().advance_ms(1);
    svc.tick();
    assert_eq!(svc.active_connection(), None);
    assert!(svc.ble().sim_ops().contains(&SimOp::Disconnect(1)));
}

#[test]
fn status_characteristic_tracks_outcomes() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let mut sink = RecordingSink::new();
    svc.on_connect(1);

    svc.on_write(1, Characteristic::Rpc, b"bob:1111", &mut sink);
    assert_eq!(svc.ble().value(Characteristic::Status), b"rejected");
    svc.clock().advance_ms(500);
    svc.tick();
    assert_eq!(svc.ble().value(Characteristic::Status), b"idle");
    assert!(svc.indicator().updates >= 1);
}

#[test]
fn setup_publishes_read_only_characteristics() {
    let mut svc = pinpad(
        PinpadConfig::new(SecurityMode::Hotp, "12345678901234567890"),
        MemCounter::starting_at(42),
        MockClock::default(),
    );
    assert_eq!(svc.ble().value(Characteristic::SecurityMode), b"hotp");
    assert_eq!(svc.ble().value(Characteristic::HotpCounter), b"42");
    assert_eq!(svc.ble().value(Characteristic::Status), b"idle");

    svc.set_user_commands("open_garage,lights");
    assert_eq!(
        svc.ble().value(Characteristic::UserCommands),
        b"open_garage,lights"
    );
    assert!(svc.ble().sim_ops().contains(&SimOp::Notify(
        Characteristic::UserCommands,
        b"open_garage,lights".to_vec()
    )));
}

#[test]
fn triggers_see_events_in_production_order() {
    let mut svc = pinpad(static_pin("1234"), MemCounter::default(), MockClock::default());
    let log = Rc::new(RefCell::new(Vec::<String>::new()));

    let mut triggers = Triggers::new();
    let (a, b, c) = (log.clone(), log.clone(), log.clone());
    triggers
        .on_user_selected(move |user| a.borrow_mut().push(format!("selected {}", user)))
        .on_accepted(move |user, cmd| b.borrow_mut().push(format!("accepted {} {}", user, cmd)))
        .on_user_command(move |cmd| c.borrow_mut().push(format!("cmd {}", cmd)));
    let mut sinks = (RecordingSink::new(), triggers);

    svc.on_connect(1);
    svc.on_write(1, Characteristic::Rpc, b"@dave", &mut sinks);
    svc.on_write(1, Characteristic::Rpc, b"unlock", &mut sinks);
    svc.on_write(1, Characteristic::Rpc, b":1234", &mut sinks);

    assert_eq!(
        *log.borrow(),
        vec!["selected dave", "cmd unlock", "accepted dave unlock"]
    );
    assert_eq!(sinks.0.events.len(), 3);
}

#[test]
fn non_ascii_secret_prevents_start() {
    let result = try_pinpad(static_pin("12é4"), MemCounter::default(), MockClock::default());
    assert!(matches!(result, Err(ConfigError::NonAsciiSecret)));
}
