//! Mock adapters for integration tests.
//!
//! The BLE side uses the crate's own simulated [`BleAdapter`], which records
//! every outbound operation. Clock, counter store, indicator and sink are
//! recorded here so tests can assert on the full history.

use std::cell::Cell;

use blepinpad::adapters::ble::BleAdapter;
use blepinpad::app::events::PinpadEvent;
use blepinpad::app::ports::{Clock, CounterStore, EventSink, IndicatorSignal, StatusIndicator};
use blepinpad::app::service::PinpadService;
use blepinpad::config::PinpadConfig;
use blepinpad::error::{ConfigError, StorageError};

// ── Clock ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockClock {
    pub uptime_ms: Cell<u64>,
    pub unix_secs: Cell<Option<u64>>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn at_unix(secs: u64) -> Self {
        Self {
            uptime_ms: Cell::new(0),
            unix_secs: Cell::new(Some(secs)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.uptime_ms.set(self.uptime_ms.get() + ms);
    }

    pub fn set_unix(&self, secs: Option<u64>) {
        self.unix_secs.set(secs);
    }
}

impl Clock for MockClock {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }

    fn unix_time_secs(&self) -> Option<u64> {
        self.unix_secs.get()
    }

    fn set_unix_time_secs(&mut self, secs: u64) -> bool {
        self.unix_secs.set(Some(secs));
        true
    }
}

// ── Counter store ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemCounter {
    pub value: Option<u64>,
    pub saves: Vec<u64>,
    pub fail_saves: bool,
}

#[allow(dead_code)]
impl MemCounter {
    pub fn starting_at(counter: u64) -> Self {
        Self {
            value: Some(counter),
            ..Self::default()
        }
    }
}

impl CounterStore for MemCounter {
    fn load(&self) -> Result<Option<u64>, StorageError> {
        Ok(self.value)
    }

    fn save(&mut self, counter: u64) -> Result<(), StorageError> {
        if self.fail_saves {
            return Err(StorageError::IoError);
        }
        self.value = Some(counter);
        self.saves.push(counter);
        Ok(())
    }
}

// ── Indicator ─────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingIndicator {
    pub signals: Vec<IndicatorSignal>,
    pub updates: u32,
}

impl StatusIndicator for RecordingIndicator {
    fn signal(&mut self, signal: IndicatorSignal, _now_ms: u64) {
        self.signals.push(signal);
    }

    fn update(&mut self, _now_ms: u64) {
        self.updates += 1;
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<PinpadEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<PinpadEvent> {
        core::mem::take(&mut self.events)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &PinpadEvent) {
        self.events.push(event.clone());
    }
}

// ── Service harness ───────────────────────────────────────────

pub type TestPinpad = PinpadService<BleAdapter, MemCounter, RecordingIndicator, MockClock>;

pub fn ble() -> BleAdapter {
    let mut name = heapless::String::<24>::new();
    name.push_str("pinpad-it").ok();
    BleAdapter::new(name)
}

#[allow(dead_code)]
pub fn try_pinpad(
    mut config: PinpadConfig,
    store: MemCounter,
    clock: MockClock,
) -> Result<TestPinpad, ConfigError> {
    // Throttling has its own tests; keep it out of the flows.
    config.max_attempts_per_sec = 0;
    PinpadService::new(config, ble(), store, RecordingIndicator::default(), clock)
}

/// Build and set up a service around the simulated adapters.
pub fn pinpad(config: PinpadConfig, store: MemCounter, clock: MockClock) -> TestPinpad {
    let mut svc = try_pinpad(config, store, clock).expect("valid test config");
    svc.setup();
    svc
}
