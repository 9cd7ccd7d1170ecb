//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ PinpadService (domain)
//! ```
//!
//! Driven adapters (BLE stack, NVS, status output, clocks, event sinks)
//! implement these traits. The [`PinpadService`](super::service::PinpadService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! ## Security notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **CounterStore** writes MUST be durable when `save` returns `Ok`.
//! - No port ever receives secret material except `ConfigPort`.

use crate::config::PinpadConfig;
use crate::error::{ConfigError, StorageError};

use super::events::PinpadEvent;

/// Connection handle as reported by the BLE stack.
pub type ConnId = u16;

// ───────────────────────────────────────────────────────────────
// BLE port (driven adapter: domain → radio)
// ───────────────────────────────────────────────────────────────

/// Characteristics of the pinpad GATT service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    /// Read + notify: published [`PinpadStatus`](super::service::PinpadStatus).
    Status,
    /// Write: the text command grammar.
    Rpc,
    /// Read: configured security mode.
    SecurityMode,
    /// Read: persisted HOTP counter, decimal.
    HotpCounter,
    /// Write: raw user name.
    UserId,
    /// Write: raw free command text.
    Cmd,
    /// Read + notify: application-provided command list.
    UserCommands,
    /// Write: wall-clock time, decimal Unix seconds.
    Time,
}

impl Characteristic {
    pub const ALL: [Characteristic; 8] = [
        Self::Status,
        Self::Rpc,
        Self::SecurityMode,
        Self::HotpCounter,
        Self::UserId,
        Self::Cmd,
        Self::UserCommands,
        Self::Time,
    ];

    /// Whether the client may write this characteristic.
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Rpc | Self::UserId | Self::Cmd | Self::Time)
    }
}

/// Minimal capability surface of the host BLE stack.
///
/// Connection establishment, MTU negotiation and attribute registration
/// are the adapter's business. Inbound callbacks (connect, disconnect,
/// write) are delivered to the service by the owner's event loop.
pub trait BlePort {
    /// Begin (or resume) advertising. The adapter may assume it is only
    /// called on a real state change.
    fn start_advertising(&mut self);

    /// Stop advertising. Existing connections stay up.
    fn stop_advertising(&mut self);

    /// Ask the stack to drop a client.
    fn disconnect(&mut self, conn: ConnId);

    /// Update the value served on reads.
    fn set_value(&mut self, characteristic: Characteristic, value: &[u8]);

    /// Push the current value to a subscribed client.
    fn notify(&mut self, characteristic: Characteristic, value: &[u8]);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → automations / log)
// ───────────────────────────────────────────────────────────────

/// The domain emits [`PinpadEvent`]s through this port, synchronously and
/// in production order. Adapters decide where they go (serial log,
/// automation triggers, a channel to another task).
pub trait EventSink {
    fn emit(&mut self, event: &PinpadEvent);
}

/// Fan one event stream out to two sinks, left first.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &PinpadEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Status indicator port (driven adapter: domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// What the indicator should show after a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorSignal {
    Accepted,
    Rejected,
}

/// Binary status output pulsed on every validation outcome.
pub trait StatusIndicator {
    /// Start showing `signal` at `now_ms`.
    fn signal(&mut self, signal: IndicatorSignal, now_ms: u64);

    /// Advance the output pattern. Called from the service tick.
    fn update(&mut self, now_ms: u64);
}

impl<S: StatusIndicator + ?Sized> StatusIndicator for Box<S> {
    fn signal(&mut self, signal: IndicatorSignal, now_ms: u64) {
        (**self).signal(signal, now_ms);
    }

    fn update(&mut self, now_ms: u64) {
        (**self).update(now_ms);
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    /// Monotonic milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Wall-clock seconds since the Unix epoch, `None` until synced.
    fn unix_time_secs(&self) -> Option<u64>;

    /// Set the wall clock. Returns `false` if the platform refused.
    fn set_unix_time_secs(&mut self, secs: u64) -> bool;
}

// ───────────────────────────────────────────────────────────────
// HOTP counter persistence
// ───────────────────────────────────────────────────────────────

/// Durable home of the HOTP moving factor.
pub trait CounterStore {
    /// `Ok(None)` on first boot.
    fn load(&self) -> Result<Option<u64>, StorageError>;

    /// Persist `counter`. Must be durable when it returns `Ok`.
    fn save(&mut self, counter: u64) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the pinpad configuration.
///
/// # Security
///
/// Implementations MUST run [`PinpadConfig::validate`] before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns `Ok(None)` if no stored config exists.
    fn load(&self) -> Result<Option<PinpadConfig>, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &PinpadConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}
