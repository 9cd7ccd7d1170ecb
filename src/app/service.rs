//! Pinpad service: the hexagonal core.
//!
//! [`PinpadService`] owns the secret, the validator, the HOTP counter, the
//! single connection session and the advertising policy. The radio, the
//! counter store, the status output and the clock are injected as port
//! implementations; event sinks are passed at call sites.
//!
//! ```text
//!   BLE write ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │        PinpadService         │
//!   BlePort   ◀── │ parse · throttle · validate  │ ──▶ StatusIndicator
//!   CounterStore◀─│ session · advertising        │
//!                 └──────────────────────────────┘
//! ```
//!
//! Every entry point (`on_connect`, `on_disconnect`, `on_write`, `tick`)
//! runs to completion; the owner serializes them.

use core::time::Duration;

use burster::Limiter;
use log::{debug, info, warn};
use zeroize::Zeroize;

use crate::auth::{OtpState, OtpValidator, SecretStore, ValidationOutcome};
use crate::config::{PinpadConfig, SecurityMode};
use crate::error::{ConfigError, StorageError};

use super::advertising::AdvertisingController;
use super::commands::{self, Command, CommandText, PinBuffer, UserName};
use super::events::PinpadEvent;
use super::ports::{
    BlePort, Characteristic, Clock, ConnId, CounterStore, EventSink, IndicatorSignal,
    StatusIndicator,
};

// ───────────────────────────────────────────────────────────────
// States
// ───────────────────────────────────────────────────────────────

/// Connection / validation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinpadState {
    /// No client connected.
    Idle,
    /// A session exists and awaits input.
    Connected,
    /// A submission is being checked. Never observable between calls.
    Validating,
}

/// Value of the status characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinpadStatus {
    /// Service not set up yet.
    Stopped,
    Idle,
    Accepted,
    Rejected,
}

impl PinpadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Idle => "idle",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

struct Session {
    conn: ConnId,
    user: UserName,
    command: CommandText,
    pin: PinBuffer,
    last_activity_ms: u64,
}

impl Session {
    fn new(conn: ConnId, now_ms: u64) -> Self {
        Self {
            conn,
            user: UserName::new(),
            command: CommandText::new(),
            pin: PinBuffer::new(),
            last_activity_ms: now_ms,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// PinpadService
// ───────────────────────────────────────────────────────────────

pub struct PinpadService<B, K, I, T> {
    config: PinpadConfig,
    secret: SecretStore,
    validator: OtpValidator,
    otp_state: OtpState,

    ble: B,
    store: K,
    indicator: I,
    clock: T,

    advertising: AdvertisingController,
    rate_limiter: Option<burster::TokenBucket<fn() -> Duration>>,

    state: PinpadState,
    status: PinpadStatus,
    status_since_ms: u64,
    session: Option<Session>,
    user_commands: String,
}

impl<B, K, I, T> PinpadService<B, K, I, T>
where
    B: BlePort,
    K: CounterStore,
    I: StatusIndicator,
    T: Clock,
{
    /// Build the service. Fails fast on any configuration problem.
    ///
    /// In HOTP mode the counter is loaded here; a stored counter that
    /// cannot be read is fatal rather than silently restarting at zero.
    /// Does **not** touch the radio; call [`setup`](Self::setup) next.
    pub fn new(
        mut config: PinpadConfig,
        ble: B,
        store: K,
        indicator: I,
        clock: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let secret = SecretStore::new(config.security_mode, &config.secret_passcode)?;
        // The store holds the only copy from here on.
        config.secret_passcode.zeroize();

        let otp_state = match config.security_mode {
            SecurityMode::Hotp => match store.load() {
                Ok(counter) => OtpState::new(counter.unwrap_or(0)),
                Err(StorageError::NotFound) => OtpState::default(),
                Err(e) => {
                    warn!("NVS: HOTP counter unreadable: {}", e);
                    return Err(ConfigError::CounterUnavailable);
                }
            },
            SecurityMode::None | SecurityMode::Totp => OtpState::default(),
        };

        let rate_limiter = (config.max_attempts_per_sec > 0).then(|| {
            burster::TokenBucket::new_with_time_provider(
                config.max_attempts_per_sec as _,
                config.attempt_burst as _,
                platform_now as fn() -> Duration,
            )
        });

        Ok(Self {
            validator: OtpValidator::from_config(&config),
            config,
            secret,
            otp_state,
            ble,
            store,
            indicator,
            clock,
            advertising: AdvertisingController::new(),
            rate_limiter,
            state: PinpadState::Idle,
            status: PinpadStatus::Stopped,
            status_since_ms: 0,
            session: None,
            user_commands: String::new(),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Publish the read-only characteristics and apply the boot
    /// advertising policy.
    pub fn setup(&mut self) {
        let mode = self.secret.mode().as_str();
        self.ble.set_value(Characteristic::SecurityMode, mode.as_bytes());
        self.publish_counter();
        self.publish_user_commands();
        self.advertising.apply_boot_policy(
            self.config.start_advertising,
            self.config.stop_advertising,
            &mut self.ble,
        );
        let now = self.clock.uptime_ms();
        self.set_status(PinpadStatus::Idle, now);
        info!("pinpad: ready ({} mode)", mode);
    }

    /// Log the effective configuration. Never prints secret material.
    pub fn dump_config(&self) {
        let c = &self.config;
        info!("pinpad config:");
        info!("  security mode: {}", self.secret.mode());
        if self.accepts_empty_pin() {
            warn!("  secret is empty: any '<user>:' write unlocks");
        }
        match self.secret.mode() {
            SecurityMode::None => {}
            SecurityMode::Hotp => info!(
                "  hotp: {} digits, {:?}, window {}, counter {}",
                c.otp_digits, c.otp_algorithm, c.hotp_window, self.otp_state.counter
            ),
            SecurityMode::Totp => info!(
                "  totp: {} digits, {:?}, period {}s, skew ±{} steps",
                c.otp_digits, c.otp_algorithm, c.totp_period_secs, c.totp_skew_steps
            ),
        }
        info!(
            "  advertising: start={} stop={} stop_on_accept={}",
            c.start_advertising, c.stop_advertising, c.stop_advertising_on_accept
        );
        info!(
            "  session: timeout {}s, end on outcome {}, max input {} bytes",
            c.session_timeout_secs, c.end_session_on_outcome, c.max_input_len
        );
        if c.max_attempts_per_sec > 0 {
            info!(
                "  throttle: {}/s, burst {}",
                c.max_attempts_per_sec, c.attempt_burst
            );
        } else {
            info!("  throttle: off");
        }
        info!(
            "  status indicator: {}",
            if c.status_indicator { "yes" } else { "no" }
        );
    }

    // ── BLE callbacks ─────────────────────────────────────────

    /// A central connected. A new connection evicts the previous session.
    pub fn on_connect(&mut self, conn: ConnId) {
        let now = self.clock.uptime_ms();
        if let Some(old) = self.session.take() {
            if old.conn != conn {
                info!("BLE: conn {} evicted by conn {}", old.conn, conn);
                self.ble.disconnect(old.conn);
            }
        }
        self.session = Some(Session::new(conn, now));
        self.state = PinpadState::Connected;
        info!("BLE: conn {} connected", conn);

        self.advertising.on_connect();
        self.advertising.sync(&mut self.ble);
    }

    /// A central went away. Unknown handles (an evicted client) are ignored.
    pub fn on_disconnect(&mut self, conn: ConnId) {
        if self.session.as_ref().is_some_and(|s| s.conn == conn) {
            self.end_session();
            info!("BLE: conn {} disconnected", conn);
        } else {
            debug!("BLE: disconnect for stale conn {}", conn);
        }
        self.advertising.sync(&mut self.ble);
    }

    /// A client wrote `data` to `characteristic`.
    ///
    /// Writes from a connection without a live session are no-ops.
    pub fn on_write(
        &mut self,
        conn: ConnId,
        characteristic: Characteristic,
        data: &[u8],
        sink: &mut impl EventSink,
    ) {
        let now = self.clock.uptime_ms();
        match self.session.as_mut() {
            Some(session) if session.conn == conn => session.last_activity_ms = now,
            _ => {
                debug!("BLE: write from conn {} without session dropped", conn);
                return;
            }
        }

        let max = self.config.max_input_len;
        debug!(
            "BLE: {:?} write, {} bytes",
            characteristic,
            data.len()
        );
        match characteristic {
            Characteristic::Rpc => match commands::parse(data, max) {
                Ok(Command::UserSelect(user)) => self.select_user(user, sink),
                Ok(Command::PinSubmit { user, code }) => self.submit(user, code, sink),
                Ok(Command::FreeCommand(text)) => self.free_command(text, sink),
                Err(e) if commands::is_submit_shaped(data) => {
                    debug!("pinpad: malformed submission ({})", e);
                    self.finish(false, sink);
                }
                Err(e) => debug!("pinpad: write ignored ({})", e),
            },
            Characteristic::UserId => match commands::parse_user_id(data, max) {
                Ok(user) => self.select_user(user, sink),
                Err(e) => debug!("pinpad: user id ignored ({})", e),
            },
            Characteristic::Cmd => match commands::parse_free_command(data, max) {
                Ok(text) => self.free_command(text, sink),
                Err(e) => debug!("pinpad: cmd ignored ({})", e),
            },
            Characteristic::Time => match commands::parse_unix_time(data) {
                Ok(secs) => self.set_time(secs),
                Err(e) => debug!("pinpad: time write ignored ({})", e),
            },
            other => warn!("BLE: write to read-only {:?} ignored", other),
        }
    }

    // ── Periodic work ─────────────────────────────────────────

    /// Drive time-based behaviour: indicator pattern, status hold and
    /// session timeout.
    pub fn tick(&mut self) {
        let now = self.clock.uptime_ms();
        self.indicator.update(now);

        let holding = matches!(
            self.status,
            PinpadStatus::Accepted | PinpadStatus::Rejected
        );
        let hold_ms = u64::from(self.config.validation_hold_ms);
        if holding && now.saturating_sub(self.status_since_ms) >= hold_ms {
            self.set_status(PinpadStatus::Idle, now);
        }

        let timeout_ms = u64::from(self.config.session_timeout_secs) * 1000;
        if timeout_ms == 0 {
            return;
        }
        let expired = self
            .session
            .as_ref()
            .filter(|s| now.saturating_sub(s.last_activity_ms) >= timeout_ms)
            .map(|s| s.conn);
        if let Some(conn) = expired {
            info!("BLE: conn {} idle timeout", conn);
            self.ble.disconnect(conn);
            self.end_session();
            self.advertising.sync(&mut self.ble);
        }
    }

    // ── Operational controls ──────────────────────────────────

    pub fn start_advertising(&mut self) {
        self.advertising.start(&mut self.ble);
    }

    pub fn stop_advertising(&mut self) {
        self.advertising.stop(&mut self.ble);
    }

    /// Replace the text served on the user commands characteristic.
    pub fn set_user_commands(&mut self, text: &str) {
        text.clone_into(&mut self.user_commands);
        self.publish_user_commands();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> PinpadState {
        self.state
    }

    pub fn status(&self) -> PinpadStatus {
        self.status
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.secret.mode()
    }

    pub fn otp_counter(&self) -> u64 {
        self.otp_state.counter
    }

    /// Static mode with an empty secret: a bare `:` submission matches.
    pub fn accepts_empty_pin(&self) -> bool {
        self.secret.mode() == SecurityMode::None && self.secret.secret_len() == 0
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising.is_advertising()
    }

    pub fn active_connection(&self) -> Option<ConnId> {
        self.session.as_ref().map(|s| s.conn)
    }

    /// User selected in the live session, if any.
    pub fn selected_user(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|s| s.user.as_str())
            .filter(|u| !u.is_empty())
    }

    /// Free command waiting to ride along with the next outcome.
    pub fn pending_command(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|s| s.command.as_str())
            .filter(|c| !c.is_empty())
    }

    pub fn ble(&self) -> &B {
        &self.ble
    }

    pub fn counter_store(&self) -> &K {
        &self.store
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn clock(&self) -> &T {
        &self.clock
    }

    // ── Internal ──────────────────────────────────────────────

    fn select_user(&mut self, user: UserName, sink: &mut impl EventSink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.user = user.clone();
        info!("pinpad: user '{}' selected", user);
        sink.emit(&PinpadEvent::UserSelected { user });
    }

    fn free_command(&mut self, command: CommandText, sink: &mut impl EventSink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.command = command.clone();
        let user = session.user.clone();
        info!("pinpad: command '{}' received", command);
        sink.emit(&PinpadEvent::UserCommand { user, command });
    }

    fn submit(&mut self, user: UserName, code: PinBuffer, sink: &mut impl EventSink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !user.is_empty() {
            session.user = user;
        }
        session.pin = code;
        debug!("pinpad: submission, {} chars", session.pin.len());

        if !self.allow_attempt() {
            warn!("pinpad: submission throttled");
            self.finish(false, sink);
            return;
        }

        self.state = PinpadState::Validating;
        let outcome = match self.session.as_ref() {
            Some(session) => self.validator.validate(
                &self.secret,
                session.pin.as_str(),
                self.otp_state,
                self.clock.unix_time_secs(),
            ),
            None => ValidationOutcome::Rejected,
        };

        let accepted = match outcome {
            ValidationOutcome::Accepted { next } => self.commit(next),
            ValidationOutcome::Rejected => false,
        };
        self.finish(accepted, sink);
    }

    /// Seed the wall clock. Only an unsynced clock may be set, so a
    /// client cannot wind time back onto a code it has already seen.
    fn set_time(&mut self, secs: u64) {
        if self.clock.unix_time_secs().is_some() {
            warn!("pinpad: clock already set, time write ignored");
            return;
        }
        if self.clock.set_unix_time_secs(secs) {
            info!("pinpad: wall clock set to {}", secs);
        } else {
            warn!("pinpad: time {} refused by clock", secs);
        }
    }

    fn allow_attempt(&mut self) -> bool {
        self.rate_limiter
            .as_mut()
            .is_none_or(|limiter| limiter.try_consume(1).is_ok())
    }

    /// Persist an advanced counter. Returns whether the outcome may stand.
    fn commit(&mut self, next: OtpState) -> bool {
        if next == self.otp_state {
            return true;
        }
        match self.store.save(next.counter) {
            Ok(()) => {
                self.otp_state = next;
                self.publish_counter();
                true
            }
            Err(e) => {
                // Counter stays put: the outcome is Rejected.
                warn!("NVS: HOTP counter save failed: {}", e);
                false
            }
        }
    }

    /// Deliver one outcome for the live session and reset its input.
    fn finish(&mut self, accepted: bool, sink: &mut impl EventSink) {
        let now = self.clock.uptime_ms();
        let Some(session) = self.session.as_mut() else {
            debug!("pinpad: outcome for vanished session dropped");
            self.state = PinpadState::Idle;
            return;
        };
        session.pin.clear();
        let conn = session.conn;
        let user = core::mem::take(&mut session.user);
        let command = core::mem::take(&mut session.command);
        self.state = PinpadState::Connected;

        if accepted {
            info!("pinpad: accepted for '{}'", user);
            sink.emit(&PinpadEvent::Accepted { user, command });
            self.set_status(PinpadStatus::Accepted, now);
            self.indicator.signal(IndicatorSignal::Accepted, now);
            if self.config.stop_advertising_on_accept {
                self.advertising.stop(&mut self.ble);
            }
        } else {
            info!("pinpad: rejected for '{}'", user);
            sink.emit(&PinpadEvent::Rejected { user, command });
            self.set_status(PinpadStatus::Rejected, now);
            self.indicator.signal(IndicatorSignal::Rejected, now);
        }

        if self.config.end_session_on_outcome {
            self.ble.disconnect(conn);
            self.end_session();
            self.advertising.sync(&mut self.ble);
        }
    }

    fn end_session(&mut self) {
        self.session = None;
        self.state = PinpadState::Idle;
    }

    fn set_status(&mut self, status: PinpadStatus, now_ms: u64) {
        self.status = status;
        self.status_since_ms = now_ms;
        let value = status.as_str().as_bytes();
        self.ble.set_value(Characteristic::Status, value);
        self.ble.notify(Characteristic::Status, value);
    }

    fn publish_counter(&mut self) {
        let value = self.otp_state.counter.to_string();
        self.ble
            .set_value(Characteristic::HotpCounter, value.as_bytes());
    }

    fn publish_user_commands(&mut self) {
        let value = self.user_commands.as_bytes();
        self.ble.set_value(Characteristic::UserCommands, value);
        self.ble.notify(Characteristic::UserCommands, value);
    }
}

// ── Platform time source for burster ─────────────────────────

#[cfg(target_os = "espidf")]
fn platform_now() -> Duration {
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    Duration::from_micros(us as u64)
}

#[cfg(not(target_os = "espidf"))]
fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}
