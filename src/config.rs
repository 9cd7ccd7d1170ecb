//! Pinpad configuration parameters
//!
//! Everything the component needs is captured here once at boot and is
//! fixed for the lifetime of the service. Values come from NVS, or from the
//! compiled-in `pinpad.json` on first boot.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which validator path handles a PIN submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Static PIN, compared in constant time.
    None,
    /// Counter-based one-time password (RFC 4226).
    Hotp,
    /// Time-based one-time password (RFC 6238).
    Totp,
}

impl SecurityMode {
    /// Value published on the security-mode characteristic.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hotp => "hotp",
            Self::Totp => "totp",
        }
    }

    /// Whether this mode needs a non-empty shared key.
    pub fn requires_secret(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hotp" => Ok(Self::Hotp),
            "totp" => Ok(Self::Totp),
            _ => Err(ConfigError::UnsupportedMode),
        }
    }
}

/// Keyed-hash used for OTP derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

/// Core pinpad configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinpadConfig {
    // --- Security ---
    pub security_mode: SecurityMode,
    /// Static PIN (mode `none`) or shared OTP key (modes `hotp` / `totp`).
    pub secret_passcode: String,
    /// Number of decimal digits in an OTP code.
    pub otp_digits: u8,
    pub otp_algorithm: OtpAlgorithm,
    /// Forward look-ahead for HOTP resynchronization.
    pub hotp_window: u32,
    /// TOTP time step length (seconds).
    pub totp_period_secs: u32,
    /// TOTP steps accepted on either side of the current one.
    pub totp_skew_steps: u32,
    /// PIN submissions per second (token refill). 0 disables throttling.
    pub max_attempts_per_sec: u32,
    /// PIN submissions allowed in a burst.
    pub attempt_burst: u32,

    // --- Input ---
    /// Maximum accepted BLE write length (bytes).
    pub max_input_len: usize,

    // --- Session ---
    /// Idle session teardown (seconds). 0 keeps sessions until disconnect.
    pub session_timeout_secs: u32,
    /// Disconnect the client after every Accepted/Rejected outcome.
    pub end_session_on_outcome: bool,

    // --- Advertising ---
    pub start_advertising: bool,
    pub stop_advertising: bool,
    /// Become non-discoverable after the first accepted PIN.
    pub stop_advertising_on_accept: bool,

    // --- Status output ---
    /// A binary status indicator is wired up.
    pub status_indicator: bool,
    /// How long Accepted/Rejected stay published before reverting to Idle.
    pub validation_hold_ms: u32,
}

impl Default for PinpadConfig {
    fn default() -> Self {
        Self {
            security_mode: SecurityMode::None,
            secret_passcode: String::new(),
            otp_digits: 6,
            otp_algorithm: OtpAlgorithm::Sha1,
            hotp_window: 10,
            totp_period_secs: 30,
            totp_skew_steps: 1,
            max_attempts_per_sec: 2,
            attempt_burst: 5,

            max_input_len: 64,

            session_timeout_secs: 60,
            end_session_on_outcome: false,

            start_advertising: true,
            stop_advertising: false,
            stop_advertising_on_accept: false,

            status_indicator: false,
            validation_hold_ms: 500,
        }
    }
}

impl PinpadConfig {
    /// Convenience constructor used by tests and by the binary's fallback.
    pub fn new(security_mode: SecurityMode, secret_passcode: impl Into<String>) -> Self {
        Self {
            security_mode,
            secret_passcode: secret_passcode.into(),
            ..Self::default()
        }
    }

    /// Range-check every numeric field.
    ///
    /// Secret rules are enforced separately by
    /// [`SecretStore::new`](crate::auth::secret::SecretStore::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(6..=9).contains(&self.otp_digits) {
            return Err(ConfigError::ValidationFailed("otp_digits must be 6–9"));
        }
        if !(1..=100).contains(&self.hotp_window) {
            return Err(ConfigError::ValidationFailed("hotp_window must be 1–100"));
        }
        if !(1..=300).contains(&self.totp_period_secs) {
            return Err(ConfigError::ValidationFailed(
                "totp_period_secs must be 1–300",
            ));
        }
        if self.totp_skew_steps > 10 {
            return Err(ConfigError::ValidationFailed(
                "totp_skew_steps must be 0–10",
            ));
        }
        if !(1..=255).contains(&self.max_input_len) {
            return Err(ConfigError::ValidationFailed("max_input_len must be 1–255"));
        }
        if self.max_attempts_per_sec > 0 && self.attempt_burst == 0 {
            return Err(ConfigError::ValidationFailed(
                "attempt_burst must be > 0 when throttling is enabled",
            ));
        }
        if self.validation_hold_ms > 10_000 {
            return Err(ConfigError::ValidationFailed(
                "validation_hold_ms must be 0–10000",
            ));
        }
        Ok(())
    }
}

// The secret must never reach a log line through `{:?}`.
impl fmt::Debug for PinpadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinpadConfig")
            .field("security_mode", &self.security_mode)
            .field("secret_passcode", &"<redacted>")
            .field("otp_digits", &self.otp_digits)
            .field("otp_algorithm", &self.otp_algorithm)
            .field("hotp_window", &self.hotp_window)
            .field("totp_period_secs", &self.totp_period_secs)
            .field("totp_skew_steps", &self.totp_skew_steps)
            .field("max_attempts_per_sec", &self.max_attempts_per_sec)
            .field("attempt_burst", &self.attempt_burst)
            .field("max_input_len", &self.max_input_len)
            .field("session_timeout_secs", &self.session_timeout_secs)
            .field("end_session_on_outcome", &self.end_session_on_outcome)
            .field("start_advertising", &self.start_advertising)
            .field("stop_advertising", &self.stop_advertising)
            .field("stop_advertising_on_accept", &self.stop_advertising_on_accept)
            .field("status_indicator", &self.status_indicator)
            .field("validation_hold_ms", &self.validation_hold_ms)
            .finish()
    }
}
