//! Error types for the pinpad firmware.
//!
//! Three families, each with a different propagation rule:
//!
//! - [`ConfigError`]: fatal, raised while building the component. The
//!   binary refuses to start the BLE service when one is returned.
//! - [`ParseError`]: recoverable, raised by the BLE command parser. The
//!   state machine degrades it to a Rejected outcome or drops it.
//! - [`StorageError`]: raised by the persistence ports.
//!
//! None of these variants ever carries secret material.

use core::fmt;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Configuration-time failures. All variants are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// OTP modes require a shared key.
    EmptySecret,
    /// The secret contains a byte outside 0x00..=0x7F.
    NonAsciiSecret,
    /// Security mode string was not one of `none`, `hotp`, `totp`.
    UnsupportedMode,
    /// A numeric field is out of range. The string names the field.
    ValidationFailed(&'static str),
    /// The HOTP counter exists in storage but could not be read.
    CounterUnavailable,
    /// Config blob in storage failed to deserialize.
    Corrupted,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySecret => write!(f, "secret_passcode is required for OTP modes"),
            Self::NonAsciiSecret => write!(f, "secret_passcode must consist of only ascii characters"),
            Self::UnsupportedMode => write!(f, "unsupported security_mode"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::CounterUnavailable => write!(f, "stored HOTP counter could not be read"),
            Self::Corrupted => write!(f, "stored config corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Malformed BLE characteristic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Zero-length write (or only line terminators).
    Empty,
    /// Write exceeds the configured maximum input length.
    TooLong { len: usize, max: usize },
    /// Payload is not valid UTF-8.
    InvalidUtf8,
    /// `@` sigil with nothing after it.
    EmptyUser,
    /// User name contains non-printable bytes or is too long.
    InvalidUser,
    /// Time write is not a decimal count of Unix seconds.
    InvalidTime,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty write"),
            Self::TooLong { len, max } => write!(f, "write too long ({} > {})", len, max),
            Self::InvalidUtf8 => write!(f, "write contains invalid UTF-8"),
            Self::EmptyUser => write!(f, "user selection without a user"),
            Self::InvalidUser => write!(f, "user name invalid (1-32 printable ASCII bytes)"),
            Self::InvalidTime => write!(f, "time must be decimal Unix seconds"),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from [`StoragePort`](crate::app::ports::StoragePort) and
/// [`CounterStore`](crate::app::ports::CounterStore) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored value has the wrong size or encoding.
    Corrupted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored value corrupted"),
        }
    }
}
