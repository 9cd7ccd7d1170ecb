//! Inbound commands parsed from BLE characteristic writes.
//!
//! Wire grammar of the rpc characteristic (UTF-8 text, trailing CR/LF
//! ignored):
//!
//! | Write            | Command                                  |
//! |------------------|------------------------------------------|
//! | `@<user>`        | [`Command::UserSelect`]                  |
//! | `<user>:<code>`  | [`Command::PinSubmit`] (split at first `:`) |
//! | `:<code>`        | [`Command::PinSubmit`] for the selected user |
//! | anything else    | [`Command::FreeCommand`], text verbatim  |
//!
//! `:` is reserved: a free command can never contain one. User names are
//! 1..=32 printable ASCII bytes without `:`.
//!
//! The time characteristic takes decimal Unix seconds, e.g. `1700000000`.

use core::fmt;

use zeroize::Zeroize;

use crate::error::ParseError;

pub const USER_SIGIL: char = '@';
pub const SUBMIT_DELIMITER: char = ':';

/// Longest user name accepted.
pub const MAX_USER_LEN: usize = 32;
/// Hard ceiling on any single write, independent of configuration.
pub const MAX_INPUT_CAP: usize = 255;
/// `u64::MAX` is 20 digits; allow a CR/LF pair.
const MAX_TIME_LEN: usize = 22;

pub type UserName = heapless::String<MAX_USER_LEN>;
pub type CommandText = heapless::String<MAX_INPUT_CAP>;

/// A parsed characteristic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    UserSelect(UserName),
    /// An empty `user` means "the session's selected user".
    PinSubmit { user: UserName, code: PinBuffer },
    FreeCommand(CommandText),
}

impl Command {
    /// Serialize back into the wire grammar.
    pub fn encode(&self) -> String {
        match self {
            Self::UserSelect(user) => format!("{}{}", USER_SIGIL, user),
            Self::PinSubmit { user, code } => {
                format!("{}{}{}", user, SUBMIT_DELIMITER, code.as_str())
            }
            Self::FreeCommand(text) => text.as_str().into(),
        }
    }
}

/// Parse a write to the rpc characteristic.
pub fn parse(raw: &[u8], max_len: usize) -> Result<Command, ParseError> {
    let text = decode(raw, max_len)?;

    if let Some(user) = text.strip_prefix(USER_SIGIL) {
        return parse_user_name(user).map(Command::UserSelect);
    }

    if let Some((user, code)) = text.split_once(SUBMIT_DELIMITER) {
        let user = if user.is_empty() {
            UserName::new()
        } else {
            parse_user_name(user)?
        };
        return Ok(Command::PinSubmit {
            user,
            code: PinBuffer::from_code(code)?,
        });
    }

    to_text(text).map(Command::FreeCommand)
}

/// Parse a write to the user id characteristic (raw name, no sigil).
pub fn parse_user_id(raw: &[u8], max_len: usize) -> Result<UserName, ParseError> {
    parse_user_name(decode(raw, max_len)?)
}

/// Parse a write to the cmd characteristic (raw text).
pub fn parse_free_command(raw: &[u8], max_len: usize) -> Result<CommandText, ParseError> {
    to_text(decode(raw, max_len)?)
}

/// Parse a write to the time characteristic.
pub fn parse_unix_time(raw: &[u8]) -> Result<u64, ParseError> {
    let text = decode(raw, MAX_TIME_LEN)?;
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidTime);
    }
    text.parse().map_err(|_| ParseError::InvalidTime)
}

/// Malformed writes carrying the submit delimiter count as failed attempts.
pub fn is_submit_shaped(raw: &[u8]) -> bool {
    raw.contains(&(SUBMIT_DELIMITER as u8))
}

fn decode(raw: &[u8], max_len: usize) -> Result<&str, ParseError> {
    let max = max_len.min(MAX_INPUT_CAP);
    if raw.len() > max {
        return Err(ParseError::TooLong { len: raw.len(), max });
    }
    let text = core::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;
    let text = text.trim_end_matches(|c| c == '\r' || c == '\n');
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(text)
}

fn parse_user_name(s: &str) -> Result<UserName, ParseError> {
    if s.is_empty() {
        return Err(ParseError::EmptyUser);
    }
    let valid = s.len() <= MAX_USER_LEN
        && s
            .bytes()
            .all(|b| (0x20..=0x7E).contains(&b) && b != SUBMIT_DELIMITER as u8);
    if !valid {
        return Err(ParseError::InvalidUser);
    }
    UserName::try_from(s).map_err(|_| ParseError::InvalidUser)
}

fn to_text(s: &str) -> Result<CommandText, ParseError> {
    CommandText::try_from(s).map_err(|_| ParseError::TooLong {
        len: s.len(),
        max: MAX_INPUT_CAP,
    })
}

// ───────────────────────────────────────────────────────────────
// PinBuffer
// ───────────────────────────────────────────────────────────────

/// Bounded holder for a submitted code. Wiped on clear and on drop.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PinBuffer {
    bytes: heapless::Vec<u8, MAX_INPUT_CAP>,
}

impl PinBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_code(code: &str) -> Result<Self, ParseError> {
        let mut buf = Self::new();
        buf.set(code)?;
        Ok(buf)
    }

    /// Replace the contents with `code`.
    pub fn set(&mut self, code: &str) -> Result<(), ParseError> {
        self.clear();
        self.bytes
            .extend_from_slice(code.as_bytes())
            .map_err(|_| ParseError::TooLong {
                len: code.len(),
                max: MAX_INPUT_CAP,
            })
    }

    pub fn as_str(&self) -> &str {
        // Only ever filled from `&str`.
        core::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.as_mut_slice().zeroize();
        self.bytes.clear();
    }
}

impl Drop for PinBuffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for PinBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinBuffer(<{} bytes>)", self.bytes.len())
    }
}
