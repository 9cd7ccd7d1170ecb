//! HOTP / TOTP code derivation (RFC 4226, RFC 6238).
//!
//! `HMAC(key, counter_be64)` → dynamic truncation → `mod 10^digits`,
//! rendered zero-padded to exactly `digits` characters.
//!
//! SHA-1 goes through the RustCrypto `hmac` + `sha1` pair, SHA-256
//! through `hmac-sha256`. Both are pure Rust and identical on ESP-IDF
//! and host targets.

use core::fmt::Write;

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::config::OtpAlgorithm;

/// Longest code we ever render (RFC 4226 Appendix E allows 9 digits).
pub const MAX_DIGITS: usize = 9;

/// A rendered, zero-padded decimal code.
pub type OtpCode = heapless::String<MAX_DIGITS>;

/// Compute the numeric HOTP value for `counter`.
///
/// Returns `None` only if the HMAC backend rejects the key, which does not
/// happen for HMAC (any key length is valid).
pub fn hotp_value(algorithm: OtpAlgorithm, key: &[u8], counter: u64, digits: u8) -> Option<u32> {
    let msg = counter.to_be_bytes();
    let truncated = match algorithm {
        OtpAlgorithm::Sha1 => {
            let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key).ok()?;
            mac.update(&msg);
            dynamic_truncate(&mac.finalize().into_bytes())
        }
        OtpAlgorithm::Sha256 => dynamic_truncate(&hmac_sha256::HMAC::mac(msg, key)),
    };
    Some(truncated % 10u32.pow(u32::from(digits)))
}

/// Render the HOTP code for `counter` as a zero-padded string.
pub fn hotp(algorithm: OtpAlgorithm, key: &[u8], counter: u64, digits: u8) -> Option<OtpCode> {
    hotp_value(algorithm, key, counter, digits).and_then(|v| render(v, digits))
}

/// Time step containing `unix_secs`.
pub fn time_step(unix_secs: u64, period_secs: u32) -> u64 {
    unix_secs / u64::from(period_secs.max(1))
}

/// Render the TOTP code valid at `unix_secs`.
pub fn totp(
    algorithm: OtpAlgorithm,
    key: &[u8],
    unix_secs: u64,
    period_secs: u32,
    digits: u8,
) -> Option<OtpCode> {
    hotp(algorithm, key, time_step(unix_secs, period_secs), digits)
}

/// Left-pad `value` with zeros to `digits` characters.
pub fn render(value: u32, digits: u8) -> Option<OtpCode> {
    let mut code = OtpCode::new();
    write!(code, "{:0width$}", value, width = digits as usize).ok()?;
    Some(code)
}

// RFC 4226 §5.3: the low nibble of the last byte picks a 4-byte window.
fn dynamic_truncate(digest: &[u8]) -> u32 {
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ])
}
