//! PIN / OTP validation.
//!
//! [`OtpValidator::validate`] is the single security decision of the
//! component. Both outcomes are successful completions: `Rejected` is not an
//! error and never says *why* a code failed.
//!
//! Comparisons go through `subtle::ConstantTimeEq`. A length mismatch is
//! rejected up front (lengths are not secret); equal-length buffers are
//! compared without early exit. OTP windows are always walked to the end
//! so the amount of work does not depend on where a match sits.

use log::debug;
use subtle::ConstantTimeEq;

use crate::auth::otp::{self, OtpCode};
use crate::auth::secret::SecretStore;
use crate::config::{OtpAlgorithm, PinpadConfig, SecurityMode};

/// Persistent HOTP moving factor. Only advanced by an accepted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtpState {
    pub counter: u64,
}

impl OtpState {
    pub fn new(counter: u64) -> Self {
        Self { counter }
    }
}

/// Result of one validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// `next` is the state to persist. Equal to the input for `none`/`totp`.
    Accepted { next: OtpState },
    Rejected,
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Validator parameters, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct OtpValidator {
    algorithm: OtpAlgorithm,
    digits: u8,
    hotp_window: u32,
    totp_period_secs: u32,
    totp_skew_steps: u32,
}

impl OtpValidator {
    pub fn new(
        algorithm: OtpAlgorithm,
        digits: u8,
        hotp_window: u32,
        totp_period_secs: u32,
        totp_skew_steps: u32,
    ) -> Self {
        Self {
            algorithm,
            digits,
            hotp_window,
            totp_period_secs,
            totp_skew_steps,
        }
    }

    pub fn from_config(config: &PinpadConfig) -> Self {
        Self::new(
            config.otp_algorithm,
            config.otp_digits,
            config.hotp_window,
            config.totp_period_secs,
            config.totp_skew_steps,
        )
    }

    pub fn digits(&self) -> u8 {
        self.digits
    }

    /// Check `submitted` against the configured secret.
    ///
    /// `unix_secs` is only consulted in TOTP mode; `None` (wall clock not
    /// synced) rejects every TOTP code.
    pub fn validate(
        &self,
        secret: &SecretStore,
        submitted: &str,
        state: OtpState,
        unix_secs: Option<u64>,
    ) -> ValidationOutcome {
        match secret.mode() {
            SecurityMode::None => {
                if constant_time_eq(submitted.as_bytes(), secret.secret_bytes()) {
                    ValidationOutcome::Accepted { next: state }
                } else {
                    ValidationOutcome::Rejected
                }
            }
            SecurityMode::Hotp => self.validate_hotp(secret.secret_bytes(), submitted, state),
            SecurityMode::Totp => match unix_secs {
                Some(now) => self.validate_totp(secret.secret_bytes(), submitted, state, now),
                None => {
                    debug!("otp: wall clock not synced, TOTP unavailable");
                    ValidationOutcome::Rejected
                }
            },
        }
    }

    fn validate_hotp(&self, key: &[u8], submitted: &str, state: OtpState) -> ValidationOutcome {
        let Some(code) = normalize_code(submitted, self.digits) else {
            return ValidationOutcome::Rejected;
        };

        let mut matched: Option<u64> = None;
        for offset in 0..=u64::from(self.hotp_window) {
            let Some(counter) = state.counter.checked_add(offset) else {
                break;
            };
            let hit = otp::hotp(self.algorithm, key, counter, self.digits)
                .is_some_and(|candidate| constant_time_eq(candidate.as_bytes(), code.as_bytes()));
            if hit && matched.is_none() {
                matched = Some(counter);
            }
        }

        // A match on the last counter has no successor to move to.
        match matched.and_then(|counter| counter.checked_add(1)) {
            Some(next) => ValidationOutcome::Accepted {
                next: OtpState::new(next),
            },
            None => ValidationOutcome::Rejected,
        }
    }

    fn validate_totp(
        &self,
        key: &[u8],
        submitted: &str,
        state: OtpState,
        unix_secs: u64,
    ) -> ValidationOutcome {
        let Some(code) = normalize_code(submitted, self.digits) else {
            return ValidationOutcome::Rejected;
        };

        let current = otp::time_step(unix_secs, self.totp_period_secs);
        let skew = u64::from(self.totp_skew_steps);
        let first = current.saturating_sub(skew);
        let last = current.saturating_add(skew);

        let mut hit = false;
        for step in first..=last {
            let eq = otp::hotp(self.algorithm, key, step, self.digits)
                .is_some_and(|candidate| constant_time_eq(candidate.as_bytes(), code.as_bytes()));
            hit |= eq;
        }

        if hit {
            ValidationOutcome::Accepted { next: state }
        } else {
            ValidationOutcome::Rejected
        }
    }
}

/// Length check first, then a non-short-circuiting byte compare.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Accept 1..=`digits` ASCII digits and left-pad them with zeros.
///
/// Clients that render the code as an integer drop leading zeros; padding
/// here makes `81804` and `081804` equivalent for a 6-digit code.
fn normalize_code(submitted: &str, digits: u8) -> Option<OtpCode> {
    let bytes = submitted.as_bytes();
    if bytes.is_empty() || bytes.len() > digits as usize || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let mut code = OtpCode::new();
    for _ in bytes.len()..digits as usize {
        code.push('0').ok()?;
    }
    code.push_str(submitted).ok()?;
    Some(code)
}
