//! Fuzz target: validation surface.
//!
//! The first byte picks the mode, the next eight the HOTP counter, and the
//! rest is split into a secret and a submitted code. The validator must
//! never panic, and an accepted HOTP code must advance the counter.

#![no_main]

use blepinpad::auth::{OtpState, OtpValidator, SecretStore, ValidationOutcome};
use blepinpad::config::{OtpAlgorithm, SecurityMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 10 {
        return;
    }
    let mode = match data[0] % 3 {
        0 => SecurityMode::None,
        1 => SecurityMode::Hotp,
        _ => SecurityMode::Totp,
    };
    let mut counter = [0u8; 8];
    counter.copy_from_slice(&data[1..9]);
    let state = OtpState::new(u64::from_le_bytes(counter));

    let rest = &data[9..];
    let split = rest.len() / 2;
    let (Ok(secret), Ok(code)) = (
        core::str::from_utf8(&rest[..split]),
        core::str::from_utf8(&rest[split..]),
    ) else {
        return;
    };
    let Ok(store) = SecretStore::new(mode, secret) else {
        return;
    };

    let algorithm = if data[0] & 0x80 == 0 {
        OtpAlgorithm::Sha1
    } else {
        OtpAlgorithm::Sha256
    };
    let validator = OtpValidator::new(algorithm, 6, 10, 30, 1);
    let now = Some(u64::from(data[1]) * 1_000_000);

    if let ValidationOutcome::Accepted { next } = validator.validate(&store, code, state, now) {
        if mode == SecurityMode::Hotp {
            assert!(next.counter > state.counter);
        }
    }
});
