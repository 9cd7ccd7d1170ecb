//! Security core: secret material, OTP derivation and the validator.
//!
//! Nothing in here performs I/O. The HOTP counter is handed in and out as
//! an [`OtpState`](validator::OtpState); persisting it is the caller's job.

pub mod otp;
pub mod secret;
pub mod validator;

pub use secret::SecretStore;
pub use validator::{OtpState, OtpValidator, ValidationOutcome};
