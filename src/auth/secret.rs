//! Immutable holder for the configured security mode and secret material.
//!
//! The secret bytes are only reachable through [`SecretStore::secret_bytes`],
//! which is `pub(crate)` so only the validator can see them. The buffer is
//! wiped on drop and `Debug` never prints it.

use core::fmt;

use zeroize::Zeroizing;

use crate::config::SecurityMode;
use crate::error::ConfigError;

pub struct SecretStore {
    mode: SecurityMode,
    secret: Zeroizing<Vec<u8>>,
}

impl SecretStore {
    /// Build the store, enforcing the configuration-time secret rules.
    ///
    /// - OTP modes require a non-empty secret.
    /// - Every byte must be ASCII.
    pub fn new(mode: SecurityMode, secret: &str) -> Result<Self, ConfigError> {
        if !secret.is_ascii() {
            return Err(ConfigError::NonAsciiSecret);
        }
        if mode.requires_secret() && secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        Ok(Self {
            mode,
            secret: Zeroizing::new(secret.as_bytes().to_vec()),
        })
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub(crate) fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }

    /// Secret length in bytes. Safe to log.
    pub fn secret_len(&self) -> usize {
        self.secret.len()
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("mode", &self.mode)
            .field("secret", &"<redacted>")
            .finish()
    }
}
