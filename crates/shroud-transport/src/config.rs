//! Connection configuration
//!
//! Loaded from TOML or built in code; both peers must agree on the key
//! exchange and key derivation.

use crate::{Result, TransportError};
use serde::{Deserialize, Serialize};
use shroud_crypto::{KeyDerivation, KeyExchangeKind};
use std::path::Path;
use std::time::Duration;

/// Default per-operation deadline
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default bound on a whole handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Default raw read scratch size
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Default cap on one inbound container
pub const DEFAULT_MAX_CONTAINER_SIZE: usize = 64 * 1024 * 1024;

/// Settings for one encrypted connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Deadline applied to every socket read and write, in milliseconds
    pub timeout_ms: u64,

    /// Deadline for the whole handshake, however the peer paces its bytes
    pub handshake_timeout_ms: u64,

    /// Bytes requested from the socket per raw read
    pub read_chunk_size: usize,

    /// Largest inbound container accepted
    pub max_container_size: usize,

    /// Ephemeral key-exchange variant
    pub key_exchange: KeyExchangeKind,

    /// Shared secret to session key schedule
    pub key_derivation: KeyDerivation,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_container_size: DEFAULT_MAX_CONTAINER_SIZE,
            key_exchange: KeyExchangeKind::default(),
            key_derivation: KeyDerivation::default(),
        }
    }
}

impl ConnectionConfig {
    /// Short deadlines for tests
    pub fn testing() -> Self {
        Self {
            timeout_ms: 2_000,
            handshake_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    /// Parse from a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| TransportError::InvalidConfig(format!("toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TransportError::InvalidConfig(format!("read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Set the per-operation deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the overall handshake deadline
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the key exchange variant
    pub fn with_key_exchange(mut self, kind: KeyExchangeKind) -> Self {
        self.key_exchange = kind;
        self
    }

    /// Set the key derivation
    pub fn with_key_derivation(mut self, kdf: KeyDerivation) -> Self {
        self.key_derivation = kdf;
        self
    }

    /// Per-operation deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Overall handshake deadline
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Check the settings for consistency
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "handshake_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(TransportError::InvalidConfig(
                "read_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.max_container_size < shroud_crypto::container::HEADER_LEN {
            return Err(TransportError::InvalidConfig(
                "max_container_size cannot hold a container header".to_string(),
            ));
        }
        if !self.key_exchange.supports(self.key_derivation) {
            return Err(TransportError::InvalidConfig(format!(
                "{} secrets are not a valid AES key length; use hkdf-sha256",
                self.key_exchange
            )));
        }
        Ok(())
    }
}
