//! Session key schedule
//!
//! `Raw` hands the key-exchange output to the cipher untouched and is what
//! peers speak by default. `HkdfSha256` is opt-in and changes the wire
//! behaviour, so both peers must select it.

use crate::{CryptoError, Result};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// HKDF info string binding derived keys to this protocol
pub const SESSION_KEY_INFO: &[u8] = b"shroud session key v1";

/// Output length of the HKDF schedule (AES-256)
pub const DERIVED_KEY_LEN: usize = 32;

/// How the shared secret becomes the session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyDerivation {
    /// Use the shared secret bytes directly
    #[default]
    Raw,
    /// HKDF-SHA256, no salt, fixed info string, 32-byte output
    HkdfSha256,
}

impl KeyDerivation {
    /// Turn shared secret bytes into cipher key material
    pub fn derive(self, secret: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            KeyDerivation::Raw => Ok(Zeroizing::new(secret.to_vec())),
            KeyDerivation::HkdfSha256 => {
                let hk = Hkdf::<Sha256>::new(None, secret);
                let mut okm = Zeroizing::new(vec![0u8; DERIVED_KEY_LEN]);
                hk.expand(SESSION_KEY_INFO, &mut okm)
                    .map_err(|e| CryptoError::malformed(format!("hkdf expand: {e}")))?;
                Ok(okm)
            }
        }
    }
}

impl KeyDerivation {
    /// Configuration name
    pub const fn as_str(self) -> &'static str {
        match self {
            KeyDerivation::Raw => "raw",
            KeyDerivation::HkdfSha256 => "hkdf-sha256",
        }
    }
}

impl std::fmt::Display for KeyDerivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeyDerivation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "raw" => Ok(KeyDerivation::Raw),
            "hkdf-sha256" | "hkdf" => Ok(KeyDerivation::HkdfSha256),
            other => Err(format!("unknown key derivation: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_is_identity() {
        let secret = [9u8; 32];
        let key = KeyDerivation::Raw.derive(&secret).unwrap();
        assert_eq!(key.as_slice(), &secret);
    }

    #[test]
    fn test_hkdf_is_deterministic_and_fixed_length() {
        let secret = [1u8; 48];
        let a = KeyDerivation::HkdfSha256.derive(&secret).unwrap();
        let b = KeyDerivation::HkdfSha256.derive(&secret).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DERIVED_KEY_LEN);
        assert_ne!(&a[..], &secret[..32]);
    }
}
