//! Single-shot authenticated encryption
//!
//! A sealed value is self-contained: `AEAD(plaintext) || nonce`, with a fresh
//! random nonce per call. `open` splits the trailing nonce back off.

use crate::{CryptoError, Result};
use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use std::fmt;

/// GCM nonce length
pub const GCM_NONCE_SIZE: usize = 12;

/// GCM authentication tag length
pub const GCM_TAG_SIZE: usize = 16;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// An AEAD usable as the session cipher
pub trait SessionCipher: Send + Sync {
    /// Nonce length appended to every sealed value
    fn nonce_size(&self) -> usize;

    /// Authentication tag length
    fn tag_size(&self) -> usize;

    /// Encrypt with a fresh nonce; output is `ciphertext || tag || nonce`
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Verify and decrypt a value produced by [`SessionCipher::seal`]
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>>;

    /// Bytes a sealed value adds on top of its plaintext
    fn overhead(&self) -> usize {
        self.nonce_size() + self.tag_size()
    }
}

enum Gcm {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// AES-GCM keyed directly by 16, 24 or 32 bytes of key material
pub struct AesGcmCipher {
    inner: Gcm,
}

impl AesGcmCipher {
    /// Build a cipher from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self> {
        let invalid = |_| CryptoError::InvalidKeyLength { actual: key.len() };
        let inner = match key.len() {
            16 => Gcm::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?),
            24 => Gcm::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?),
            32 => Gcm::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?),
            actual => return Err(CryptoError::InvalidKeyLength { actual }),
        };
        Ok(Self { inner })
    }

    /// AES key size in bits
    pub fn key_bits(&self) -> usize {
        match self.inner {
            Gcm::Aes128(_) => 128,
            Gcm::Aes192(_) => 192,
            Gcm::Aes256(_) => 256,
        }
    }

    fn encrypt(&self, nonce: &[u8; GCM_NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::<U12>::from_slice(nonce);
        let sealed = match &self.inner {
            Gcm::Aes128(c) => c.encrypt(nonce, plaintext),
            Gcm::Aes192(c) => c.encrypt(nonce, plaintext),
            Gcm::Aes256(c) => c.encrypt(nonce, plaintext),
        };
        // GCM only refuses plaintexts beyond its 64 GiB limit
        sealed.map_err(|_| CryptoError::malformed("plaintext exceeds AES-GCM limit"))
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::<U12>::from_slice(nonce);
        let opened = match &self.inner {
            Gcm::Aes128(c) => c.decrypt(nonce, ciphertext),
            Gcm::Aes192(c) => c.decrypt(nonce, ciphertext),
            Gcm::Aes256(c) => c.decrypt(nonce, ciphertext),
        };
        opened.map_err(|_| CryptoError::AuthFailed)
    }
}

impl SessionCipher for AesGcmCipher {
    fn nonce_size(&self) -> usize {
        GCM_NONCE_SIZE
    }

    fn tag_size(&self) -> usize {
        GCM_TAG_SIZE
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; GCM_NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;

        let mut sealed = self.encrypt(&nonce, plaintext)?;
        sealed.extend_from_slice(&nonce);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < GCM_NONCE_SIZE + GCM_TAG_SIZE {
            return Err(CryptoError::malformed(format!(
                "sealed value of {} bytes is shorter than nonce and tag",
                sealed.len()
            )));
        }
        let (ciphertext, nonce) = sealed.split_at(sealed.len() - GCM_NONCE_SIZE);
        self.decrypt(nonce, ciphertext)
    }
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AesGcmCipher(aes-{}-gcm)", self.key_bits())
    }
}
