//! Shroud Crypto: ephemeral key exchange and chunked authenticated encryption
//!
//! ## Core Components
//!
//! - **Key exchange**: X25519 fast path and named-curve ECDH behind one
//!   [`KeyExchangeKind`] factory
//! - **Session cipher**: AES-GCM single-shot seal/open with a trailing nonce
//! - **Stream container**: self-describing list of independently sealed blocks
//! - **Stream sealing**: chunked seal/open driving the container over
//!   `std::io` readers and writers

/// Single-shot AEAD sealing
pub mod cipher;
/// Stream container wire format
pub mod container;
/// Crypto error type
pub mod error;
/// Session key schedule
pub mod kdf;
/// Ephemeral Diffie-Hellman
pub mod key_exchange;
/// Chunked stream seal/open
pub mod stream;

pub use cipher::{AesGcmCipher, SessionCipher, GCM_NONCE_SIZE, GCM_TAG_SIZE};
pub use container::{Block, StreamContainer, DEFAULT_DECODE_LIMIT, MAX_NONCE_SIZE};
pub use error::{CryptoError, Result};
pub use kdf::KeyDerivation;
pub use key_exchange::{
    clamp_scalar, EphemeralKeyPair, KeyExchangeKind, NamedCurve, PeerPublicKey, SharedSecret,
    X25519_KEY_LEN,
};
pub use stream::{open_container, open_stream, seal_stream, seal_stream_chunked, STREAM_CHUNK_SIZE};
