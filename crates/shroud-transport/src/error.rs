//! Transport errors
//!
//! Every handshake error is fatal to its connection: the caller closes it and,
//! if it wants to retry, dials a new connection with new ephemeral keys.

use shroud_crypto::CryptoError;
use thiserror::Error;

/// Errors raised by connections and the handshake
#[derive(Error, Debug)]
pub enum TransportError {
    /// Key exchange, sealing or container decoding failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Peer sent a public key of the wrong length
    #[error("invalid peer key: expected {expected} bytes, got {actual}")]
    InvalidPeerKey {
        /// Length the configured key exchange requires
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Confirmation token decrypted but did not match
    #[error("handshake verification failed")]
    HandshakeVerifyFailed,

    /// No byte transfer completed within the deadline
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Peer closed the stream
    #[error("end of stream")]
    EndOfStream,

    /// Connection was closed locally
    #[error("connection closed")]
    Closed,

    /// Encrypted I/O attempted before the handshake finished
    #[error("connection not established")]
    NotEstablished,

    /// Handshake already ran on this connection
    #[error("handshake already attempted (state: {0})")]
    HandshakeAttempted(&'static str),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True for deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True if an AEAD tag failed to verify
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Crypto(e) if e.is_auth_failure())
    }

    /// True if the peer went away
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Self::EndOfStream => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Result alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(TransportError::Timeout("read").is_timeout());
        assert!(TransportError::from(CryptoError::AuthFailed).is_auth_failure());
        assert!(!TransportError::HandshakeVerifyFailed.is_auth_failure());
        assert!(TransportError::EndOfStream.is_end_of_stream());
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(TransportError::from(reset).is_end_of_stream());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransportError::Timeout("read").to_string(), "read timed out");
        assert_eq!(
            TransportError::InvalidPeerKey {
                expected: 32,
                actual: 31
            }
            .to_string(),
            "invalid peer key: expected 32 bytes, got 31"
        );
    }
}
