//! Crypto errors for key exchange, sealing and container decoding

use thiserror::Error;

/// Errors raised by the cryptographic layer
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material has a length the algorithm cannot use
    #[error("invalid key length: {actual} bytes")]
    InvalidKeyLength {
        /// Length that was supplied
        actual: usize,
    },

    /// Peer public key does not decode to a usable curve point
    #[error("invalid curve point")]
    InvalidPoint,

    /// Block nonce length differs from the container's fixed nonce size
    #[error("nonce size mismatch: container uses {expected} bytes, got {actual}")]
    NonceSizeMismatch {
        /// Nonce size fixed by the first appended block
        expected: usize,
        /// Nonce size of the rejected block
        actual: usize,
    },

    /// AEAD tag verification failed
    #[error("authentication failed")]
    AuthFailed,

    /// Structurally invalid input (truncated sealed value, oversized container)
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Random number generator failure
    #[error("random source failed: {0}")]
    Rng(String),

    /// Underlying reader or writer failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Create a malformed-input error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// True if this is an AEAD authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailed)
    }

    /// True if the error came from a reader hitting end of input early
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

/// Result alias for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CryptoError::NonceSizeMismatch {
            expected: 12,
            actual: 8,
        };
        assert_eq!(
            err.to_string(),
            "nonce size mismatch: container uses 12 bytes, got 8"
        );
        assert!(CryptoError::AuthFailed.is_auth_failure());
    }

    #[test]
    fn test_unexpected_eof_detection() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        assert!(CryptoError::from(io).is_unexpected_eof());
        assert!(!CryptoError::InvalidPoint.is_unexpected_eof());
    }
}
