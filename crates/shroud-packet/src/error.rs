//! Packet codec errors

use thiserror::Error;

/// Errors raised while encoding or decoding tunneled packets
#[derive(Debug, Error)]
pub enum PacketError {
    /// A one-byte enum field carried an undefined value
    #[error("invalid {field} value: {value}")]
    InvalidEnumValue {
        /// Field name
        field: &'static str,
        /// Offending byte
        value: u8,
    },

    /// Input ended before the field or payload was complete
    #[error("truncated packet: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to continue
        needed: usize,
        /// Bytes remaining
        available: usize,
    },

    /// Header length does not match the attached payload
    #[error("length field {declared} does not match payload of {actual} bytes")]
    LengthMismatch {
        /// Value of the length field
        declared: u32,
        /// Actual payload size
        actual: usize,
    },

    /// Underlying reader or writer failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for packet operations
pub type Result<T> = std::result::Result<T, PacketError>;
