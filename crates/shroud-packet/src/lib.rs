//! Shroud Packet: the header-plus-payload format carried over an established channel
//!
//! Fixed-layout, big-endian encoding of protocol id, address families, ports,
//! payload length and 4- or 16-byte addresses, followed by the payload.

/// Packet codec errors
pub mod error;
/// Packet header
pub mod header;
/// Header plus payload
pub mod packet;
/// Protocol and address-type enums
pub mod types;

pub use error::{PacketError, Result};
pub use header::{PacketHeader, FIXED_HEADER_LEN};
pub use packet::Packet;
pub use types::{AddressType, Protocol};
