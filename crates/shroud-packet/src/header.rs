//! Tunneled packet header
//!
//! ```text
//! protocol:u8  src_type:u8  dst_type:u8  src_port:u16  dst_port:u16  length:u32
//! src_addr: 4 or 16 bytes per src_type
//! dst_addr: 4 or 16 bytes per dst_type
//! ```
//!
//! Addresses are held as [`IpAddr`], so the type bytes always agree with the
//! address they describe.

use crate::{AddressType, PacketError, Protocol, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Bytes before the variable-width addresses
pub const FIXED_HEADER_LEN: usize = 11;

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    /// Payload protocol
    pub protocol: Protocol,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Payload length in bytes
    pub length: u32,
    /// Source address
    pub src_addr: IpAddr,
    /// Destination address
    pub dst_addr: IpAddr,
}

impl PacketHeader {
    /// Header for a flow between two socket addresses
    pub fn new(protocol: Protocol, src: SocketAddr, dst: SocketAddr, length: u32) -> Self {
        Self {
            protocol,
            src_port: src.port(),
            dst_port: dst.port(),
            length,
            src_addr: src.ip(),
            dst_addr: dst.ip(),
        }
    }

    /// Source address family
    pub fn src_addr_type(&self) -> AddressType {
        AddressType::of(&self.src_addr)
    }

    /// Destination address family
    pub fn dst_addr_type(&self) -> AddressType {
        AddressType::of(&self.dst_addr)
    }

    /// Source as a socket address
    pub fn src(&self) -> SocketAddr {
        SocketAddr::new(self.src_addr, self.src_port)
    }

    /// Destination as a socket address
    pub fn dst(&self) -> SocketAddr {
        SocketAddr::new(self.dst_addr, self.dst_port)
    }

    /// Encoded size of this header
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + self.src_addr_type().address_len() + self.dst_addr_type().address_len()
    }

    /// Append the encoded header to `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.protocol.into());
        buf.put_u8(self.src_addr_type().into());
        buf.put_u8(self.dst_addr_type().into());
        buf.put_u16(self.src_port);
        buf.put_u16(self.dst_port);
        buf.put_u32(self.length);
        put_addr(buf, &self.src_addr);
        put_addr(buf, &self.dst_addr);
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a header from the front of `buf`, advancing past it
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure(buf, FIXED_HEADER_LEN)?;
        let protocol = Protocol::try_from(buf.get_u8())?;
        let src_type = AddressType::try_from(buf.get_u8())?;
        let dst_type = AddressType::try_from(buf.get_u8())?;
        let src_port = buf.get_u16();
        let dst_port = buf.get_u16();
        let length = buf.get_u32();

        ensure(buf, src_type.address_len() + dst_type.address_len())?;
        let src_addr = get_addr(buf, src_type);
        let dst_addr = get_addr(buf, dst_type);

        Ok(Self {
            protocol,
            src_port,
            dst_port,
            length,
            src_addr,
            dst_addr,
        })
    }

    /// Read exactly one header from a blocking reader
    pub fn read_from<R: std::io::Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut fixed = [0u8; FIXED_HEADER_LEN];
        reader.read_exact(&mut fixed)?;
        let src_type = AddressType::try_from(fixed[1])?;
        let dst_type = AddressType::try_from(fixed[2])?;

        let mut raw = Vec::with_capacity(FIXED_HEADER_LEN + 32);
        raw.extend_from_slice(&fixed);
        raw.resize(
            FIXED_HEADER_LEN + src_type.address_len() + dst_type.address_len(),
            0,
        );
        reader.read_exact(&mut raw[FIXED_HEADER_LEN..])?;
        Self::decode(&mut raw.as_slice())
    }
}

fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(PacketError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn put_addr<B: BufMut>(buf: &mut B, addr: &IpAddr) {
    match addr {
        IpAddr::V4(v4) => buf.put_slice(&v4.octets()),
        IpAddr::V6(v6) => buf.put_slice(&v6.octets()),
    }
}

fn get_addr<B: Buf>(buf: &mut B, kind: AddressType) -> IpAddr {
    match kind {
        AddressType::Ipv4 => IpAddr::V4(Ipv4Addr::from(buf.get_u32())),
        AddressType::Ipv6 => IpAddr::V6(Ipv6Addr::from(buf.get_u128())),
    }
}
