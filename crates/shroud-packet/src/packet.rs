//! Header plus payload

use crate::{PacketError, PacketHeader, Protocol, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::SocketAddr;

/// A tunneled packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    payload: Bytes,
}

impl Packet {
    /// Build a packet, filling the header length from the payload
    pub fn new(
        protocol: Protocol,
        src: SocketAddr,
        dst: SocketAddr,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        let length = u32::try_from(payload.len()).map_err(|_| PacketError::LengthMismatch {
            declared: u32::MAX,
            actual: payload.len(),
        })?;
        Ok(Self {
            header: PacketHeader::new(protocol, src, dst, length),
            payload,
        })
    }

    /// Pair an existing header with its payload
    pub fn from_parts(header: PacketHeader, payload: Bytes) -> Result<Self> {
        if header.length as usize != payload.len() {
            return Err(PacketError::LengthMismatch {
                declared: header.length,
                actual: payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    /// Packet header
    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    /// Packet payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Split into header and payload
    pub fn into_parts(self) -> (PacketHeader, Bytes) {
        (self.header, self.payload)
    }

    /// Encoded size of header and payload
    pub fn encoded_len(&self) -> usize {
        self.header.encoded_len() + self.payload.len()
    }

    /// Append header then payload to `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.encode(buf);
        buf.put_slice(&self.payload);
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one packet from the front of `buf`
    ///
    /// Consumes exactly the header and `length` payload bytes; anything after
    /// them is left in `buf` for the next packet.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let header = PacketHeader::decode(buf)?;
        let length = header.length as usize;
        if buf.remaining() < length {
            return Err(PacketError::Truncated {
                needed: length,
                available: buf.remaining(),
            });
        }
        let payload = buf.copy_to_bytes(length);
        Ok(Self { header, payload })
    }

    /// Read exactly one packet from a blocking reader
    pub fn read_from<R: std::io::Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let header = PacketHeader::read_from(reader)?;
        let mut payload = vec![0u8; header.length as usize];
        reader.read_exact(&mut payload)?;
        Ok(Self {
            header,
            payload: payload.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn hello() -> Packet {
        Packet::new(
            Protocol::Tcp,
            "192.168.0.1:51312".parse().unwrap(),
            "223.5.5.5:8080".parse().unwrap(),
            &b"Hello"[..],
        )
        .unwrap()
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = hello();
        assert_eq!(packet.header().length, 5);
        let mut bytes = packet.to_bytes();
        assert_eq!(bytes.len(), 11 + 4 + 4 + 5);

        let decoded = Packet::decode(&mut bytes).unwrap();
        assert_eq!(decoded, packet);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_back_to_back_packets() {
        let first = hello();
        let second = Packet::new(
            Protocol::Dns,
            "[::1]:5353".parse().unwrap(),
            "[::1]:53".parse().unwrap(),
            vec![0xab; 40],
        )
        .unwrap();

        let mut buf = BytesMut::new();
        first.encode(&mut buf);
        second.encode(&mut buf);
        let mut buf = buf.freeze();

        assert_eq!(Packet::decode(&mut buf).unwrap(), first);
        assert_eq!(Packet::decode(&mut buf).unwrap(), second);
        assert!(!buf.has_remaining());
    }

    #[test]
    fn test_short_payload_is_truncated() {
        let bytes = hello().to_bytes();
        let err = Packet::decode(&mut &bytes[..bytes.len() - 2]).unwrap_err();
        assert_matches!(
            err,
            PacketError::Truncated {
                needed: 5,
                available: 3
            }
        );
    }

    #[test]
    fn test_from_parts_checks_length() {
        let (header, _) = hello().into_parts();
        assert_matches!(
            Packet::from_parts(header, Bytes::from_static(b"Hi")),
            Err(PacketError::LengthMismatch {
                declared: 5,
                actual: 2
            })
        );
    }

    #[test]
    fn test_read_from_reader() {
        let packet = hello();
        let bytes = packet.to_bytes();
        let mut reader = bytes.as_ref();
        assert_eq!(Packet::read_from(&mut reader).unwrap(), packet);
        assert!(reader.is_empty());
    }
}
