//! Property Tests: Packet Header Codec
//!
//! Any header survives encode/decode with the address width chosen by its
//! address-type byte; undefined enum bytes are always rejected.

use proptest::prelude::*;
use shroud_packet::{AddressType, Packet, PacketError, PacketHeader, Protocol};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

fn protocol() -> impl Strategy<Value = Protocol> {
    prop::sample::select(Protocol::ALL.to_vec())
}

fn ip() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<u32>().prop_map(|v| IpAddr::V4(Ipv4Addr::from(v))),
        any::<u128>().prop_map(|v| IpAddr::V6(Ipv6Addr::from(v))),
    ]
}

fn header() -> impl Strategy<Value = PacketHeader> {
    (protocol(), any::<u16>(), any::<u16>(), any::<u32>(), ip(), ip()).prop_map(
        |(protocol, src_port, dst_port, length, src_addr, dst_addr)| PacketHeader {
            protocol,
            src_port,
            dst_port,
            length,
            src_addr,
            dst_addr,
        },
    )
}

proptest! {
    #[test]
    fn header_roundtrip(h in header()) {
        let bytes = h.to_bytes();
        prop_assert_eq!(bytes.len(), h.encoded_len());
        prop_assert_eq!(bytes[1], u8::from(h.src_addr_type()));
        prop_assert_eq!(bytes[2], u8::from(h.dst_addr_type()));

        let decoded = PacketHeader::decode(&mut bytes.as_ref()).unwrap();
        prop_assert_eq!(decoded, h);
    }

    #[test]
    fn undefined_protocol_rejected(h in header(), value in 5u8..) {
        let mut bytes = h.to_bytes().to_vec();
        bytes[0] = value;
        let rejected = matches!(
            PacketHeader::decode(&mut bytes.as_slice()),
            Err(PacketError::InvalidEnumValue { field: "protocol", .. })
        );
        prop_assert!(rejected);
    }

    #[test]
    fn packet_roundtrip(
        h in header(),
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let packet = Packet::new(h.protocol, h.src(), h.dst(), payload.clone()).unwrap();
        let bytes = packet.to_bytes();
        let decoded = Packet::decode(&mut bytes.as_ref()).unwrap();
        prop_assert_eq!(decoded.payload().as_ref(), payload.as_slice());
        prop_assert_eq!(decoded.header().length as usize, payload.len());
    }
}

#[test]
fn tcp_ipv4_to_ipv6_header_roundtrip() {
    let header = PacketHeader {
        protocol: Protocol::Tcp,
        src_port: 51312,
        dst_port: 443,
        length: 1200,
        src_addr: "10.0.0.2".parse().unwrap(),
        dst_addr: "2001:db8::1".parse().unwrap(),
    };
    let bytes = header.to_bytes();
    assert_eq!(bytes.len(), 11 + 4 + 16);

    let decoded = PacketHeader::decode(&mut bytes.as_ref()).unwrap();
    assert_eq!(decoded, header);
    assert_eq!(decoded.src_addr_type(), AddressType::Ipv4);
    assert_eq!(decoded.dst_addr_type(), AddressType::Ipv6);
}
