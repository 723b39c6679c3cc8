//! Property Tests: Sealing and Stream Container
//!
//! Round-trip, tamper detection and nonce-size invariants for the session
//! cipher and the stream container format.

use proptest::prelude::*;
use shroud_crypto::{
    open_stream, seal_stream_chunked, AesGcmCipher, CryptoError, SessionCipher, StreamContainer,
};

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 16),
        prop::collection::vec(any::<u8>(), 24),
        prop::collection::vec(any::<u8>(), 32),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn seal_then_open_returns_plaintext(
        key in key_strategy(),
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let cipher = AesGcmCipher::new(&key).unwrap();
        let sealed = cipher.seal(&plaintext).unwrap();
        prop_assert_eq!(sealed.len(), plaintext.len() + cipher.overhead());
        prop_assert_eq!(cipher.open(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn any_bit_flip_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let cipher = AesGcmCipher::new(&[0x42; 32]).unwrap();
        let mut sealed = cipher.seal(&plaintext).unwrap();
        // ciphertext and tag only, the trailing nonce is covered separately
        let body_len = sealed.len() - cipher.nonce_size();
        let idx = position.index(body_len);
        sealed[idx] ^= 1 << bit;

        let result = cipher.open(&sealed);
        prop_assert!(matches!(result, Err(CryptoError::AuthFailed)));
    }

    #[test]
    fn nonce_bit_flip_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 0..64),
        position in 0usize..12,
    ) {
        let cipher = AesGcmCipher::new(&[0x42; 32]).unwrap();
        let mut sealed = cipher.seal(&plaintext).unwrap();
        let idx = sealed.len() - 12 + position;
        sealed[idx] ^= 0x80;
        prop_assert!(matches!(cipher.open(&sealed), Err(CryptoError::AuthFailed)));
    }

    #[test]
    fn container_roundtrip_preserves_blocks(
        nonce_size in 0usize..32,
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..128), 0..16),
    ) {
        let mut container = StreamContainer::new();
        let mut nonces = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            let nonce = vec![i as u8; nonce_size];
            container.append(&nonce, payload).unwrap();
            nonces.push(nonce);
        }

        let bytes = container.to_bytes();
        prop_assert_eq!(bytes.len(), container.encoded_len());
        prop_assert_eq!(
            StreamContainer::peek_encoded_len(&bytes).unwrap(),
            Some(bytes.len())
        );

        let decoded = StreamContainer::decode(&mut bytes.as_slice()).unwrap();
        prop_assert_eq!(decoded.len(), payloads.len());
        for (i, (nonce, payload)) in decoded.iter().enumerate() {
            prop_assert_eq!(nonce, nonces[i].as_slice());
            prop_assert_eq!(payload, payloads[i].as_slice());
        }
    }

    #[test]
    fn mismatched_nonce_leaves_container_unchanged(
        first in 1usize..24,
        second in 1usize..24,
    ) {
        prop_assume!(first != second);
        let mut container = StreamContainer::new();
        container.append(&vec![0; first], b"a").unwrap();
        let before = container.clone();

        let err = container.append(&vec![0; second], b"b").unwrap_err();
        let is_mismatch = matches!(
            err,
            CryptoError::NonceSizeMismatch { expected, actual }
                if expected == first && actual == second
        );
        prop_assert!(is_mismatch);
        prop_assert_eq!(container, before);
    }

    #[test]
    fn stream_roundtrip_any_chunking(
        data in prop::collection::vec(any::<u8>(), 0..4096),
        chunk in 1usize..512,
    ) {
        let cipher = AesGcmCipher::new(&[9; 32]).unwrap();
        let mut wire = Vec::new();
        let consumed =
            seal_stream_chunked(&cipher, &mut data.as_slice(), &mut wire, chunk).unwrap();
        prop_assert_eq!(consumed as usize, data.len());

        let mut out = Vec::new();
        open_stream(&cipher, &mut wire.as_slice(), &mut out).unwrap();
        prop_assert_eq!(out, data);
    }
}
