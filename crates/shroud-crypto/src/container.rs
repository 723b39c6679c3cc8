//! Stream container: an ordered list of independently sealed blocks
//!
//! Wire layout, all integers big-endian:
//!
//! ```text
//! header       nonce_size:u32  block_count:u32
//! block info   size:u32  nonce[nonce_size]        (block_count times)
//! payloads     payload[size]                      (block_count times, in order)
//! ```
//!
//! Decoding is not incremental: the whole container is materialized before
//! any block can be visited.

use crate::{CryptoError, Result};
use std::io::{Read, Write};

/// Length of the fixed container header
pub const HEADER_LEN: usize = 8;

/// Length of the size field in each block info record
const BLOCK_SIZE_LEN: usize = 4;

/// Cap on speculative preallocation while decoding untrusted counts
const MAX_PREALLOCATED_BLOCKS: usize = 1024;

/// Largest nonce a container may carry
pub const MAX_NONCE_SIZE: usize = 64;

/// Encoded size [`StreamContainer::decode`] accepts; larger input needs
/// [`StreamContainer::decode_with_limit`]
pub const DEFAULT_DECODE_LIMIT: usize = 64 * 1024 * 1024;

/// One sealed block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    nonce: Vec<u8>,
    payload: Vec<u8>,
}

impl Block {
    /// Nonce this block was sealed with
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Sealed payload (ciphertext and tag)
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload size as carried in the block info record
    pub fn size(&self) -> u32 {
        // append() refuses payloads that do not fit
        self.payload.len() as u32
    }
}

/// Ordered sequence of (nonce, payload) blocks sharing one nonce length
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamContainer {
    nonce_size: Option<usize>,
    blocks: Vec<Block>,
}

impl StreamContainer {
    /// Empty container; the first append fixes its nonce size
    pub fn new() -> Self {
        Self::default()
    }

    /// Nonce size shared by every block, zero while empty
    pub fn nonce_size(&self) -> usize {
        self.nonce_size.unwrap_or(0)
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True if no block was appended
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in append order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Iterate `(nonce, payload)` pairs in append order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.blocks.iter().map(|b| (b.nonce(), b.payload()))
    }

    /// Append a block
    ///
    /// Rejects a nonce whose length differs from the first block's with
    /// `NonceSizeMismatch`, leaving the container unchanged.
    pub fn append(&mut self, nonce: &[u8], payload: &[u8]) -> Result<()> {
        if let Some(expected) = self.nonce_size {
            if nonce.len() != expected {
                return Err(CryptoError::NonceSizeMismatch {
                    expected,
                    actual: nonce.len(),
                });
            }
        }
        if nonce.len() > MAX_NONCE_SIZE {
            return Err(CryptoError::malformed(format!(
                "nonce of {} bytes exceeds {MAX_NONCE_SIZE}",
                nonce.len()
            )));
        }
        if u32::try_from(nonce.len()).is_err() || u32::try_from(payload.len()).is_err() {
            return Err(CryptoError::malformed("block does not fit a u32 size field"));
        }
        if self.blocks.len() >= u32::MAX as usize {
            return Err(CryptoError::malformed("container block count overflow"));
        }

        self.nonce_size = Some(nonce.len());
        self.blocks.push(Block {
            nonce: nonce.to_vec(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    /// Call `visit` once per block in order, stopping at the first error
    pub fn visit<F, E>(&self, mut visit: F) -> std::result::Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> std::result::Result<(), E>,
    {
        for block in &self.blocks {
            visit(block.nonce(), block.payload())?;
        }
        Ok(())
    }

    /// Exact number of bytes [`StreamContainer::encode`] will write
    pub fn encoded_len(&self) -> usize {
        let infos = self.blocks.len() * (BLOCK_SIZE_LEN + self.nonce_size());
        let payloads: usize = self.blocks.iter().map(|b| b.payload.len()).sum();
        HEADER_LEN + infos + payloads
    }

    /// Write header, every block info record, then every payload
    pub fn encode<W: Write + ?Sized>(&self, sink: &mut W) -> Result<()> {
        let mut head = Vec::with_capacity(
            HEADER_LEN + self.blocks.len() * (BLOCK_SIZE_LEN + self.nonce_size()),
        );
        self.put_head(&mut head);
        sink.write_all(&head)?;

        for block in &self.blocks {
            sink.write_all(&block.payload)?;
        }
        Ok(())
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.put_head(&mut out);
        for block in &self.blocks {
            out.extend_from_slice(&block.payload);
        }
        out
    }

    /// Header followed by every block info record
    fn put_head(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.nonce_size() as u32).to_be_bytes());
        out.extend_from_slice(&(self.blocks.len() as u32).to_be_bytes());
        for block in &self.blocks {
            out.extend_from_slice(&block.size().to_be_bytes());
            out.extend_from_slice(&block.nonce);
        }
    }

    /// Decode a whole container of at most [`DEFAULT_DECODE_LIMIT`] bytes
    pub fn decode<R: Read + ?Sized>(source: &mut R) -> Result<Self> {
        Self::decode_with_limit(source, DEFAULT_DECODE_LIMIT)
    }

    /// Decode a whole container, refusing one whose encoding exceeds `max_len`
    ///
    /// Every field is read to its exact length; a short read is retried and a
    /// premature end of input surfaces as an `UnexpectedEof` I/O error.
    pub fn decode_with_limit<R: Read + ?Sized>(source: &mut R, max_len: usize) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        source.read_exact(&mut header)?;
        let (nonce_size, block_count) = parse_header(&header)?;

        let info_len = (BLOCK_SIZE_LEN as u64 + nonce_size as u64) * block_count as u64;
        let mut total = HEADER_LEN as u64 + info_len;
        check_limit(total, max_len)?;

        let mut infos = Vec::with_capacity(block_count.min(MAX_PREALLOCATED_BLOCKS));
        let mut size_field = [0u8; BLOCK_SIZE_LEN];
        for _ in 0..block_count {
            source.read_exact(&mut size_field)?;
            let size = u32::from_be_bytes(size_field);
            let mut nonce = vec![0u8; nonce_size];
            source.read_exact(&mut nonce)?;

            total += size as u64;
            check_limit(total, max_len)?;
            infos.push((size as usize, nonce));
        }

        let mut blocks = Vec::with_capacity(infos.len());
        for (size, nonce) in infos {
            let mut payload = vec![0u8; size];
            source.read_exact(&mut payload)?;
            blocks.push(Block { nonce, payload });
        }

        Ok(Self {
            nonce_size: (block_count > 0).then_some(nonce_size),
            blocks,
        })
    }

    /// Total encoded length of the container at the front of `prefix`
    ///
    /// Returns `Ok(None)` until the header and every block info record are
    /// present. The payload bytes themselves need not have arrived yet.
    pub fn peek_encoded_len(prefix: &[u8]) -> Result<Option<usize>> {
        let Some(header) = prefix.get(..HEADER_LEN) else {
            return Ok(None);
        };
        let mut fixed = [0u8; HEADER_LEN];
        fixed.copy_from_slice(header);
        let (nonce_size, block_count) = parse_header(&fixed)?;

        let record_len = BLOCK_SIZE_LEN
            .checked_add(nonce_size)
            .ok_or_else(|| CryptoError::malformed("nonce size overflow"))?;
        let info_end = record_len
            .checked_mul(block_count)
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| CryptoError::malformed("block info overflow"))?;
        if prefix.len() < info_end {
            return Ok(None);
        }

        let mut total = info_end;
        for record in prefix[HEADER_LEN..info_end].chunks_exact(record_len) {
            let size = u32::from_be_bytes([record[0], record[1], record[2], record[3]]);
            total = total
                .checked_add(size as usize)
                .ok_or_else(|| CryptoError::malformed("payload size overflow"))?;
        }
        Ok(Some(total))
    }
}

fn parse_header(header: &[u8; HEADER_LEN]) -> Result<(usize, usize)> {
    let nonce_size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let block_count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if nonce_size > MAX_NONCE_SIZE {
        return Err(CryptoError::malformed(format!(
            "declared nonce size {nonce_size} exceeds {MAX_NONCE_SIZE}"
        )));
    }
    Ok((nonce_size, block_count))
}

fn check_limit(total: u64, max_len: usize) -> Result<()> {
    if total > max_len as u64 {
        return Err(CryptoError::malformed(format!(
            "container of at least {total} bytes exceeds limit of {max_len}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample() -> StreamContainer {
        let mut c = StreamContainer::new();
        c.append(&[1, 1, 1], b"first").unwrap();
        c.append(&[2, 2, 2], b"").unwrap();
        c.append(&[3, 3, 3], b"third!").unwrap();
        c
    }

    #[test]
    fn test_bit_exact_layout() {
        let mut c = StreamContainer::new();
        c.append(&[0xaa, 0xbb], b"xyz").unwrap();
        c.append(&[0xcc, 0xdd], b"q").unwrap();

        let expected: Vec<u8> = [
            &[0u8, 0, 0, 2][..],
            &[0, 0, 0, 2][..],
            &[0, 0, 0, 3, 0xaa, 0xbb][..],
            &[0, 0, 0, 1, 0xcc, 0xdd][..],
            &b"xyz"[..],
            &b"q"[..],
        ]
        .concat();
        assert_eq!(c.to_bytes(), expected);
        assert_eq!(c.encoded_len(), expected.len());
    }

    #[test]
    fn test_empty_container_encoding() {
        let c = StreamContainer::new();
        assert_eq!(c.to_bytes(), vec![0u8; HEADER_LEN]);
        let decoded = StreamContainer::decode(&mut &[0u8; HEADER_LEN][..]).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded, c);
    }

    #[test]
    fn test_decode_preserves_order() {
        let c = sample();
        let bytes = c.to_bytes();
        let decoded = StreamContainer::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, c);
        let payloads: Vec<&[u8]> = decoded.iter().map(|(_, p)| p).collect();
        assert_eq!(payloads, vec![&b"first"[..], &b""[..], &b"third!"[..]]);
    }

    #[test]
    fn test_nonce_size_fixed_by_first_append() {
        let mut c = sample();
        let before = c.clone();
        let err = c.append(&[9; 12], b"nope").unwrap_err();
        assert_matches!(
            err,
            CryptoError::NonceSizeMismatch {
                expected: 3,
                actual: 12
            }
        );
        assert_eq!(c, before);
    }

    #[test]
    fn test_visit_stops_at_first_error() {
        let c = sample();
        let mut seen = 0;
        let result: std::result::Result<(), &str> = c.visit(|_, payload| {
            seen += 1;
            if payload.is_empty() {
                Err("empty")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("empty"));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_truncated_input_is_eof() {
        let bytes = sample().to_bytes();
        let err = StreamContainer::decode(&mut &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn test_short_reads_are_retried() {
        struct OneByte<'a>(&'a [u8]);
        impl Read for OneByte<'_> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[0];
                self.0 = &self.0[1..];
                Ok(1)
            }
        }

        let c = sample();
        let bytes = c.to_bytes();
        let decoded = StreamContainer::decode(&mut OneByte(&bytes)).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn test_limit_rejects_oversized_declaration() {
        let mut bytes = vec![0, 0, 0, 12, 0, 0, 0, 1];
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        let err = StreamContainer::decode_with_limit(&mut bytes.as_slice(), 1024).unwrap_err();
        assert_matches!(err, CryptoError::Malformed(_));
    }

    #[test]
    fn test_huge_declared_nonce_rejected_before_allocating() {
        let mut bytes = vec![0xff, 0xff, 0xff, 0xff, 0, 0, 0, 1];
        bytes.extend_from_slice(&[0u8; 16]);
        assert_matches!(
            StreamContainer::decode(&mut bytes.as_slice()),
            Err(CryptoError::Malformed(_))
        );
        assert_matches!(
            StreamContainer::peek_encoded_len(&bytes),
            Err(CryptoError::Malformed(_))
        );
    }

    #[test]
    fn test_decode_applies_default_limit() {
        let mut bytes = vec![0, 0, 0, 12, 0, 0, 0, 1];
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        assert_matches!(
            StreamContainer::decode(&mut bytes.as_slice()),
            Err(CryptoError::Malformed(_))
        );
    }

    #[test]
    fn test_append_rejects_oversized_nonce() {
        let mut c = StreamContainer::new();
        let err = c.append(&[0u8; MAX_NONCE_SIZE + 1], b"x").unwrap_err();
        assert_matches!(err, CryptoError::Malformed(_));
        assert!(c.is_empty());
    }

    #[test]
    fn test_to_bytes_matches_encode() {
        let c = sample();
        let mut streamed = Vec::new();
        c.encode(&mut streamed).unwrap();
        assert_eq!(c.to_bytes(), streamed);
    }

    #[test]
    fn test_peek_encoded_len() {
        let bytes = sample().to_bytes();
        assert_eq!(StreamContainer::peek_encoded_len(&bytes[..4]).unwrap(), None);
        // header plus two of three info records
        assert_eq!(StreamContainer::peek_encoded_len(&bytes[..8 + 14]).unwrap(), None);
        // all info records present, payloads still missing
        assert_eq!(
            StreamContainer::peek_encoded_len(&bytes[..8 + 21]).unwrap(),
            Some(bytes.len())
        );
        assert_eq!(
            StreamContainer::peek_encoded_len(&bytes).unwrap(),
            Some(bytes.len())
        );
    }
}
