//! Chunked stream sealing on top of a single-shot [`SessionCipher`]
//!
//! The source is split into chunks of at most [`STREAM_CHUNK_SIZE`] bytes,
//! each sealed under its own nonce and appended to a [`StreamContainer`].
//! Every chunk verifies on its own, so a corrupted block is caught at that
//! block rather than at the end of the stream.

use crate::{CryptoError, Result, SessionCipher, StreamContainer};
use std::io::{Read, Write};

/// Upper bound on the plaintext sealed by one AEAD call
pub const STREAM_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Seal everything `src` yields into one container written to `dst`
///
/// Returns the number of plaintext bytes consumed. Nothing reaches `dst` if
/// reading or sealing any chunk fails.
pub fn seal_stream<C, R, W>(cipher: &C, src: &mut R, dst: &mut W) -> Result<u64>
where
    C: SessionCipher + ?Sized,
    R: Read,
    W: Write + ?Sized,
{
    seal_stream_chunked(cipher, src, dst, STREAM_CHUNK_SIZE)
}

/// [`seal_stream`] with an explicit chunk size
pub fn seal_stream_chunked<C, R, W>(
    cipher: &C,
    src: &mut R,
    dst: &mut W,
    chunk_size: usize,
) -> Result<u64>
where
    C: SessionCipher + ?Sized,
    R: Read,
    W: Write + ?Sized,
{
    if chunk_size == 0 {
        return Err(CryptoError::malformed("stream chunk size must be non-zero"));
    }

    let nonce_size = cipher.nonce_size();
    let mut container = StreamContainer::new();
    let mut chunk = Vec::new();
    let mut consumed = 0u64;

    loop {
        chunk.clear();
        let n = src.by_ref().take(chunk_size as u64).read_to_end(&mut chunk)?;
        if n == 0 {
            break;
        }
        consumed += n as u64;

        let sealed = cipher.seal(&chunk)?;
        let (payload, nonce) = sealed.split_at(sealed.len() - nonce_size);
        container.append(nonce, payload)?;

        if n < chunk_size {
            break;
        }
    }

    container.encode(dst)?;
    Ok(consumed)
}

/// Decode one container from `src` and write every opened block to `dst`
///
/// Returns the number of plaintext bytes written. An authentication failure
/// on any block stops the walk; blocks already written stay written.
/// Containers larger than [`crate::DEFAULT_DECODE_LIMIT`] are refused; decode those
/// with [`StreamContainer::decode_with_limit`] and call [`open_container`].
pub fn open_stream<C, R, W>(cipher: &C, src: &mut R, dst: &mut W) -> Result<u64>
where
    C: SessionCipher + ?Sized,
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let container = StreamContainer::decode(src)?;
    open_container(cipher, &container, dst)
}

/// Open every block of an already decoded container into `dst`
pub fn open_container<C, W>(cipher: &C, container: &StreamContainer, dst: &mut W) -> Result<u64>
where
    C: SessionCipher + ?Sized,
    W: Write + ?Sized,
{
    let mut written = 0u64;
    let mut sealed = Vec::new();
    container.visit(|nonce, payload| {
        sealed.clear();
        sealed.extend_from_slice(payload);
        sealed.extend_from_slice(nonce);

        let plaintext = cipher.open(&sealed)?;
        dst.write_all(&plaintext)?;
        written += plaintext.len() as u64;
        Ok::<(), CryptoError>(())
    })?;
    Ok(written)
}
