//! Encrypted connection over a byte stream
//!
//! A [`Connection`] owns the socket, the session cipher installed by the
//! handshake, a buffer of decrypted bytes not yet handed to the caller, and a
//! [`Lifecycle`] token. Every socket call runs under the configured deadline.
//!
//! One reader and one writer at a time; the `&mut self` receivers enforce it.

use crate::config::ConnectionConfig;
use crate::lifecycle::{CloseCause, Lifecycle};
use crate::pool::BufferPool;
use crate::{Result, TransportError};
use bytes::{Buf, BufMut, BytesMut};
use shroud_crypto::{
    open_container, seal_stream, CryptoError, SessionCipher, SharedSecret, StreamContainer,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Which side of the handshake a connection plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dialing side; speaks first
    Initiator,
    /// Accepting side; listens first
    Responder,
}

impl Role {
    /// Lowercase name for logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandshakeState {
    /// Nothing exchanged yet
    #[default]
    Start,
    /// Exchanging ephemeral public keys
    KeyAgreement,
    /// Exchanging encrypted confirmation tokens
    KeyConfirmation,
    /// Both sides proved they hold the same session key
    Established,
    /// A phase failed; the connection must be closed
    Failed,
}

impl HandshakeState {
    /// Lowercase name for logs and errors
    pub const fn as_str(self) -> &'static str {
        match self {
            HandshakeState::Start => "start",
            HandshakeState::KeyAgreement => "key-agreement",
            HandshakeState::KeyConfirmation => "key-confirmation",
            HandshakeState::Established => "established",
            HandshakeState::Failed => "failed",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encrypted point-to-point connection
pub struct Connection<S = TcpStream> {
    stream: Option<S>,
    role: Role,
    config: ConnectionConfig,
    timeout: Duration,
    cipher: Option<Box<dyn SessionCipher>>,
    session_secret: Option<SharedSecret>,
    state: HandshakeState,
    /// Raw bytes received but not yet forming a whole container
    inbound: BytesMut,
    /// Decrypted bytes not yet returned by `read`
    plaintext: BytesMut,
    pool: Arc<BufferPool>,
    lifecycle: Lifecycle,
}

impl<S> Connection<S> {
    /// Wrap an unauthenticated stream; run the handshake before encrypted I/O
    pub fn new(stream: S, role: Role, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stream: Some(stream),
            role,
            timeout: config.timeout(),
            config,
            cipher: None,
            session_secret: None,
            state: HandshakeState::Start,
            inbound: BytesMut::new(),
            plaintext: BytesMut::new(),
            pool: BufferPool::shared(),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Draw scratch buffers from `pool` instead of the shared one
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Tie this connection's lifecycle to `parent`
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.lifecycle = Lifecycle::child_of(parent);
        self
    }

    /// Handshake role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Handshake progress
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// True once the handshake completed
    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    /// Configuration this connection was created with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Per-operation deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the per-operation deadline for subsequent socket calls
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Lifecycle token and close cause
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Shared secret negotiated by the handshake
    pub fn session_secret(&self) -> Option<&SharedSecret> {
        self.session_secret.as_ref()
    }

    /// True after `close` or parent cancellation
    pub fn is_closed(&self) -> bool {
        self.stream.is_none() || self.lifecycle.is_cancelled()
    }

    /// Decrypted bytes waiting to be read
    pub fn buffered(&self) -> usize {
        self.plaintext.len()
    }

    pub(crate) fn install_session(&mut self, cipher: Box<dyn SessionCipher>, secret: SharedSecret) {
        self.cipher = Some(cipher);
        self.session_secret = Some(secret);
    }

    pub(crate) fn cipher(&self) -> Result<&dyn SessionCipher> {
        self.cipher.as_deref().ok_or(TransportError::NotEstablished)
    }

    pub(crate) fn set_state(&mut self, state: HandshakeState) {
        trace!(role = %self.role, from = %self.state, to = %state, "handshake state");
        self.state = state;
    }

    fn stream_mut(&mut self) -> Result<&mut S> {
        if self.lifecycle.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.stream.as_mut().ok_or(TransportError::Closed)
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Write `data` to the socket unframed and unencrypted
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.timeout;
        let stream = self.stream_mut()?;
        timeout(deadline, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| TransportError::Timeout("write"))??;
        Ok(())
    }

    /// Read exactly `len` raw bytes
    ///
    /// End of stream before `len` bytes arrive is [`TransportError::EndOfStream`].
    pub async fn read_raw_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let filled = self.read_raw_fill(&mut buf).await?;
        if filled < len {
            return Err(TransportError::EndOfStream);
        }
        Ok(buf)
    }

    /// Fill `buf` with raw bytes until it is full or the peer closes
    ///
    /// Each socket read runs under its own deadline. Returns the count filled.
    pub(crate) async fn read_raw_fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_raw_once(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn read_raw_once(&mut self, buf: &mut [u8]) -> Result<usize> {
        let deadline = self.timeout;
        let stream = self.stream_mut()?;
        let n = timeout(deadline, stream.read(buf))
            .await
            .map_err(|_| TransportError::Timeout("read"))??;
        Ok(n)
    }

    /// Seal `data` into one container and send it
    ///
    /// Returns the number of application bytes accepted. An empty `data`
    /// sends nothing, and neither does a container larger than
    /// `max_container_size`, which the peer would refuse.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let mut frame = self.pool.acquire();
        {
            let cipher = self.cipher()?;
            let mut sink = (&mut *frame).writer();
            seal_stream(cipher, &mut &data[..], &mut sink)?;
        }
        if frame.len() > self.config.max_container_size {
            return Err(self.container_too_large());
        }
        trace!(role = %self.role, plaintext = data.len(), wire = frame.len(), "write");
        self.write_raw(&frame).await?;
        Ok(data.len())
    }

    /// Read decrypted bytes into `buf`
    ///
    /// Serves buffered plaintext first; otherwise reads from the socket until
    /// at least one container opens to a non-empty plaintext.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.cipher()?;
        if buf.is_empty() {
            return Ok(0);
        }

        while self.plaintext.is_empty() {
            self.fill_plaintext().await?;
        }

        let n = buf.len().min(self.plaintext.len());
        buf[..n].copy_from_slice(&self.plaintext[..n]);
        self.plaintext.advance(n);
        Ok(n)
    }

    /// Read until `buf` is full
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.read(&mut buf[filled..]).await?;
        }
        Ok(())
    }

    /// Open the next whole container into the plaintext buffer
    async fn fill_plaintext(&mut self) -> Result<()> {
        loop {
            if let Some(len) = self.buffered_container_len()? {
                let frame = self.inbound.split_to(len);
                let container = StreamContainer::decode_with_limit(
                    &mut frame.as_ref(),
                    self.config.max_container_size,
                )?;
                let cipher = self.cipher.as_deref().ok_or(TransportError::NotEstablished)?;
                let mut sink = (&mut self.plaintext).writer();
                open_container(cipher, &container, &mut sink)?;
                return Ok(());
            }

            let mut chunk = self.pool.acquire();
            chunk.resize(self.config.read_chunk_size, 0);
            let n = self.read_raw_once(&mut chunk[..]).await?;
            if n == 0 {
                return Err(TransportError::EndOfStream);
            }
            self.inbound.put_slice(&chunk[..n]);
        }
    }

    /// Length of the container at the front of `inbound`, once all of it arrived
    fn buffered_container_len(&self) -> Result<Option<usize>> {
        let max = self.config.max_container_size;
        match StreamContainer::peek_encoded_len(&self.inbound)? {
            Some(len) if len > max => Err(self.container_too_large()),
            Some(len) if self.inbound.len() >= len => Ok(Some(len)),
            Some(_) => Ok(None),
            None if self.inbound.len() > max => Err(self.container_too_large()),
            None => Ok(None),
        }
    }

    fn container_too_large(&self) -> TransportError {
        TransportError::Crypto(CryptoError::malformed(format!(
            "container exceeds {} bytes",
            self.config.max_container_size
        )))
    }

    /// Close with [`CloseCause::Local`]
    pub async fn close(&mut self) {
        self.close_with(CloseCause::Local).await;
    }

    /// Cancel the lifecycle with `cause`, then shut down and drop the socket
    ///
    /// Idempotent. Every later operation fails with [`TransportError::Closed`].
    pub async fn close_with(&mut self, cause: CloseCause) {
        self.lifecycle.cancel(cause.clone());
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        self.cipher = None;
        self.inbound.clear();
        self.plaintext.clear();

        debug!(role = %self.role, %cause, "closing connection");
        match timeout(self.timeout, stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(role = %self.role, error = %e, "socket shutdown failed"),
            Err(_) => debug!(role = %self.role, "socket shutdown timed out"),
        }
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .field("buffered", &self.plaintext.len())
            .finish_non_exhaustive()
    }
}
