//! TCP dial and listen
//!
//! Thin wrappers that configure the socket and run the handshake for the
//! right role. TLS wrapping is left to callers, who can hand any stream to
//! [`Connection::establish`] themselves.

use crate::connection::{Connection, Role};
use crate::pool::BufferPool;
use crate::{ConnectionConfig, Result, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tracing::{debug, info};

/// Connect to `addr` and run the initiator handshake
pub async fn dial(addr: impl ToSocketAddrs, config: ConnectionConfig) -> Result<Connection> {
    config.validate()?;
    let stream = timeout(config.timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout("connect"))??;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    debug!(%peer, key_exchange = %config.key_exchange, "dialed");

    let conn = Connection::establish(stream, Role::Initiator, config).await?;
    info!(%peer, "connection established");
    Ok(conn)
}

/// Accepts TCP connections and runs the responder handshake on each
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    config: ConnectionConfig,
    pool: Arc<BufferPool>,
}

impl Listener {
    /// Bind to `addr`
    pub async fn bind(addr: impl ToSocketAddrs, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let inner = TcpListener::bind(addr).await?;
        info!(addr = ?inner.local_addr().ok(), "listening");
        Ok(Self {
            inner,
            config,
            pool: BufferPool::shared(),
        })
    }

    /// Hand accepted connections buffers from `pool`
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Wait for the next peer without running its handshake
    ///
    /// Servers should drive [`Incoming::establish`] on a separate task so a
    /// slow peer cannot hold up the accept loop.
    pub async fn accept_incoming(&self) -> Result<Incoming> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted");

        let conn = Connection::new(stream, Role::Responder, self.config.clone())?
            .with_pool(Arc::clone(&self.pool));
        Ok(Incoming { conn, peer })
    }

    /// Wait for the next peer and complete its handshake
    ///
    /// A handshake failure closes that socket and is returned; the listener
    /// itself stays usable. The handshake runs inline, bounded by
    /// `handshake_timeout_ms`.
    pub async fn accept(&self) -> Result<(Connection, SocketAddr)> {
        self.accept_incoming().await?.establish().await
    }
}

/// Accepted socket whose responder handshake has not run yet
#[derive(Debug)]
pub struct Incoming {
    conn: Connection,
    peer: SocketAddr,
}

impl Incoming {
    /// Remote address of the accepted socket
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Run the responder handshake, closing the socket on failure
    pub async fn establish(mut self) -> Result<(Connection, SocketAddr)> {
        self.conn.handshake_or_close().await?;
        info!(peer = %self.peer, "connection established");
        Ok((self.conn, self.peer))
    }
}
