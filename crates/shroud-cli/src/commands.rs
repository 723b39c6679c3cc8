//! Echo server and client

use anyhow::{Context, Result};
use shroud_transport::{
    dial, Connection, ConnectionConfig, Incoming, Listener, TransportError,
};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Serve until interrupted
///
/// Each accepted socket gets its own task for the handshake and the echo
/// session, so a stalled peer never delays the next accept.
pub async fn listen(addr: SocketAddr, config: ConnectionConfig) -> Result<()> {
    let listener = Listener::bind(addr, config)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %listener.local_addr()?, "echo server ready");

    loop {
        tokio::select! {
            accepted = listener.accept_incoming() => match accepted {
                Ok(incoming) => {
                    tokio::spawn(serve(incoming));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn serve(incoming: Incoming) {
    let peer = incoming.peer_addr();
    let conn = match incoming.establish().await {
        Ok((conn, _)) => conn,
        Err(e) => {
            warn!(%peer, error = %e, "handshake with incoming peer failed");
            return;
        }
    };
    if let Err(e) = echo(conn).await {
        warn!(%peer, error = %e, "echo session ended with error");
    }
}

async fn echo(mut conn: Connection) -> shroud_transport::Result<()> {
    let mut buf = vec![0u8; 16 * 1024];
    let result = loop {
        let n = match conn.read(&mut buf).await {
            Ok(n) => n,
            Err(TransportError::EndOfStream) => break Ok(()),
            Err(e) => break Err(e),
        };
        if let Err(e) = conn.write(&buf[..n]).await {
            break Err(e);
        }
    };
    conn.close().await;
    result
}

/// Send `message` and wait for the same number of bytes back
pub async fn connect(
    addr: SocketAddr,
    config: ConnectionConfig,
    message: &[u8],
) -> Result<Vec<u8>> {
    let mut conn = dial(addr, config)
        .await
        .with_context(|| format!("connecting to {addr}"))?;

    conn.write(message).await?;
    let mut reply = vec![0u8; message.len()];
    conn.read_exact(&mut reply).await?;
    conn.close().await;
    Ok(reply)
}
