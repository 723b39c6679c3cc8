//! Two-phase handshake
//!
//! Key agreement exchanges ephemeral public keys in a fixed speaking order:
//! the initiator writes first, the responder reads first. Key confirmation
//! then trades two sealed literal tokens, proving both sides derived the
//! same session key. It proves nothing about who the peer is.
//!
//! `Start -> KeyAgreement -> KeyConfirmation -> Established`, any failure
//! lands in `Failed`. A failed connection is closed, never retried.

use crate::connection::{Connection, HandshakeState, Role};
use crate::lifecycle::CloseCause;
use crate::{ConnectionConfig, Result, TransportError};
use shroud_crypto::{AesGcmCipher, EphemeralKeyPair, KeyExchangeKind, PeerPublicKey};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Confirmation token sent by the initiator
pub const INITIATOR_TOKEN: &[u8] = b"Hello,Server";

/// Confirmation token sent by the responder
pub const RESPONDER_TOKEN: &[u8] = b"Hello,Client";

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap `stream` and run the handshake for `role`
    ///
    /// On failure the connection is closed with [`CloseCause::HandshakeFailed`]
    /// and the error returned.
    pub async fn establish(stream: S, role: Role, config: ConnectionConfig) -> Result<Self> {
        let mut conn = Connection::new(stream, role, config)?;
        conn.handshake_or_close().await?;
        Ok(conn)
    }

    /// Run the handshake, closing the connection if it fails
    pub async fn handshake_or_close(&mut self) -> Result<()> {
        if let Err(e) = self.handshake().await {
            self.close_with(CloseCause::HandshakeFailed(e.to_string()))
                .await;
            return Err(e);
        }
        Ok(())
    }

    /// Run both handshake phases for this connection's role
    ///
    /// Besides the per-read deadline, the whole exchange must finish within
    /// `handshake_timeout_ms`, so a peer trickling bytes cannot stall it.
    /// Can be attempted once; the caller must close the connection on error.
    pub async fn handshake(&mut self) -> Result<()> {
        if self.state() != HandshakeState::Start {
            return Err(TransportError::HandshakeAttempted(self.state().as_str()));
        }

        let kind = self.config().key_exchange;
        debug!(role = %self.role(), key_exchange = %kind, "handshake starting");

        let overall = self.config().handshake_timeout();
        let phases = async {
            match self.role() {
                Role::Initiator => self.run_initiator(kind).await,
                Role::Responder => self.run_responder(kind).await,
            }
        };
        let result = match timeout(overall, phases).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout("handshake")),
        };

        match &result {
            Ok(()) => {
                self.set_state(HandshakeState::Established);
                debug!(role = %self.role(), "handshake established");
            }
            Err(e) => {
                warn!(role = %self.role(), phase = %self.state(), error = %e, "handshake failed");
                self.set_state(HandshakeState::Failed);
            }
        }
        result
    }

    async fn run_initiator(&mut self, kind: KeyExchangeKind) -> Result<()> {
        self.set_state(HandshakeState::KeyAgreement);
        let local = kind.generate()?;
        self.write_raw(local.public_key_bytes()).await?;
        let peer = self.read_peer_public_key(kind).await?;
        self.agree(local, &peer)?;

        self.set_state(HandshakeState::KeyConfirmation);
        self.send_token(INITIATOR_TOKEN).await?;
        self.expect_token(RESPONDER_TOKEN).await
    }

    async fn run_responder(&mut self, kind: KeyExchangeKind) -> Result<()> {
        self.set_state(HandshakeState::KeyAgreement);
        let peer = self.read_peer_public_key(kind).await?;
        let local = kind.generate()?;
        self.write_raw(local.public_key_bytes()).await?;
        self.agree(local, &peer)?;

        self.set_state(HandshakeState::KeyConfirmation);
        self.expect_token(INITIATOR_TOKEN).await?;
        self.send_token(RESPONDER_TOKEN).await
    }

    async fn read_peer_public_key(&mut self, kind: KeyExchangeKind) -> Result<PeerPublicKey> {
        let expected = kind.public_key_len();
        let mut bytes = vec![0u8; expected];
        let actual = self.read_raw_fill(&mut bytes).await?;
        if actual == 0 {
            return Err(TransportError::EndOfStream);
        }
        if actual != expected {
            return Err(TransportError::InvalidPeerKey { expected, actual });
        }
        Ok(kind.parse_public_key(&bytes)?)
    }

    /// Derive the shared secret and install the session cipher
    fn agree(&mut self, local: EphemeralKeyPair, peer: &PeerPublicKey) -> Result<()> {
        let secret = local.derive(peer)?;
        let key = secret.session_key(self.config().key_derivation)?;
        let cipher = AesGcmCipher::new(&key)?;
        debug!(
            role = %self.role(),
            key_bits = cipher.key_bits(),
            kdf = %self.config().key_derivation,
            "session cipher installed"
        );
        self.install_session(Box::new(cipher), secret);
        Ok(())
    }

    async fn send_token(&mut self, token: &[u8]) -> Result<()> {
        let sealed = self.cipher()?.seal(token)?;
        self.write_raw(&sealed).await
    }

    async fn expect_token(&mut self, token: &[u8]) -> Result<()> {
        let sealed_len = token.len() + self.cipher()?.overhead();
        let sealed = self.read_raw_exact(sealed_len).await?;
        let opened = self.cipher()?.open(&sealed)?;
        if opened != token {
            return Err(TransportError::HandshakeVerifyFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shroud_crypto::{KeyDerivation, NamedCurve, X25519_KEY_LEN};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    async fn handshake_pair(
        config: ConnectionConfig,
    ) -> (Result<Connection<DuplexStream>>, Result<Connection<DuplexStream>>) {
        let (a, b) = duplex(4096);
        tokio::join!(
            Connection::establish(a, Role::Initiator, config.clone()),
            Connection::establish(b, Role::Responder, config),
        )
    }

    #[tokio::test]
    async fn test_x25519_handshake() {
        let (client, server) = handshake_pair(ConnectionConfig::testing()).await;
        let (client, server) = (client.unwrap(), server.unwrap());
        assert!(client.is_established());
        assert!(server.is_established());
        assert_eq!(client.session_secret(), server.session_secret());
        assert_eq!(client.session_secret().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_p256_hkdf_handshake() {
        let config = ConnectionConfig::testing()
            .with_key_exchange(KeyExchangeKind::Elliptic(NamedCurve::P256))
            .with_key_derivation(KeyDerivation::HkdfSha256);
        let (client, server) = handshake_pair(config).await;
        let (mut client, mut server) = (client.unwrap(), server.unwrap());
        assert_eq!(client.session_secret(), server.session_secret());

        client.write(b"over p256").await.unwrap();
        let mut buf = [0u8; 9];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"over p256");
    }

    #[tokio::test]
    async fn test_short_peer_key_rejected() {
        let (a, mut b) = duplex(4096);
        let responder = tokio::spawn(async move {
            Connection::establish(a, Role::Responder, ConnectionConfig::testing()).await
        });
        b.write_all(&[9u8; 31]).await.unwrap();
        drop(b);

        let err = responder.await.unwrap().unwrap_err();
        assert_matches!(err, TransportError::InvalidPeerKey { expected: 32, actual: 31 });
    }

    #[tokio::test]
    async fn test_mismatched_kdf_fails_confirmation() {
        let (a, b) = duplex(4096);
        let (client, server) = tokio::join!(
            Connection::establish(a, Role::Initiator, ConnectionConfig::testing()),
            Connection::establish(
                b,
                Role::Responder,
                ConnectionConfig::testing().with_key_derivation(KeyDerivation::HkdfSha256),
            ),
        );
        let server_err = server.unwrap_err();
        assert!(server_err.is_auth_failure(), "unexpected: {server_err}");
        assert!(client.is_err());
    }

    #[tokio::test]
    async fn test_trickling_peer_hits_overall_deadline() {
        let (a, mut b) = duplex(4096);
        let trickle = tokio::spawn(async move {
            for _ in 0..X25519_KEY_LEN {
                if b.write_all(&[1]).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let config = ConnectionConfig::testing()
            .with_timeout(Duration::from_secs(1))
            .with_handshake_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = Connection::establish(a, Role::Responder, config)
            .await
            .unwrap_err();
        assert_matches!(err, TransportError::Timeout("handshake"));
        assert!(started.elapsed() < Duration::from_secs(1));
        trickle.abort();
    }

    #[tokio::test]
    async fn test_handshake_runs_once() {
        let (client, _server) = handshake_pair(ConnectionConfig::testing()).await;
        let mut client = client.unwrap();
        assert_matches!(
            client.handshake().await,
            Err(TransportError::HandshakeAttempted("established"))
        );
    }

    #[tokio::test]
    async fn test_failed_handshake_closes() {
        let (a, b) = duplex(4096);
        drop(b);
        let mut conn = Connection::new(a, Role::Responder, ConnectionConfig::testing()).unwrap();
        assert!(conn.handshake_or_close().await.is_err());
        assert_eq!(conn.state(), HandshakeState::Failed);
        assert!(conn.is_closed());
        assert_matches!(
            conn.lifecycle().cause(),
            Some(CloseCause::HandshakeFailed(_))
        );
    }
}
