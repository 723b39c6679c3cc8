//! Ephemeral Diffie-Hellman key exchange
//!
//! Two interchangeable variants sit behind [`KeyExchangeKind`]:
//!
//! - **X25519**: fixed-curve fast path. 32-byte clamped private scalar,
//!   32-byte public u-coordinate.
//! - **Elliptic**: NIST named curves ([`NamedCurve`]). Public keys travel as
//!   uncompressed SEC1 points; the shared secret is the affine x-coordinate.
//!
//! Callers only use the four operations: [`KeyExchangeKind::generate`],
//! [`EphemeralKeyPair::public_key_bytes`], [`KeyExchangeKind::parse_public_key`]
//! and [`EphemeralKeyPair::derive`]. Key pairs are consumed by `derive`, so an
//! ephemeral secret can never be reused for a second exchange.

use crate::{CryptoError, KeyDerivation, Result};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Length of an X25519 scalar and public key
pub const X25519_KEY_LEN: usize = 32;

/// SEC1 tag byte for an uncompressed point
const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// Named curves supported by the generic elliptic-curve path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedCurve {
    /// NIST P-256 (secp256r1)
    P256,
    /// NIST P-384 (secp384r1)
    P384,
}

impl NamedCurve {
    /// Size of one field element in bytes
    pub const fn field_len(self) -> usize {
        match self {
            NamedCurve::P256 => 32,
            NamedCurve::P384 => 48,
        }
    }

    /// Length of an uncompressed SEC1 point
    pub const fn uncompressed_point_len(self) -> usize {
        1 + 2 * self.field_len()
    }

    /// Canonical lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            NamedCurve::P256 => "p256",
            NamedCurve::P384 => "p384",
        }
    }
}

/// Which key-exchange variant a connection runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyExchangeKind {
    /// Curve25519 fixed-curve exchange
    #[default]
    X25519,
    /// Generic named-curve ECDH
    Elliptic(NamedCurve),
}

impl KeyExchangeKind {
    /// Generate a fresh ephemeral key pair
    pub fn generate(self) -> Result<EphemeralKeyPair> {
        let secret = match self {
            KeyExchangeKind::X25519 => {
                let mut scalar = Zeroizing::new([0u8; X25519_KEY_LEN]);
                OsRng
                    .try_fill_bytes(&mut scalar[..])
                    .map_err(|e| CryptoError::Rng(e.to_string()))?;
                clamp_scalar(&mut scalar);
                EphemeralSecret::X25519(scalar)
            }
            KeyExchangeKind::Elliptic(NamedCurve::P256) => {
                EphemeralSecret::P256(p256::SecretKey::random(&mut OsRng))
            }
            KeyExchangeKind::Elliptic(NamedCurve::P384) => {
                EphemeralSecret::P384(p384::SecretKey::random(&mut OsRng))
            }
        };
        let public = secret.public_key_bytes();
        Ok(EphemeralKeyPair {
            kind: self,
            secret,
            public,
        })
    }

    /// Exact length of a serialized public key for this variant
    pub const fn public_key_len(self) -> usize {
        match self {
            KeyExchangeKind::X25519 => X25519_KEY_LEN,
            KeyExchangeKind::Elliptic(curve) => curve.uncompressed_point_len(),
        }
    }

    /// Length of the raw shared secret this variant produces
    pub const fn shared_secret_len(self) -> usize {
        match self {
            KeyExchangeKind::X25519 => X25519_KEY_LEN,
            KeyExchangeKind::Elliptic(curve) => curve.field_len(),
        }
    }

    /// Parse a peer's serialized public key
    ///
    /// X25519 accepts any 32 bytes and fails with `InvalidKeyLength` otherwise.
    /// Elliptic curves require an uncompressed on-curve point and fail with
    /// `InvalidPoint` for anything else, including the point at infinity.
    pub fn parse_public_key(self, bytes: &[u8]) -> Result<PeerPublicKey> {
        match self {
            KeyExchangeKind::X25519 => {
                let key: [u8; X25519_KEY_LEN] =
                    bytes
                        .try_into()
                        .map_err(|_| CryptoError::InvalidKeyLength {
                            actual: bytes.len(),
                        })?;
                Ok(PeerPublicKey::X25519(key))
            }
            KeyExchangeKind::Elliptic(curve) => {
                if bytes.len() != curve.uncompressed_point_len()
                    || bytes.first() != Some(&SEC1_UNCOMPRESSED_TAG)
                {
                    return Err(CryptoError::InvalidPoint);
                }
                match curve {
                    NamedCurve::P256 => p256::PublicKey::from_sec1_bytes(bytes)
                        .map(PeerPublicKey::P256)
                        .map_err(|_| CryptoError::InvalidPoint),
                    NamedCurve::P384 => p384::PublicKey::from_sec1_bytes(bytes)
                        .map(PeerPublicKey::P384)
                        .map_err(|_| CryptoError::InvalidPoint),
                }
            }
        }
    }

    /// True for the fixed-curve fast path
    pub fn is_fixed_curve(self) -> bool {
        matches!(self, KeyExchangeKind::X25519)
    }

    /// Whether a session key can be built from this variant's secret under `kdf`
    pub fn supports(self, kdf: KeyDerivation) -> bool {
        match kdf {
            KeyDerivation::Raw => matches!(self.shared_secret_len(), 16 | 24 | 32),
            KeyDerivation::HkdfSha256 => true,
        }
    }
}

impl fmt::Display for KeyExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyExchangeKind::X25519 => f.write_str("x25519"),
            KeyExchangeKind::Elliptic(curve) => f.write_str(curve.as_str()),
        }
    }
}

impl FromStr for KeyExchangeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x25519" | "curve25519" => Ok(KeyExchangeKind::X25519),
            "p256" | "p-256" | "secp256r1" => Ok(KeyExchangeKind::Elliptic(NamedCurve::P256)),
            "p384" | "p-384" | "secp384r1" => Ok(KeyExchangeKind::Elliptic(NamedCurve::P384)),
            other => Err(format!("unknown key exchange: {other}")),
        }
    }
}

impl TryFrom<String> for KeyExchangeKind {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyExchangeKind> for String {
    fn from(kind: KeyExchangeKind) -> Self {
        kind.to_string()
    }
}

/// Clamp an X25519 scalar in place
///
/// Clears the three low bits (cofactor), clears the top bit and sets bit 254.
pub fn clamp_scalar(scalar: &mut [u8; X25519_KEY_LEN]) {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
}

enum EphemeralSecret {
    X25519(Zeroizing<[u8; X25519_KEY_LEN]>),
    P256(p256::SecretKey),
    P384(p384::SecretKey),
}

impl EphemeralSecret {
    fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            EphemeralSecret::X25519(scalar) => {
                x25519_dalek::x25519(**scalar, x25519_dalek::X25519_BASEPOINT_BYTES).to_vec()
            }
            EphemeralSecret::P256(secret) => secret
                .public_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
            EphemeralSecret::P384(secret) => secret
                .public_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        }
    }
}

/// An ephemeral key pair owned by one side of one handshake attempt
pub struct EphemeralKeyPair {
    kind: KeyExchangeKind,
    secret: EphemeralSecret,
    public: Vec<u8>,
}

impl EphemeralKeyPair {
    /// Variant this pair belongs to
    pub fn kind(&self) -> KeyExchangeKind {
        self.kind
    }

    /// Serialized public key to send to the peer
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public
    }

    /// Derive the shared secret with the peer's public key, consuming the pair
    ///
    /// Fails with `InvalidPoint` if the peer key belongs to another variant or
    /// if X25519 yields the all-zero output of a low-order point.
    pub fn derive(self, peer: &PeerPublicKey) -> Result<SharedSecret> {
        let bytes = match (&self.secret, peer) {
            (EphemeralSecret::X25519(scalar), PeerPublicKey::X25519(public)) => {
                let shared = Zeroizing::new(x25519_dalek::x25519(**scalar, *public));
                if shared.iter().all(|b| *b == 0) {
                    return Err(CryptoError::InvalidPoint);
                }
                shared.to_vec()
            }
            (EphemeralSecret::P256(secret), PeerPublicKey::P256(public)) => {
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                shared.raw_secret_bytes().to_vec()
            }
            (EphemeralSecret::P384(secret), PeerPublicKey::P384(public)) => {
                let shared =
                    p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                shared.raw_secret_bytes().to_vec()
            }
            _ => return Err(CryptoError::InvalidPoint),
        };
        Ok(SharedSecret(Zeroizing::new(bytes)))
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("kind", &self.kind)
            .field("public_len", &self.public.len())
            .finish_non_exhaustive()
    }
}

/// A parsed peer public key
#[derive(Debug, Clone)]
pub enum PeerPublicKey {
    /// X25519 u-coordinate
    X25519([u8; X25519_KEY_LEN]),
    /// P-256 point
    P256(p256::PublicKey),
    /// P-384 point
    P384(p384::PublicKey),
}

impl PeerPublicKey {
    /// Variant of the key
    pub fn kind(&self) -> KeyExchangeKind {
        match self {
            PeerPublicKey::X25519(_) => KeyExchangeKind::X25519,
            PeerPublicKey::P256(_) => KeyExchangeKind::Elliptic(NamedCurve::P256),
            PeerPublicKey::P384(_) => KeyExchangeKind::Elliptic(NamedCurve::P384),
        }
    }
}

/// Raw key-exchange output, wiped on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Zeroizing<Vec<u8>>);

impl SharedSecret {
    /// Wrap existing secret bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Raw secret bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Symmetric key material for the session cipher
    pub fn session_key(&self, kdf: KeyDerivation) -> Result<Zeroizing<Vec<u8>>> {
        kdf.derive(self.as_bytes())
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret({} bytes)", self.0.len())
    }
}
