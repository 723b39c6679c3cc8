//! Shroud Transport: handshake and encrypted connections over byte streams
//!
//! ## Core Components
//!
//! - **Handshake**: ephemeral key agreement followed by sealed-token key
//!   confirmation, in a fixed initiator/responder speaking order
//! - **Connection**: deadline-bounded raw I/O, container-framed encrypted
//!   read/write and a cancellable lifecycle
//! - **Dial / listen**: TCP helpers that run the handshake for the right role
//!
//! The exchange is anonymous. It stops passive eavesdroppers, not an active
//! man in the middle; bind identities on top if you need them.

/// Connection settings
pub mod config;
/// Encrypted connection
pub mod connection;
/// Transport error type
pub mod error;
/// Two-phase handshake
pub mod handshake;
/// Lifecycle token and close causes
pub mod lifecycle;
/// TCP dial and listen
pub mod net;
/// Scratch buffer pool
pub mod pool;

pub use config::ConnectionConfig;
pub use connection::{Connection, HandshakeState, Role};
pub use error::{Result, TransportError};
pub use handshake::{INITIATOR_TOKEN, RESPONDER_TOKEN};
pub use lifecycle::{CloseCause, Lifecycle};
pub use net::{dial, Incoming, Listener};
pub use pool::{BufferPool, PooledBuffer};
