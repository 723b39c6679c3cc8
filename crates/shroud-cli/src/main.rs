//! Shroud CLI
//!
//! Runs an encrypted echo server or sends one message to it. Useful for
//! checking that two hosts agree on key exchange and key derivation.

use anyhow::Result;
use clap::{Parser, Subcommand};
use shroud_crypto::{KeyDerivation, KeyExchangeKind};
use shroud_transport::ConnectionConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shroud")]
#[command(about = "Encrypted point-to-point tunnel transport", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML connection config; flags below override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Per-operation socket deadline in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Key exchange: x25519, p256 or p384
    #[arg(long, global = true)]
    curve: Option<KeyExchangeKind>,

    /// Key derivation: raw or hkdf-sha256
    #[arg(long, global = true)]
    kdf: Option<KeyDerivation>,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept connections and echo every message back
    Listen {
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1:7400")]
        addr: SocketAddr,
    },

    /// Connect, send a message and print the echoed reply
    Connect {
        /// Server address
        #[arg(short, long, default_value = "127.0.0.1:7400")]
        addr: SocketAddr,

        /// Message to send
        #[arg(short, long, default_value = "ping")]
        message: String,
    },
}

impl Cli {
    fn connection_config(&self) -> Result<ConnectionConfig> {
        let mut config = match &self.config {
            Some(path) => ConnectionConfig::load(path)?,
            None => ConnectionConfig::default(),
        };
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(curve) = self.curve {
            config.key_exchange = curve;
        }
        if let Some(kdf) = self.kdf {
            config.key_derivation = kdf;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.connection_config()?;
    match cli.command {
        Commands::Listen { addr } => commands::listen(addr, config).await,
        Commands::Connect { addr, message } => {
            let reply = commands::connect(addr, config, message.as_bytes()).await?;
            println!("{}", String::from_utf8_lossy(&reply));
            Ok(())
        }
    }
}
