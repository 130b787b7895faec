//! mTLS HTTPS server process.
//!
//! Loads the server credential bundle, binds a TLS listener requiring
//! client certificates, and serves the single route until terminated.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use mtls_handshake::credentials::{CredentialBundle, CredentialPaths};
use mtls_handshake::server::MtlsServer;
use mtls_handshake::tls::TlsSettings;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "mtls-server")]
#[command(about = "Mutual-TLS HTTP server with session introspection")]
struct Args {
    /// Address to bind the TLS listener on
    #[arg(long, default_value = "0.0.0.0:3000", env = "MTLS_BIND")]
    bind: SocketAddr,

    /// Path to the server private key (PEM)
    #[arg(long, default_value = "certs/server.key", env = "MTLS_SERVER_KEY")]
    key: PathBuf,

    /// Path to the server certificate chain (PEM)
    #[arg(long, default_value = "certs/server-chain.crt", env = "MTLS_SERVER_CERT")]
    cert: PathBuf,

    /// Path to the CA bundle used to validate client certificates (PEM)
    #[arg(long, default_value = "certs/rootCA.crt", env = "MTLS_SERVER_CA")]
    ca: PathBuf,

    /// Minimum accepted TLS version (1.2 or 1.3)
    #[arg(long, default_value = "1.2", env = "MTLS_MIN_VERSION")]
    min_tls_version: String,

    /// Enable verbose logging
    #[arg(short, long, env = "MTLS_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "{}={},mtls_handshake={}",
            env!("CARGO_CRATE_NAME"),
            log_level,
            log_level
        ))
        .init();

    let paths = CredentialPaths {
        key: args.key,
        certificate: args.cert,
        trust_anchor: args.ca,
    };

    // Fatal on failure: the listener never starts with partial credentials.
    let bundle = CredentialBundle::load(&paths).context("failed to load server credentials")?;
    info!(
        cert_chain_len = bundle.cert_chain.len(),
        trust_anchors = bundle.trust_anchors.len(),
        "Server credentials loaded"
    );

    let settings = TlsSettings {
        min_tls_version: args.min_tls_version,
        ..TlsSettings::default()
    };

    let server = MtlsServer::bind(args.bind, &bundle, &settings).await?;
    info!(addr = %server.local_addr()?, "HTTPS server listening");

    server.serve().await
}
