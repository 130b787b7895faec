//! mTLS client process.
//!
//! Loads the client credential bundle, issues a single GET over a
//! mutually-authenticated session, and reports the outcome: a response
//! with whatever status arrived, no response at all, or a request that
//! never went out.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use mtls_handshake::client::{exchange, ExchangeError};
use mtls_handshake::credentials::{CredentialBundle, CredentialPaths};
use mtls_handshake::tls::TlsSettings;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "mtls-client")]
#[command(about = "Mutual-TLS client issuing a single verified request")]
struct Args {
    /// Target URL
    #[arg(long, default_value = "https://localhost:3000", env = "MTLS_URL")]
    url: String,

    /// Path to the client private key (PEM)
    #[arg(long, default_value = "certs/client.key", env = "MTLS_CLIENT_KEY")]
    key: PathBuf,

    /// Path to the client certificate (PEM)
    #[arg(long, default_value = "certs/client.crt", env = "MTLS_CLIENT_CERT")]
    cert: PathBuf,

    /// Path to the CA chain used to validate the server (PEM)
    #[arg(long, default_value = "certs/ca-chain.crt", env = "MTLS_CLIENT_CA")]
    ca: PathBuf,

    /// Response timeout in seconds
    #[arg(long, default_value_t = 10, env = "MTLS_TIMEOUT_SECS")]
    timeout_secs: u64,

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

    // Fatal on failure: no request goes out with partial credentials.
    let bundle = CredentialBundle::load(&paths).context("failed to load client credentials")?;

    info!(url = %args.url, "Starting mTLS client request");
    let outcome = exchange(
        &args.url,
        &bundle,
        &TlsSettings::default(),
        Duration::from_secs(args.timeout_secs),
    )
    .await;

    match outcome {
        Ok(report) => {
            info!(status = report.status, "Server response status");
            info!(body = %report.body, "Server response body");
        }
        Err(ExchangeError::Timeout { limit }) => {
            error!(
                limit_secs = limit.as_secs(),
                "No response received from server: request timed out"
            );
        }
        Err(ExchangeError::NoResponse { detail, cause }) => {
            error!(detail = %detail, "No response received from server");
            if let Some(cause) = cause {
                error!(cause = %cause, "Underlying cause");
            }
        }
        Err(ExchangeError::Request(message)) => {
            error!(error = %message, "Request failed");
        }
    }

    Ok(())
}
