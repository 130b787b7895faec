//! Certificate chain generation tool.
//!
//! Writes the root CA, intermediate CA, server and client certificates,
//! and the chain bundles that the server and client processes load.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use mtls_handshake::certgen;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "mtls-certgen")]
#[command(about = "Generate the certificate chain for the mTLS demo pair")]
struct Args {
    /// Directory to write the PEM files into
    #[arg(long, default_value = "certs", env = "MTLS_CERT_DIR")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!("{}=info,mtls_handshake=info", env!("CARGO_CRATE_NAME")))
        .init();

    certgen::generate(&args.out_dir)
}
