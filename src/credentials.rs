//! Credential loading.
//!
//! Reads a private key, a certificate (leaf or full chain), and a
//! trust-anchor bundle from PEM files into memory. Loaded once at process
//! start; never mutated afterward.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use thiserror::Error;

/// Errors raised while loading credential material. Every variant names
/// the offending file so the startup diagnostic identifies what to fix.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyCertChain(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("no trust anchors found in {0}")]
    EmptyTrustAnchor(PathBuf),
}

impl CredentialError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The three files a process needs to take part in a mutual-TLS handshake.
#[derive(Debug, Clone)]
pub struct CredentialPaths {
    /// Private key (PEM).
    pub key: PathBuf,
    /// Certificate, either the leaf alone or the leaf followed by its
    /// issuing chain (PEM).
    pub certificate: PathBuf,
    /// Trust anchors used to validate the peer's chain (PEM).
    pub trust_anchor: PathBuf,
}

/// Loaded credential material. Immutable for the process lifetime, so it
/// is shared across connections without synchronization.
#[derive(Debug)]
pub struct CredentialBundle {
    pub key: PrivateKeyDer<'static>,
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub trust_anchors: Vec<CertificateDer<'static>>,
}

impl CredentialBundle {
    /// Load all three files or fail naming the one that could not be read.
    ///
    /// Callers treat a failure as fatal: no listener is bound and no
    /// request is issued with partial credentials.
    pub fn load(paths: &CredentialPaths) -> Result<Self, CredentialError> {
        let key = load_private_key(&paths.key)?;

        let cert_chain = load_certs(&paths.certificate)?;
        if cert_chain.is_empty() {
            return Err(CredentialError::EmptyCertChain(paths.certificate.clone()));
        }

        let trust_anchors = load_certs(&paths.trust_anchor)?;
        if trust_anchors.is_empty() {
            return Err(CredentialError::EmptyTrustAnchor(paths.trust_anchor.clone()));
        }

        Ok(Self {
            key,
            cert_chain,
            trust_anchors,
        })
    }

    /// Root store built from the trust anchors.
    pub fn root_store(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        let _ = roots.add_parsable_certificates(self.trust_anchors.iter().cloned());
        roots
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let file = File::open(path).map_err(|e| CredentialError::io(path, e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CredentialError::io(path, e))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CredentialError> {
    let file = File::open(path).map_err(|e| CredentialError::io(path, e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CredentialError::io(path, e))?
        .ok_or_else(|| CredentialError::NoPrivateKey(path.to_path_buf()))
}
