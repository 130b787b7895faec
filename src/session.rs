//! Secure-session introspection.
//!
//! A [`SessionDescriptor`] captures the handshake-derived facts for one
//! accepted connection. It can only be constructed from a completed
//! `rustls::ServerConnection`, so request handlers never see a plain
//! socket.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::ClientCertVerifier;
use rustls::{ProtocolVersion, ServerConnection};
use thiserror::Error;
use tracing::info;
use x509_parser::prelude::*;

/// A completed handshake missing data the TLS stack guarantees to have
/// negotiated. Signals a server bug, not an expected runtime path.
#[derive(Debug, Clone, Error)]
#[error("secure session invariant violated: {0}")]
pub struct InvariantViolation(pub String);

/// Handshake-derived facts for one accepted connection. Read-only once
/// constructed.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    /// Negotiated protocol version, e.g. "TLSv1.3".
    pub protocol: String,
    /// Negotiated cipher suite name.
    pub cipher: String,
    /// Whether the peer certificate chains to the trust anchor.
    pub authorized: bool,
    /// Why authorization failed, when it did.
    pub authorization_error: Option<String>,
    /// Peer certificate subject common name.
    pub peer_subject_cn: Option<String>,
    /// Peer certificate issuer common name.
    pub peer_issuer_cn: Option<String>,
}

impl SessionDescriptor {
    /// Inspect a completed handshake and fix the authorization verdict.
    ///
    /// The verdict is decided exactly once here and never changes for the
    /// connection's lifetime.
    pub fn from_connection(
        conn: &ServerConnection,
        authorizer: &Arc<dyn ClientCertVerifier>,
    ) -> Result<Self, InvariantViolation> {
        let protocol = conn
            .protocol_version()
            .map(protocol_name)
            .ok_or_else(|| InvariantViolation("no negotiated protocol version".to_string()))?;

        let cipher = conn
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite()))
            .ok_or_else(|| InvariantViolation("no negotiated cipher suite".to_string()))?;

        let peer_certs = conn.peer_certificates().unwrap_or_default();

        let (authorized, authorization_error) = match peer_certs.split_first() {
            Some((end_entity, intermediates)) => {
                match authorizer.verify_client_cert(end_entity, intermediates, UnixTime::now()) {
                    Ok(_) => (true, None),
                    Err(e) => (false, Some(e.to_string())),
                }
            }
            None => (false, Some("no client certificate presented".to_string())),
        };

        let (peer_subject_cn, peer_issuer_cn) = peer_certs
            .first()
            .map(peer_identity)
            .unwrap_or((None, None));

        Ok(Self {
            protocol,
            cipher,
            authorized,
            authorization_error,
            peer_subject_cn,
            peer_issuer_cn,
        })
    }

    /// Emit one diagnostic line per inspected field.
    pub fn log(&self) {
        info!(protocol = %self.protocol, "Negotiated protocol");
        info!(cipher = %self.cipher, "Negotiated cipher");
        info!(
            subject = %self.peer_subject_cn.as_deref().unwrap_or("Unknown"),
            "Client subject"
        );
        info!(
            issuer = %self.peer_issuer_cn.as_deref().unwrap_or("Unknown"),
            "Client issuer"
        );
        info!(authorized = self.authorized, "Client authorization");
    }
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        other => format!("{:?}", other),
    }
}

/// Subject and issuer common names from the peer's end-entity certificate.
fn peer_identity(der: &CertificateDer<'_>) -> (Option<String>, Option<String>) {
    match X509Certificate::from_der(der.as_ref()) {
        Ok((_, cert)) => {
            let subject = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(String::from);
            let issuer = cert
                .issuer()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(String::from);
            (subject, issuer)
        }
        Err(_) => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    #[test]
    fn test_protocol_name() {
        assert_eq!(protocol_name(ProtocolVersion::TLSv1_2), "TLSv1.2");
        assert_eq!(protocol_name(ProtocolVersion::TLSv1_3), "TLSv1.3");
    }

    #[test]
    fn test_peer_identity_extracts_common_names() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, "testclient");
        let cert = params.self_signed(&key).unwrap();

        let (subject, issuer) = peer_identity(cert.der());
        assert_eq!(subject.as_deref(), Some("testclient"));
        // Self-signed, so issuer matches subject.
        assert_eq!(issuer.as_deref(), Some("testclient"));
    }

    #[test]
    fn test_peer_identity_tolerates_garbage() {
        let der = CertificateDer::from(vec![0u8; 16]);
        assert_eq!(peer_identity(&der), (None, None));
    }
}
