//! Session configuration builders for both roles.
//!
//! The server requests a client certificate on every connection but defers
//! chain validation to after the handshake, so an unauthorized peer is
//! answered at the application layer instead of being dropped mid-handshake.
//! The client always validates the server's chain against its own trust
//! anchors.

use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{
    ClientConfig, DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme,
    SupportedProtocolVersion,
};
use thiserror::Error;

use super::config::TlsSettings;
use crate::credentials::CredentialBundle;

/// Session configuration failures. All are fatal to startup; none occur
/// per-connection.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("invalid TLS settings: {0}")]
    Settings(String),

    #[error("no cipher suite matches the configured allowlist")]
    NoMatchingCipherSuite,

    #[error("TLS config error: {0}")]
    Config(String),
}

fn resolve_versions(
    min_version: &str,
) -> Result<Vec<&'static SupportedProtocolVersion>, TlsError> {
    match min_version.trim() {
        "1.2" | "1.2+" => Ok(vec![&rustls::version::TLS13, &rustls::version::TLS12]),
        "1.3" | "1.3+" => Ok(vec![&rustls::version::TLS13]),
        other => Err(TlsError::Settings(format!(
            "unsupported minimum TLS version: {}",
            other
        ))),
    }
}

fn resolve_provider(allowed_suites: &[String]) -> Result<Arc<CryptoProvider>, TlsError> {
    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if allowed_suites.is_empty() {
        return Ok(Arc::new(provider));
    }

    let cipher_suites: Vec<_> = provider
        .cipher_suites
        .iter()
        .copied()
        .filter(|suite| {
            let name = format!("{:?}", suite.suite());
            allowed_suites.iter().any(|allowed| allowed == &name)
        })
        .collect();

    if cipher_suites.is_empty() {
        return Err(TlsError::NoMatchingCipherSuite);
    }

    Ok(Arc::new(CryptoProvider {
        cipher_suites,
        ..provider
    }))
}

/// Strict chain verifier for the post-handshake authorization verdict.
pub fn client_authorizer(
    bundle: &CredentialBundle,
    settings: &TlsSettings,
) -> Result<Arc<dyn ClientCertVerifier>, TlsError> {
    let provider = resolve_provider(&settings.cipher_suites)?;
    WebPkiClientVerifier::builder_with_provider(Arc::new(bundle.root_store()), provider)
        .build()
        .map_err(|e| TlsError::Config(e.to_string()))
}

/// Client-certificate verifier that defers chain validation.
///
/// During the handshake any presented certificate is accepted, and so is
/// none at all; handshake signatures are still checked against the
/// presented leaf. The chain is validated after the handshake completes,
/// which turns a failing peer into a 401 instead of a dropped connection.
#[derive(Debug)]
struct DeferredClientVerifier {
    inner: Arc<dyn ClientCertVerifier>,
}

impl ClientCertVerifier for DeferredClientVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Build the server-role configuration.
pub fn build_server_config(
    bundle: &CredentialBundle,
    settings: &TlsSettings,
) -> Result<Arc<ServerConfig>, TlsError> {
    settings.validate().map_err(TlsError::Settings)?;
    let versions = resolve_versions(&settings.min_tls_version)?;
    let provider = resolve_provider(&settings.cipher_suites)?;

    let builder = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&versions)
        .map_err(|e| TlsError::Config(e.to_string()))?;

    let builder = if settings.require_client_cert {
        let inner = client_authorizer(bundle, settings)?;
        builder.with_client_cert_verifier(Arc::new(DeferredClientVerifier { inner }))
    } else {
        builder.with_no_client_auth()
    };

    let config = builder
        .with_single_cert(bundle.cert_chain.clone(), bundle.key.clone_key())
        .map_err(|e| TlsError::Config(e.to_string()))?;

    Ok(Arc::new(config))
}

/// Build the client-role configuration. The client credential is always
/// presented and the server's chain is always validated.
pub fn build_client_config(
    bundle: &CredentialBundle,
    settings: &TlsSettings,
) -> Result<ClientConfig, TlsError> {
    settings.validate_for_client().map_err(TlsError::Settings)?;
    let versions = resolve_versions(&settings.min_tls_version)?;
    let provider = resolve_provider(&settings.cipher_suites)?;

    ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&versions)
        .map_err(|e| TlsError::Config(e.to_string()))?
        .with_root_certificates(bundle.root_store())
        .with_client_auth_cert(bundle.cert_chain.clone(), bundle.key.clone_key())
        .map_err(|e| TlsError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialPaths;
    use tempfile::tempdir;

    fn test_bundle(dir: &std::path::Path) -> CredentialBundle {
        crate::certgen::generate(dir).unwrap();
        CredentialBundle::load(&CredentialPaths {
            key: dir.join("server.key"),
            certificate: dir.join("server-chain.crt"),
            trust_anchor: dir.join("rootCA.crt"),
        })
        .unwrap()
    }

    #[test]
    fn test_resolve_versions() {
        assert_eq!(resolve_versions("1.2").unwrap().len(), 2);
        assert_eq!(resolve_versions("1.3").unwrap().len(), 1);
        assert!(matches!(
            resolve_versions("1.0"),
            Err(TlsError::Settings(_))
        ));
    }

    #[test]
    fn test_resolve_provider_filters_suites() {
        let all = resolve_provider(&[]).unwrap();
        assert!(!all.cipher_suites.is_empty());

        let one = resolve_provider(&["TLS13_AES_256_GCM_SHA384".to_string()]).unwrap();
        assert_eq!(one.cipher_suites.len(), 1);

        assert!(matches!(
            resolve_provider(&["NOT_A_SUITE".to_string()]),
            Err(TlsError::NoMatchingCipherSuite)
        ));
    }

    #[test]
    fn test_build_server_config() {
        let dir = tempdir().unwrap();
        let bundle = test_bundle(dir.path());
        let config = build_server_config(&bundle, &TlsSettings::default());
        assert!(config.is_ok());
    }

    #[test]
    fn test_build_server_config_without_client_auth() {
        let dir = tempdir().unwrap();
        let bundle = test_bundle(dir.path());
        let settings = TlsSettings {
            require_client_cert: false,
            ..Default::default()
        };
        assert!(build_server_config(&bundle, &settings).is_ok());
    }

    #[test]
    fn test_build_client_config() {
        let dir = tempdir().unwrap();
        let bundle = test_bundle(dir.path());
        assert!(build_client_config(&bundle, &TlsSettings::default()).is_ok());
    }

    #[test]
    fn test_client_config_refuses_downgrade() {
        let dir = tempdir().unwrap();
        let bundle = test_bundle(dir.path());
        let settings = TlsSettings {
            reject_unauthorized: false,
            ..Default::default()
        };
        assert!(matches!(
            build_client_config(&bundle, &settings),
            Err(TlsError::Settings(_))
        ));
    }
}
