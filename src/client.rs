//! mTLS HTTP client.
//!
//! Establishes one mutually-authenticated TLS session, performs a single
//! GET within a bounded timeout, and classifies the outcome exhaustively.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::credentials::CredentialBundle;
use crate::tls::{build_client_config, TlsSettings};

/// A response arrived. The status code may be anything, 401 included.
#[derive(Debug, Clone)]
pub struct ExchangeReport {
    pub status: u16,
    pub body: String,
}

/// Failure classification for a single exchange. The variants are
/// mutually exclusive: the request timed out, went out but produced no
/// HTTP response, or was never sent at all.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("no response within {limit:?}")]
    Timeout { limit: Duration },

    #[error("no response received: {detail}")]
    NoResponse {
        detail: String,
        /// Deepest nested cause, e.g. the certificate-verification
        /// failure beneath a connect error.
        cause: Option<String>,
    },

    #[error("request could not be sent: {0}")]
    Request(String),
}

/// Issue one GET over a fresh mutually-authenticated session.
///
/// The client credential is always presented and the server's chain is
/// always validated against the bundle's trust anchors; there is no
/// insecure fallback. No retry is performed on any failure.
pub async fn exchange(
    url: &str,
    bundle: &CredentialBundle,
    settings: &TlsSettings,
    timeout: Duration,
) -> Result<ExchangeReport, ExchangeError> {
    let config =
        build_client_config(bundle, settings).map_err(|e| ExchangeError::Request(e.to_string()))?;

    let client = reqwest::Client::builder()
        .use_preconfigured_tls(config)
        .timeout(timeout)
        .build()
        .map_err(|e| ExchangeError::Request(e.to_string()))?;

    debug!(url = %url, "Sending request");
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return Err(classify(e, timeout)),
    };

    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| ExchangeError::NoResponse {
        detail: "response body could not be read".to_string(),
        cause: underlying_cause(&e),
    })?;

    Ok(ExchangeReport { status, body })
}

fn classify(error: reqwest::Error, timeout: Duration) -> ExchangeError {
    if error.is_timeout() {
        return ExchangeError::Timeout { limit: timeout };
    }

    // Connection reset, refused, or a TLS handshake failure before any
    // HTTP response.
    if error.is_connect() || error.is_request() {
        return ExchangeError::NoResponse {
            detail: error.to_string(),
            cause: underlying_cause(&error),
        };
    }

    ExchangeError::Request(error.to_string())
}

/// Deepest nested cause, surfaced separately from the top-level message.
fn underlying_cause(error: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut source = error.source();
    let mut deepest = None;
    while let Some(cause) = source {
        deepest = Some(cause.to_string());
        source = cause.source();
    }
    deepest
}
