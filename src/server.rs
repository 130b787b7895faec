//! mTLS HTTP server.
//!
//! Accepts TLS connections, inspects each completed handshake, and serves
//! the single HTTP route with the authorization verdict enforced before
//! any business response.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::server::danger::ClientCertVerifier;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::credentials::CredentialBundle;
use crate::session::SessionDescriptor;
use crate::tls::{build_server_config, client_authorizer, TlsSettings};

/// Body returned to authorized clients.
pub const SUCCESS_BODY: &str = "Hello, secure world with intermediate CA!";

/// A bound TLS listener requiring (but not transport-enforcing) client
/// certificates.
pub struct MtlsServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    authorizer: Arc<dyn ClientCertVerifier>,
    reject_unauthorized: bool,
}

impl MtlsServer {
    pub async fn bind(
        addr: SocketAddr,
        bundle: &CredentialBundle,
        settings: &TlsSettings,
    ) -> Result<Self> {
        let config = build_server_config(bundle, settings)?;
        let authorizer = client_authorizer(bundle, settings)?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(config),
            authorizer,
            reject_unauthorized: settings.reject_unauthorized,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accept connections until the process exits.
    ///
    /// A failed handshake or HTTP exchange only ever takes down its own
    /// connection; the listener keeps accepting.
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let authorizer = Arc::clone(&self.authorizer);
            let reject_unauthorized = self.reject_unauthorized;

            tokio::spawn(async move {
                let tls_stream = match acceptor.accept(stream).await {
                    Ok(tls) => tls,
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                };

                let descriptor =
                    match SessionDescriptor::from_connection(tls_stream.get_ref().1, &authorizer) {
                        Ok(descriptor) => {
                            descriptor.log();
                            Some(descriptor)
                        }
                        Err(e) => {
                            error!(peer = %peer, error = %e, "Session introspection failed");
                            None
                        }
                    };

                let service = service_fn(move |req: Request<Incoming>| {
                    let descriptor = descriptor.clone();
                    async move {
                        Ok::<_, std::convert::Infallible>(respond(
                            descriptor.as_ref(),
                            reject_unauthorized,
                            &req,
                        ))
                    }
                });

                if let Err(e) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(tls_stream), service)
                    .await
                {
                    warn!(peer = %peer, error = %e, "Connection error");
                }
            });
        }
    }
}

/// Answer one request. Every request on the connection passes the
/// authorization check before any business response.
fn respond<B>(
    descriptor: Option<&SessionDescriptor>,
    reject_unauthorized: bool,
    req: &Request<B>,
) -> Response<Full<Bytes>> {
    let Some(descriptor) = descriptor else {
        return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string());
    };

    if reject_unauthorized && !descriptor.authorized {
        let reason = descriptor
            .authorization_error
            .as_deref()
            .unwrap_or("unknown");
        warn!(
            method = %req.method(),
            path = %req.uri().path(),
            error = %reason,
            "Rejecting unauthorized client"
        );
        return plain_response(
            StatusCode::UNAUTHORIZED,
            format!("Client certificate not authorized: {}", reason),
        );
    }

    info!(method = %req.method(), path = %req.uri().path(), "Serving request");
    plain_response(StatusCode::OK, SUCCESS_BODY.to_string())
}

fn plain_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn descriptor(authorized: bool, error: Option<&str>) -> SessionDescriptor {
        SessionDescriptor {
            protocol: "TLSv1.3".to_string(),
            cipher: "TLS13_AES_256_GCM_SHA384".to_string(),
            authorized,
            authorization_error: error.map(String::from),
            peer_subject_cn: Some("client".to_string()),
            peer_issuer_cn: Some("MyIntermediateCA".to_string()),
        }
    }

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let collected = response.into_body().collect().await.unwrap();
        String::from_utf8(collected.to_bytes().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_authorized_request_gets_fixed_body() {
        let req = Request::builder().uri("/").body(()).unwrap();
        let response = respond(Some(&descriptor(true, None)), true, &req);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, SUCCESS_BODY);
    }

    #[tokio::test]
    async fn test_unauthorized_request_gets_401_naming_the_error() {
        let req = Request::builder().uri("/anything").body(()).unwrap();
        let response = respond(
            Some(&descriptor(false, Some("invalid peer certificate: UnknownIssuer"))),
            true,
            &req,
        );
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_of(response).await;
        assert!(body.starts_with("Client certificate not authorized:"));
        assert!(body.contains("UnknownIssuer"));
    }

    #[tokio::test]
    async fn test_unauthorized_peer_allowed_when_enforcement_is_off() {
        let req = Request::builder().uri("/").body(()).unwrap();
        let response = respond(Some(&descriptor(false, Some("expired"))), false, &req);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_a_server_error() {
        let req = Request::builder().uri("/").body(()).unwrap();
        let response = respond(None, true, &req);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, "Server error");
    }
}
