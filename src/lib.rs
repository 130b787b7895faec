//! Mutual-TLS handshake verification between a single client and a single
//! server.
//!
//! Both processes load pre-provisioned PEM credentials, establish a TLS
//! session requiring mutual authentication, and exchange one HTTP
//! request/response. The server inspects each negotiated session
//! (protocol, cipher, peer identity, authorization verdict) and enforces
//! the verdict at the application layer: a peer whose certificate does not
//! chain to the trust anchor completes the handshake but is answered 401.

pub mod certgen;
pub mod client;
pub mod credentials;
pub mod server;
pub mod session;
pub mod tls;
