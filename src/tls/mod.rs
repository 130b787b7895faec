//! TLS session establishment.
//!
//! Builds mutually-authenticating rustls configurations from explicit
//! settings rather than platform defaults.

pub mod config;
pub mod establisher;

pub use config::TlsSettings;
pub use establisher::{build_client_config, build_server_config, client_authorizer, TlsError};
