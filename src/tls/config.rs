//! TLS session settings.

use serde::{Deserialize, Serialize};

/// Explicit TLS parameters shared by both session roles.
///
/// Nothing here falls back to platform defaults silently: the minimum
/// protocol version and the cipher-suite allowlist are always applied when
/// a session configuration is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSettings {
    /// Minimum accepted TLS version: "1.2" or "1.3".
    #[serde(default = "default_min_version")]
    pub min_tls_version: String,

    /// Allowed cipher suites by name (e.g. "TLS13_AES_256_GCM_SHA384").
    /// Empty means the crypto provider's defaults.
    #[serde(default)]
    pub cipher_suites: Vec<String>,

    /// Request a client certificate on every accepted connection.
    #[serde(default = "default_true")]
    pub require_client_cert: bool,

    /// Enforce the authorization verdict. The server answers 401 on
    /// unauthorized peers; the client refuses to run with this disabled.
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,
}

fn default_min_version() -> String {
    "1.2".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            min_tls_version: default_min_version(),
            cipher_suites: vec![],
            require_client_cert: true,
            reject_unauthorized: true,
        }
    }
}

impl TlsSettings {
    /// Validate settings common to both roles.
    pub fn validate(&self) -> Result<(), String> {
        match self.min_tls_version.trim() {
            "1.2" | "1.2+" | "1.3" | "1.3+" => Ok(()),
            other => Err(format!("unsupported minimum TLS version: {}", other)),
        }
    }

    /// Client-role validation. Server-certificate verification can never
    /// be switched off on the client side.
    pub fn validate_for_client(&self) -> Result<(), String> {
        self.validate()?;
        if !self.reject_unauthorized {
            return Err("server certificate verification cannot be disabled".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = TlsSettings::default();
        assert_eq!(settings.min_tls_version, "1.2");
        assert!(settings.cipher_suites.is_empty());
        assert!(settings.require_client_cert);
        assert!(settings.reject_unauthorized);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_min_version() {
        let settings = TlsSettings {
            min_tls_version: "1.1".to_string(),
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.contains("1.1"));
    }

    #[test]
    fn test_client_cannot_disable_verification() {
        let settings = TlsSettings {
            reject_unauthorized: false,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
        assert!(settings.validate_for_client().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let settings: TlsSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.min_tls_version, "1.2");
        assert!(settings.reject_unauthorized);
    }
}
