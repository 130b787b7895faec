//! Certificate chain generation.
//!
//! Produces the pre-provisioned PEM material both processes load: a root
//! CA, an intermediate CA, server and client leaf certificates signed by
//! the intermediate, and the chain bundles. Also the fixture factory for
//! the test suite.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use tracing::info;

struct Issued {
    cert: Certificate,
    key: KeyPair,
}

fn issue_ca(
    common_name: &str,
    path_len: u8,
    issuer: Option<&Issued>,
) -> Result<Issued> {
    let key = KeyPair::generate()
        .with_context(|| format!("failed to generate key for {}", common_name))?;

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(path_len));
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let cert = match issuer {
        Some(issuer) => params.signed_by(&key, &issuer.cert, &issuer.key),
        None => params.self_signed(&key),
    }
    .with_context(|| format!("failed to issue CA certificate {}", common_name))?;

    Ok(Issued { cert, key })
}

fn issue_leaf(
    common_name: &str,
    subject_alt_names: &[&str],
    eku: ExtendedKeyUsagePurpose,
    issuer: &Issued,
) -> Result<Issued> {
    let key = KeyPair::generate()
        .with_context(|| format!("failed to generate key for {}", common_name))?;

    let sans: Vec<String> = subject_alt_names.iter().map(|s| s.to_string()).collect();
    let mut params =
        CertificateParams::new(sans).context("invalid subject alternative names")?;
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![eku];

    let cert = params
        .signed_by(&key, &issuer.cert, &issuer.key)
        .with_context(|| format!("failed to issue leaf certificate {}", common_name))?;

    Ok(Issued { cert, key })
}

fn write_pem(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Generate the full chain into `dir`.
///
/// The root may sign one intermediate below itself; the intermediate may
/// only sign leaves. The server leaf carries the names the client dials,
/// so the demo works against localhost out of the box.
pub fn generate(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let root = issue_ca("MyRootCA", 2, None)?;
    let intermediate = issue_ca("MyIntermediateCA", 0, Some(&root))?;
    let server = issue_leaf(
        "localhost",
        &["localhost", "127.0.0.1"],
        ExtendedKeyUsagePurpose::ServerAuth,
        &intermediate,
    )?;
    let client = issue_leaf("client", &[], ExtendedKeyUsagePurpose::ClientAuth, &intermediate)?;

    write_pem(dir, "rootCA.key", &root.key.serialize_pem())?;
    write_pem(dir, "rootCA.crt", &root.cert.pem())?;
    write_pem(dir, "intermediateCA.key", &intermediate.key.serialize_pem())?;
    write_pem(dir, "intermediateCA.crt", &intermediate.cert.pem())?;

    write_pem(dir, "server.key", &server.key.serialize_pem())?;
    write_pem(dir, "server.crt", &server.cert.pem())?;
    write_pem(
        dir,
        "server-chain.crt",
        &[server.cert.pem(), intermediate.cert.pem()].concat(),
    )?;

    write_pem(dir, "client.key", &client.key.serialize_pem())?;
    write_pem(dir, "client.crt", &client.cert.pem())?;
    write_pem(
        dir,
        "client-chain.crt",
        &[client.cert.pem(), intermediate.cert.pem()].concat(),
    )?;

    write_pem(
        dir,
        "ca-chain.crt",
        &[root.cert.pem(), intermediate.cert.pem()].concat(),
    )?;

    info!(dir = %dir.display(), "Certificate generation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;
    use tempfile::tempdir;

    fn count_certs(path: &Path) -> usize {
        let file = std::fs::File::open(path).unwrap();
        let mut reader = BufReader::new(file);
        rustls_pemfile::certs(&mut reader).count()
    }

    #[test]
    fn test_generate_writes_all_files() {
        let dir = tempdir().unwrap();
        generate(dir.path()).unwrap();

        for name in [
            "rootCA.key",
            "rootCA.crt",
            "intermediateCA.key",
            "intermediateCA.crt",
            "server.key",
            "server.crt",
            "server-chain.crt",
            "client.key",
            "client.crt",
            "client-chain.crt",
            "ca-chain.crt",
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
    }

    #[test]
    fn test_chain_files_hold_two_certificates() {
        let dir = tempdir().unwrap();
        generate(dir.path()).unwrap();

        assert_eq!(count_certs(&dir.path().join("server.crt")), 1);
        assert_eq!(count_certs(&dir.path().join("server-chain.crt")), 2);
        assert_eq!(count_certs(&dir.path().join("client-chain.crt")), 2);
        assert_eq!(count_certs(&dir.path().join("ca-chain.crt")), 2);
    }

    #[test]
    fn test_generated_chains_are_distinct_per_run() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        generate(first.path()).unwrap();
        generate(second.path()).unwrap();

        let a = std::fs::read(first.path().join("rootCA.crt")).unwrap();
        let b = std::fs::read(second.path().join("rootCA.crt")).unwrap();
        assert_ne!(a, b, "independent runs must not share key material");
    }
}
