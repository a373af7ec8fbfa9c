//! Certificates for the HTTPS listener

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer};
use rustls::ServerConfig;
use tracing::{debug, info};

use crate::error::{FixtureError, FixtureResult};

pub const CERT_FILE: &str = "https-snakeoil.crt";
pub const KEY_FILE: &str = "https-snakeoil.key";

/// Server config from the snakeoil pair in `certs_dir` when both files
/// exist, otherwise from a freshly generated self-signed certificate
pub fn server_config(certs_dir: &Path) -> FixtureResult<Arc<ServerConfig>> {
    let crt = certs_dir.join(CERT_FILE);
    let key = certs_dir.join(KEY_FILE);

    let (chain, key) = if crt.is_file() && key.is_file() {
        debug!("loading fixture certificate from {}", crt.display());
        (load_certs(&crt)?, load_key(&key)?)
    } else {
        info!(
            "no certificate in {}, generating a self-signed one",
            certs_dir.display()
        );
        generate()?
    };

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(chain, key)?;

    Ok(Arc::new(config))
}

fn read_pem(path: &Path) -> FixtureResult<Vec<pem::Pem>> {
    let bytes = std::fs::read(path).map_err(|source| FixtureError::ReadCertificate {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(pem::parse_many(bytes)?)
}

fn load_certs(path: &Path) -> FixtureResult<Vec<CertificateDer<'static>>> {
    let certs: Vec<_> = read_pem(path)?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| CertificateDer::from(p.into_contents()))
        .collect();
    if certs.is_empty() {
        return Err(FixtureError::InvalidCertificate {
            path: path.to_path_buf(),
            reason: "no CERTIFICATE block".into(),
        });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> FixtureResult<PrivateKeyDer<'static>> {
    read_pem(path)?
        .into_iter()
        .find_map(|p| match p.tag() {
            "PRIVATE KEY" => Some(PrivatePkcs8KeyDer::from(p.into_contents()).into()),
            "RSA PRIVATE KEY" => Some(PrivatePkcs1KeyDer::from(p.into_contents()).into()),
            "EC PRIVATE KEY" => Some(PrivateSec1KeyDer::from(p.into_contents()).into()),
            _ => None,
        })
        .ok_or_else(|| FixtureError::InvalidCertificate {
            path: path.to_path_buf(),
            reason: "no private key block".into(),
        })
}

fn generate() -> FixtureResult<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])?;
    let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
    Ok((vec![certified.cert.der().clone()], key.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_without_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(server_config(dir.path()).is_ok());
    }

    #[test]
    fn test_loads_pem_pair() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        std::fs::write(dir.path().join(CERT_FILE), certified.cert.pem()).unwrap();
        std::fs::write(dir.path().join(KEY_FILE), certified.key_pair.serialize_pem()).unwrap();

        assert_eq!(load_certs(&dir.path().join(CERT_FILE)).unwrap().len(), 1);
        assert!(server_config(dir.path()).is_ok());
    }

    #[test]
    fn test_rejects_file_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        std::fs::write(dir.path().join(CERT_FILE), certified.cert.pem()).unwrap();
        std::fs::write(dir.path().join(KEY_FILE), certified.cert.pem()).unwrap();

        let err = server_config(dir.path()).unwrap_err();
        assert!(matches!(err, FixtureError::InvalidCertificate { .. }));
    }
}
