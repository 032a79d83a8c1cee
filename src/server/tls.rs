//! TLS acceptor for the secure listener
//!
//! Loads one PEM certificate chain and one private key and offers `h2` and
//! `http/1.1` over ALPN. Protocol versions and ciphers are rustls defaults.

use crate::error::{ServerError, ServerResult};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Build the acceptor used by the secure listener
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> ServerResult<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| ServerError::Tls(format!("Failed to create TLS server config: {err}")))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path, what: &str) -> ServerResult<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|err| {
        ServerError::Tls(format!(
            "Failed to open TLS {what} file '{}': {err}",
            path.display()
        ))
    })
}

fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path, "certificate")?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            ServerError::Tls(format!(
                "Failed to read TLS certificate file '{}': {err}",
                path.display()
            ))
        })?;
    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "TLS certificate file '{}' does not contain any certificates",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path, "key")?)
        .map_err(|err| {
            ServerError::Tls(format!(
                "Failed to read TLS key file '{}': {err}",
                path.display()
            ))
        })?
        .ok_or_else(|| {
            ServerError::Tls(format!(
                "TLS key file '{}' does not contain any usable keys",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_acceptor(&dir.path().join("cert.pem"), &dir.path().join("key.pem"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to open TLS certificate file"));
    }

    #[test]
    fn test_file_without_pem_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "not a certificate\n").unwrap();
        std::fs::write(&key, "not a key\n").unwrap();

        let err = load_acceptor(&cert, &key).err().unwrap();
        assert!(err.to_string().contains("does not contain any certificates"));
        let err = load_key(&key).unwrap_err();
        assert!(err.to_string().contains("does not contain any usable keys"));
    }

    #[test]
    fn test_self_signed_pair_loads() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, certified.cert.pem()).unwrap();
        std::fs::write(&key, certified.key_pair.serialize_pem()).unwrap();

        assert_eq!(load_certs(&cert).unwrap().len(), 1);
        assert!(load_acceptor(&cert, &key).is_ok());
    }
}
