use crate::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::{Certificate, PrivateKey, ServerConfig};
use tokio_rustls::TlsAcceptor;

/// Build a [`TlsAcceptor`] from PEM encoded certificate chain and private key files.
///
/// PKCS#8 keys are tried first, then PKCS#1 RSA keys.
///
/// # Errors
///
/// Returns [`Error::IO`] if a file can't be read and [`Error::TLSConfig`] if it holds no
/// usable certificate or key.
pub fn load_acceptor(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<TlsAcceptor, Error> {
    let mut cert_reader = BufReader::new(File::open(cert_path.as_ref())?);
    let certs = rustls_pemfile::certs(&mut cert_reader)?;
    if certs.is_empty() {
        return Err(Error::TLSConfig(format!(
            "no certificates in {}",
            cert_path.as_ref().display()
        )));
    }

    let mut key_reader = BufReader::new(File::open(key_path.as_ref())?);
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut key_reader)?;
    if keys.is_empty() {
        let mut key_reader = BufReader::new(File::open(key_path.as_ref())?);
        keys = rustls_pemfile::rsa_private_keys(&mut key_reader)?;
    }
    let key = keys.into_iter().next().ok_or_else(|| {
        Error::TLSConfig(format!("no private key in {}", key_path.as_ref().display()))
    })?;

    acceptor_from_der(certs, key)
}

/// Build a [`TlsAcceptor`] from a DER encoded certificate chain and private key.
///
/// # Errors
///
/// Returns [`Error::TLSConfig`] if rustls rejects the certificate/key pair.
pub fn acceptor_from_der(cert_chain: Vec<Vec<u8>>, key: Vec<u8>) -> Result<TlsAcceptor, Error> {
    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(
            cert_chain.into_iter().map(Certificate).collect(),
            PrivateKey(key),
        )
        .map_err(|err| Error::TLSConfig(err.to_string()))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
