//! TLS server configuration.
//!
//! Builds a `TlsAcceptor` from a PEM certificate chain and a PKCS#8
//! private key, restricted to TLS 1.2. Key-exchange parameters are the
//! library's own (ephemeral, single-use); there is nothing to configure.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;
use tracing::error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read TLS material: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("no usable private key found")]
    MissingKey,

    #[error("invalid TLS configuration: {source}")]
    Config {
        #[from]
        source: rustls::Error,
    },
}

/// Builds an acceptor from in-memory PEM blobs.
pub fn acceptor_from_pem(cert_chain: &[u8], private_key: &[u8]) -> Result<TlsAcceptor, TlsError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut io::BufReader::new(cert_chain))
        .collect::<Result<_, _>>()
        .map_err(|err| {
            error!("failed to parse TLS certificate chain: {err}");
            TlsError::from(err)
        })?;

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut io::BufReader::new(private_key))
        .map_err(|err| {
            error!("failed to parse TLS private key: {err}");
            TlsError::from(err)
        })?
        .ok_or(TlsError::MissingKey)?;

    let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| {
            error!("failed to create the TLS server config: {err}");
            TlsError::from(err)
        })?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds an acceptor from PEM files on disk.
pub fn acceptor_from_files(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_chain = std::fs::read(cert_path).map_err(|err| {
        error!("failed to open TLS certificate file '{}': {err}", cert_path.display());
        TlsError::from(err)
    })?;
    let private_key = std::fs::read(key_path).map_err(|err| {
        error!("failed to open TLS key file '{}': {err}", key_path.display());
        TlsError::from(err)
    })?;
    acceptor_from_pem(&cert_chain, &private_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported() {
        let result = acceptor_from_pem(b"", b"");
        assert!(matches!(result, Err(TlsError::MissingKey)));
    }
}
