//! TLS configuration and certificate loading.
//!
//! Both listeners share one loader so that missing or malformed PEM material
//! is reported the same way, before any socket is bound.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

/// Failure to load certificate material.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("{kind} file not found: {path:?}")]
    NotFound { kind: &'static str, path: PathBuf },
    #[error("failed to read {kind} file {path:?}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),
    #[error("TLS configuration rejected: {0}")]
    Invalid(String),
}

/// PEM-encoded certificate chain and private key, checked for shape.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

impl TlsMaterial {
    /// Read the files named in `config` and verify they hold at least one
    /// certificate and one private key.
    pub fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let cert_path = Path::new(&config.cert_path);
        let key_path = Path::new(&config.key_path);

        let cert_pem = read_pem("certificate", cert_path)?;
        let key_pem = read_pem("private key", key_path)?;

        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::Read {
                kind: "certificate",
                path: cert_path.to_path_buf(),
                source: e,
            })?;
        if certs.is_empty() {
            return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
        }

        match rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice())) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(TlsError::NoPrivateKey(key_path.to_path_buf())),
            Err(e) => {
                return Err(TlsError::Read {
                    kind: "private key",
                    path: key_path.to_path_buf(),
                    source: e,
                })
            }
        }

        Ok(Self { cert_pem, key_pem })
    }

    /// Rustls acceptor configuration for the HTTP listener.
    pub async fn rustls_config(&self) -> Result<RustlsConfig, TlsError> {
        RustlsConfig::from_pem(self.cert_pem.clone(), self.key_pem.clone())
            .await
            .map_err(|e| TlsError::Invalid(e.to_string()))
    }

    /// Identity for the RPC listener.
    pub fn tonic_identity(&self) -> tonic::transport::Identity {
        tonic::transport::Identity::from_pem(&self.cert_pem, &self.key_pem)
    }
}

fn read_pem(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    if !path.exists() {
        return Err(TlsError::NotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    let mut reader = BufReader::new(File::open(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })?);
    let mut buf = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut buf).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(buf)
}
