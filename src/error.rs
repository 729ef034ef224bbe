//! Server-level errors.

use std::fmt;

use crate::auth::AuthzError;
use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::lifecycle::ShutdownError;
use crate::net::TlsError;

/// Which protocol server an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Rpc,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Rpc => f.write_str("rpc"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{protocol} server failed to bind {address}: {source}")]
    Bind {
        protocol: Protocol,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{protocol} server TLS setup failed: {source}")]
    Tls {
        protocol: Protocol,
        #[source]
        source: TlsError,
    },

    #[error("http server error: {0}")]
    Http(#[source] std::io::Error),

    #[error("rpc server error: {0}")]
    Rpc(#[from] tonic::transport::Error),

    #[error("{protocol} server did not drain within {secs}s")]
    DrainTimeout { protocol: Protocol, secs: u64 },

    #[error("{0} server is already running")]
    AlreadyRunning(Protocol),

    #[error("{0} server is closed")]
    Closed(Protocol),

    #[error("rpc reflection setup failed: {0}")]
    Reflection(String),

    #[error("invalid authorization policy: {0}")]
    Policy(#[from] AuthzError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}
