//! Listener binding shared by both protocol servers.
//!
//! Binding happens synchronously in the caller so that an occupied port is
//! reported before anything is spawned.

use std::net::{SocketAddr, TcpListener};

use crate::error::{Protocol, ServerError};

/// Bind a non-blocking std listener on `address`.
pub fn bind(protocol: Protocol, address: &str) -> Result<TcpListener, ServerError> {
    let bind_err = |source| ServerError::Bind {
        protocol,
        address: address.to_string(),
        source,
    };

    let addr: SocketAddr = address
        .parse()
        .map_err(|e| bind_err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

    let listener = TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;

    let local_addr = listener.local_addr().map_err(bind_err)?;
    tracing::info!(%protocol, address = %local_addr, "Listener bound");

    Ok(listener)
}
