//! Network foundation shared by the HTTP and RPC servers.
//!
//! # Data Flow
//! ```text
//! config address
//!     → listener.rs (parse, bind, non-blocking std listener)
//!     → tls.rs (optional PEM cert/key → rustls / tonic identity)
//!     → handed to the protocol server
//! ```

pub mod listener;
pub mod tls;

pub use listener::bind;
pub use tls::{TlsError, TlsMaterial};
