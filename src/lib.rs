//! User account API server over HTTP and RPC.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;
pub mod store;

pub use config::schema::ServerConfig;
pub use error::ServerError;
pub use lifecycle::{ApiServer, PreparedApiServer, ShutdownCoordinator};
