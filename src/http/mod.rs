//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum-server, request ID, trace, timeout, body limit)
//!     → handlers.rs
//!         /login, /refresh_token, /logout, /healthz (public)
//!         /v1/users/* → auth middleware → handler
//!     → response.rs (errors as {"message"} JSON)
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use handlers::{routes, AppState};
pub use response::ApiError;
pub use server::{HttpServer, ListenerState};
