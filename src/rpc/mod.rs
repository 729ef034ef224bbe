//! RPC protocol subsystem (`user.v1.UserService` over tonic).
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (tonic Server, max message size, reflection)
//!     → service.rs (UserRpc → UserStore)
//!     → proto.rs (prost messages, generated server/client glue)
//! ```

pub mod descriptor;
pub mod proto;
pub mod server;
pub mod service;

pub use server::RpcServer;
pub use service::UserRpc;
