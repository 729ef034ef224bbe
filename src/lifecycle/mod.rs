//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     ApiServer::new → prepare_run (routes, cache loop, cleanup callbacks)
//!         → run (bind HTTP, run RPC, start managers, serve HTTP)
//!
//! Shutdown (shutdown.rs):
//!     first manager trigger → gate → callbacks in order → report
//!
//! Managers (managers.rs):
//!     SIGTERM/SIGINT → SignalManager → trigger
//!     ManualManager::trigger → trigger
//! ```
//!
//! # Design Decisions
//! - Ordered startup: listeners bind before managers start watching
//! - Ordered shutdown: stop accepting and drain, then release shared resources
//! - Exactly one run of the cleanup chain per process

pub mod managers;
pub mod shutdown;
pub mod startup;

pub use managers::{ManualManager, ShutdownManager, SignalManager};
pub use shutdown::{
    CallbackError, CallbackFailure, ShutdownCoordinator, ShutdownError, ShutdownReport, ShutdownTrigger,
};
pub use startup::{ApiServer, PreparedApiServer, ServerState};
