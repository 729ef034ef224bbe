//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → sections handed to each subsystem at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{check_config, load_config, read_config, ConfigError};
pub use schema::{
    AuthConfig, CacheConfig, HttpConfig, LogFormat, ObservabilityConfig, PolicyRule, RpcConfig, SeedUser,
    ServerConfig, ShutdownConfig, StrategyKind, TlsConfig,
};
