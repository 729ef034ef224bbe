//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// REST listener.
    pub http: HttpConfig,

    /// RPC listener.
    pub rpc: RpcConfig,

    /// Authentication strategy and token settings.
    pub auth: AuthConfig,

    /// Cache connection settings.
    pub cache: CacheConfig,

    /// Shutdown trigger settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Accounts loaded into the user store at startup.
    pub users: Vec<SeedUser>,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// How long in-flight requests may run after close before connections are dropped.
    pub drain_timeout_secs: u64,

    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            request_timeout_secs: 30,
            drain_timeout_secs: 10,
            max_body_size: 1024 * 1024,
        }
    }
}

/// RPC listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum encoded message size in bytes, both directions.
    pub max_msg_size: usize,

    /// Upper bound on waiting for in-flight calls during close.
    /// `None` waits until every call has returned.
    pub drain_timeout_secs: Option<u64>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            tls: None,
            max_msg_size: 4 * 1024 * 1024,
            drain_timeout_secs: Some(30),
        }
    }
}

/// TLS material for a listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Which credential verifier protects the `/v1` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Basic,
    Token,
    #[default]
    Auto,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Basic => f.write_str("basic"),
            StrategyKind::Token => f.write_str("token"),
            StrategyKind::Auto => f.write_str("auto"),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Strategy applied to protected routes.
    pub strategy: StrategyKind,

    /// Realm reported in `WWW-Authenticate` challenges.
    pub realm: String,

    /// HMAC-SHA256 signing key for tokens. Required, at least 16 bytes.
    pub signing_key: String,

    /// Token lifetime in seconds.
    pub timeout_secs: u64,

    /// Window after the original issue time during which a token may be refreshed.
    pub max_refresh_secs: u64,

    /// Set the `jwt` cookie on login and refresh.
    pub send_cookie: bool,

    /// Authorization rules. Empty allows every authenticated subject.
    pub policy: Vec<PolicyRule>,
}

/// Grants `subject` access to requests under `path_prefix`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyRule {
    /// User name, or `*` for any authenticated user.
    pub subject: String,

    /// HTTP methods (e.g. `["GET"]`). Empty matches every method.
    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

fn default_path_prefix() -> String {
    "/".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Auto,
            realm: "user-apiserver".to_string(),
            // No usable default: validation rejects an empty key.
            signing_key: String::new(),
            timeout_secs: 3600,
            max_refresh_secs: 3600,
            send_cookie: true,
            policy: Vec::new(),
        }
    }
}

/// Cache connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis URL (e.g., "redis://127.0.0.1:6379"). `None` disables the cache.
    pub url: Option<String>,

    /// Base delay for reconnect backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for reconnect backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

/// Shutdown trigger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Register the OS signal manager (SIGINT/SIGTERM).
    pub handle_signals: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            handle_signals: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// An account seeded into the store at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedUser {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    /// Argon2 PHC string, as printed by `user-apiserver hash-password`.
    pub password_hash: String,

    #[serde(default)]
    pub discord_id: u64,

    #[serde(default)]
    pub total_credits: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.http.bind_address, "0.0.0.0:8080");
        assert_eq!(config.rpc.bind_address, "127.0.0.1:8081");
        assert_eq!(config.rpc.drain_timeout_secs, Some(30));
        assert_eq!(config.auth.strategy, StrategyKind::Auto);
        assert!(config.auth.signing_key.is_empty());
        assert!(config.cache.url.is_none());
        assert!(config.shutdown.handle_signals);
    }

    #[test]
    fn parses_sections() {
        let config: ServerConfig = toml::from_str(
            r#"
            [http]
            bind_address = "127.0.0.1:9000"

            [rpc]
            bind_address = "127.0.0.1:9001"
            max_msg_size = 1024
            tls = { cert_path = "cert.pem", key_path = "key.pem" }

            [auth]
            strategy = "token"
            signing_key = "k"

            [[auth.policy]]
            subject = "alice"
            methods = ["GET"]

            [[users]]
            name = "alice"
            password_hash = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA"
            "#,
        )
        .unwrap();

        assert_eq!(config.http.bind_address, "127.0.0.1:9000");
        assert_eq!(config.rpc.max_msg_size, 1024);
        assert_eq!(config.rpc.tls.unwrap().cert_path, "cert.pem");
        assert_eq!(config.auth.strategy, StrategyKind::Token);
        assert_eq!(config.auth.policy[0].path_prefix, "/");
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].total_credits, 0);
    }
}
