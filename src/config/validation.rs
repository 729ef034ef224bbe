//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, value ranges and seed accounts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use argon2::password_hash::PasswordHash;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Shortest accepted token signing key, in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 16;

/// Upper bound for token lifetime and refresh window (10 years).
pub const MAX_TOKEN_SECS: u64 = 10 * 365 * 24 * 3600;

/// Upper bound for listener drain timeouts.
pub const MAX_DRAIN_SECS: u64 = 3600;

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let http_addr = check_address(&mut errors, "http.bind_address", &config.http.bind_address);
    let rpc_addr = check_address(&mut errors, "rpc.bind_address", &config.rpc.bind_address);
    if let (Some(http), Some(rpc)) = (http_addr, rpc_addr) {
        if http == rpc && http.port() != 0 {
            errors.push(ValidationError::new(
                "rpc.bind_address",
                "must differ from http.bind_address",
            ));
        }
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be > 0"));
    }
    if config.http.drain_timeout_secs > MAX_DRAIN_SECS {
        errors.push(ValidationError::new(
            "http.drain_timeout_secs",
            format!("must be <= {MAX_DRAIN_SECS}"),
        ));
    }
    if config.rpc.drain_timeout_secs.is_some_and(|secs| secs > MAX_DRAIN_SECS) {
        errors.push(ValidationError::new(
            "rpc.drain_timeout_secs",
            format!("must be <= {MAX_DRAIN_SECS}"),
        ));
    }
    if config.http.max_body_size == 0 {
        errors.push(ValidationError::new("http.max_body_size", "must be > 0"));
    }
    if config.rpc.max_msg_size == 0 {
        errors.push(ValidationError::new("rpc.max_msg_size", "must be > 0"));
    }

    if config.auth.signing_key.is_empty() {
        errors.push(ValidationError::new("auth.signing_key", "must be set"));
    } else if config.auth.signing_key.len() < MIN_SIGNING_KEY_LEN {
        errors.push(ValidationError::new(
            "auth.signing_key",
            format!("must be at least {MIN_SIGNING_KEY_LEN} bytes"),
        ));
    }
    if config.auth.timeout_secs == 0 {
        errors.push(ValidationError::new("auth.timeout_secs", "must be > 0"));
    } else if config.auth.timeout_secs > MAX_TOKEN_SECS {
        errors.push(ValidationError::new(
            "auth.timeout_secs",
            format!("must be <= {MAX_TOKEN_SECS}"),
        ));
    }
    if config.auth.max_refresh_secs > MAX_TOKEN_SECS {
        errors.push(ValidationError::new(
            "auth.max_refresh_secs",
            format!("must be <= {MAX_TOKEN_SECS}"),
        ));
    }

    for (i, rule) in config.auth.policy.iter().enumerate() {
        let field = format!("auth.policy[{i}]");
        if rule.subject.is_empty() {
            errors.push(ValidationError::new(&field, "subject must not be empty"));
        }
        for method in &rule.methods {
            if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::new(&field, format!("invalid method '{method}'")));
            }
        }
        if !rule.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(&field, "path_prefix must start with '/'"));
        }
    }

    if let Some(url) = &config.cache.url {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::new("cache.url", format!("invalid URL '{url}'")));
        }
    }
    if config.cache.base_delay_ms > config.cache.max_delay_ms {
        errors.push(ValidationError::new(
            "cache.base_delay_ms",
            "must not exceed cache.max_delay_ms",
        ));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let mut seen = HashSet::new();
    for (i, user) in config.users.iter().enumerate() {
        let field = format!("users[{i}]");
        if user.name.is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !seen.insert(user.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate user '{}'", user.name),
            ));
        }
        if PasswordHash::new(&user.password_hash).is_err() {
            errors.push(ValidationError::new(
                &field,
                "password_hash is not a PHC string",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) -> Option<SocketAddr> {
    match value.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::new(
                field,
                format!("'{value}' is not a socket address"),
            ));
            None
        }
    }
}
