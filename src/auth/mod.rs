//! Authentication and authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → credentials.rs (Authorization header, ?token=, jwt cookie, body)
//!     → AuthStrategy (resolved once from config)
//!         Basic → basic.rs (decode header, store lookup, password check)
//!         Token → token.rs (HMAC-SHA256 verify, username claim)
//!         Auto  → auto.rs  (Basic header > login body > token)
//!     → Identity
//!     → authz.rs (subject, method, path) → allow / deny
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Closed set of strategies; dispatch is a `match`, not a type lookup
//! - Unknown user and wrong password collapse into one error
//! - Authorization fails closed

pub mod authz;
pub mod auto;
pub mod basic;
pub mod credentials;
pub mod middleware;
pub mod token;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

pub use authz::{AllowAll, Authorizer, AuthzError, StaticPolicy};
pub use auto::AutoStrategy;
pub use basic::BasicStrategy;
pub use credentials::{CredentialKind, Credentials, LoginInfo};
pub use middleware::{auth_middleware, AuthState};
pub use token::{IssuedToken, TokenClaims, TokenStrategy};

use crate::config::StrategyKind;

/// Attribute key holding the numeric user id.
pub const USER_ID_ATTR: &str = "userID";

/// A verified principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub attributes: HashMap<String, String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn user_id(&self) -> Option<u64> {
        self.attributes.get(USER_ID_ATTR)?.parse().ok()
    }
}

/// Per-request authentication failures. Messages are safe to show clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid basic authorization header")]
    MalformedHeader,
    #[error("missing username or password")]
    MissingCredentials,
    #[error("incorrect username or password")]
    AuthenticationFailed,
    #[error("no token found in header, query or cookie")]
    MissingToken,
    #[error("token is invalid")]
    InvalidToken,
    #[error("token is expired")]
    TokenExpired,
    #[error("token is too old to refresh")]
    RefreshExpired,
    #[error("user store unavailable")]
    StoreUnavailable,
    #[error("failed to sign token")]
    Signing,
}

impl AuthError {
    /// Label used in metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MalformedHeader => "malformed_header",
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::AuthenticationFailed => "failed",
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::TokenExpired => "expired",
            AuthError::RefreshExpired => "refresh_expired",
            AuthError::StoreUnavailable => "store_unavailable",
            AuthError::Signing => "signing",
        }
    }
}

/// Verifies the credential material of a request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError>;
}

/// The strategy protecting a route group, resolved at construction.
#[derive(Clone)]
pub enum AuthStrategy {
    Basic(BasicStrategy),
    Token(TokenStrategy),
    Auto(AutoStrategy),
}

impl AuthStrategy {
    pub fn new(kind: StrategyKind, basic: BasicStrategy, token: TokenStrategy) -> Self {
        match kind {
            StrategyKind::Basic => AuthStrategy::Basic(basic),
            StrategyKind::Token => AuthStrategy::Token(token),
            StrategyKind::Auto => AuthStrategy::Auto(AutoStrategy::new(basic, token)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            AuthStrategy::Basic(_) => StrategyKind::Basic,
            AuthStrategy::Token(_) => StrategyKind::Token,
            AuthStrategy::Auto(_) => StrategyKind::Auto,
        }
    }

    /// Whether the strategy may read credentials from the request body.
    pub fn reads_body(&self) -> bool {
        matches!(self, AuthStrategy::Auto(_))
    }

    /// `WWW-Authenticate` challenge for a 401 response.
    pub fn challenge(&self, realm: &str) -> String {
        match self {
            AuthStrategy::Basic(_) => format!("Basic realm=\"{realm}\""),
            AuthStrategy::Token(_) | AuthStrategy::Auto(_) => format!("Bearer realm=\"{realm}\""),
        }
    }
}

#[async_trait]
impl Authenticator for AuthStrategy {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let result = match self {
            AuthStrategy::Basic(s) => s.authenticate(credentials).await,
            AuthStrategy::Token(s) => s.authenticate(credentials).await,
            AuthStrategy::Auto(s) => s.authenticate(credentials).await,
        };
        crate::observability::metrics::record_auth(
            self.kind(),
            result.as_ref().err().map_or("success", AuthError::reason),
        );
        result
    }
}
