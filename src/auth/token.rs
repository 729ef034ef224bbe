//! HMAC-SHA256 signed bearer tokens.
//!
//! Tokens carry the username, the numeric user id, an expiry and the time
//! the refresh chain started (`orig_iat`). Refreshing needs no password, but
//! only works while `orig_iat + max_refresh` has not passed.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::credentials::Credentials;
use super::{AuthError, Authenticator, Identity, USER_ID_ATTR};
use crate::config::AuthConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub username: String,
    #[serde(rename = "userID")]
    pub user_id: u64,
    pub exp: i64,
    pub orig_iat: i64,
}

/// A freshly signed token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expire: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenStrategy {
    encoding: EncodingKey,
    decoding: DecodingKey,
    timeout_secs: i64,
    max_refresh_secs: i64,
}

impl TokenStrategy {
    pub fn new(signing_key: &[u8], timeout_secs: u64, max_refresh_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            timeout_secs: timeout_secs.try_into().unwrap_or(i64::MAX),
            max_refresh_secs: max_refresh_secs.try_into().unwrap_or(i64::MAX),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.signing_key.as_bytes(),
            config.timeout_secs,
            config.max_refresh_secs,
        )
    }

    /// Token lifetime in seconds, also used as the cookie max-age.
    pub fn timeout_secs(&self) -> i64 {
        self.timeout_secs
    }

    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken, AuthError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let claims = TokenClaims {
            username: identity.subject.clone(),
            user_id: identity.user_id().unwrap_or_default(),
            exp: 0,
            orig_iat: now.timestamp(),
        };
        self.sign(claims, now)
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Exchange a possibly expired token for a fresh one without a password.
    pub fn refresh(&self, token: &str) -> Result<IssuedToken, AuthError> {
        self.refresh_at(token, Utc::now())
    }

    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let mut claims = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if claims.orig_iat.saturating_add(self.max_refresh_secs) < now.timestamp() {
            return Err(AuthError::RefreshExpired);
        }

        claims.orig_iat = now.timestamp();
        self.sign(claims, now)
    }

    fn sign(&self, mut claims: TokenClaims, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let expire = TimeDelta::try_seconds(self.timeout_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                tracing::error!(timeout_secs = self.timeout_secs, "Token expiry out of range");
                AuthError::Signing
            })?;
        claims.exp = expire.timestamp();
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign token");
            AuthError::Signing
        })?;
        Ok(IssuedToken { token, expire })
    }
}

#[async_trait]
impl Authenticator for TokenStrategy {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let token = credentials.token().ok_or(AuthError::MissingToken)?;
        let claims = self.verify(token)?;
        Ok(Identity::new(claims.username).with_attribute(USER_ID_ATTR, claims.user_id.to_string()))
    }
}
