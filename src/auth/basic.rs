//! Username/password verification against the user store.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use super::credentials::{parse_basic, Credentials, LoginInfo};
use super::{AuthError, Authenticator, Identity, USER_ID_ATTR};
use crate::store::{self, StoreError, UserStore};

/// Verifies `Authorization: Basic` credentials.
#[derive(Clone)]
pub struct BasicStrategy {
    store: Arc<dyn UserStore>,
}

impl BasicStrategy {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Login-style verification: the Basic header when an `Authorization`
    /// header is present, otherwise a `{username, password}` JSON body.
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let login = match credentials.authorization.as_deref() {
            Some(header) => parse_basic(header)?,
            None => credentials.login_body().ok_or(AuthError::MissingCredentials)?,
        };
        self.verify(login).await
    }

    /// Look the user up and check the password.
    pub async fn verify(&self, login: LoginInfo) -> Result<Identity, AuthError> {
        let user = match self.store.get_by_username(&login.username).await {
            Ok(user) => user,
            Err(StoreError::Unavailable(reason)) => {
                tracing::error!(%reason, "User lookup failed");
                return Err(AuthError::StoreUnavailable);
            }
            Err(e) => {
                tracing::debug!(username = %login.username, error = %e, "User lookup failed");
                // Same work as a real comparison so timing does not reveal
                // whether the account exists.
                let password = login.password;
                let _ = tokio::task::spawn_blocking(move || {
                    store::verify_password(&password, dummy_hash())
                })
                .await;
                return Err(AuthError::AuthenticationFailed);
            }
        };

        let password = login.password;
        let (user, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = user.compare(&password);
            (user, outcome)
        })
        .await
        .map_err(|_| AuthError::AuthenticationFailed)?;

        if let Err(e) = outcome {
            tracing::debug!(username = %user.name, error = %e, "Password check failed");
            return Err(AuthError::AuthenticationFailed);
        }

        Ok(Identity::new(user.name).with_attribute(USER_ID_ATTR, user.id.to_string()))
    }
}

#[async_trait]
impl Authenticator for BasicStrategy {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let header = credentials
            .authorization
            .as_deref()
            .ok_or(AuthError::MalformedHeader)?;
        let login = parse_basic(header)?;
        self.verify(login).await
    }
}

fn dummy_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| store::hash_password("dummy-password").unwrap_or_default())
}
