//! Per-request strategy selection.

use async_trait::async_trait;

use super::basic::BasicStrategy;
use super::credentials::{CredentialKind, Credentials};
use super::token::TokenStrategy;
use super::{AuthError, Authenticator, Identity};

/// Routes each request to the Basic or Token verifier by the shape of its
/// credentials: a Basic header, then a login body, then a token.
#[derive(Clone)]
pub struct AutoStrategy {
    basic: BasicStrategy,
    token: TokenStrategy,
}

impl AutoStrategy {
    pub fn new(basic: BasicStrategy, token: TokenStrategy) -> Self {
        Self { basic, token }
    }
}

#[async_trait]
impl Authenticator for AutoStrategy {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        match credentials.kind() {
            CredentialKind::Basic => self.basic.authenticate(credentials).await,
            CredentialKind::Login => self.basic.login(credentials).await,
            CredentialKind::Token => self.token.authenticate(credentials).await,
        }
    }
}
