//! Axum middleware guarding protected routes.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::authz::Authorizer;
use super::credentials::Credentials;
use super::{AuthStrategy, Authenticator};
use crate::http::response::ApiError;

/// State required by [`auth_middleware`].
#[derive(Clone)]
pub struct AuthState {
    pub strategy: Arc<AuthStrategy>,
    pub authorizer: Arc<dyn Authorizer>,
    pub realm: String,
    /// Upper bound when buffering a body for credential inspection.
    pub max_body: usize,
}

/// Authenticate the request, authorize the resulting identity, and attach
/// it to the request extensions for the handler.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    // Auto may need the body; buffer it once and hand the same bytes on.
    let (body, buffered) = if state.strategy.reads_body() {
        match axum::body::to_bytes(body, state.max_body).await {
            Ok(bytes) => (Body::from(bytes.clone()), Some(bytes)),
            Err(_) => return ApiError::PayloadTooLarge.into_response(),
        }
    } else {
        (body, None)
    };

    let credentials = Credentials::from_parts(&parts, buffered);
    let identity = match state.strategy.authenticate(&credentials).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(
                path = %parts.uri.path(),
                strategy = %state.strategy.kind(),
                error = %e,
                "Authentication failed"
            );
            let challenge = state.strategy.challenge(&state.realm);
            return ApiError::from_auth(e, Some(challenge)).into_response();
        }
    };

    match state
        .authorizer
        .authorize(&identity.subject, &parts.method, parts.uri.path())
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(subject = %identity.subject, method = %parts.method, path = %parts.uri.path(), "Access denied");
            return ApiError::Forbidden("access denied".into()).into_response();
        }
        Err(e) => {
            tracing::warn!(subject = %identity.subject, error = %e, "Authorization failed");
            return ApiError::Forbidden("access denied".into()).into_response();
        }
    }

    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(identity);
    next.run(req).await
}
