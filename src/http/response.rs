//! Error responses.
//!
//! Every failure leaves the server as `{"message": "..."}` with a status
//! code. Internal details are logged, not returned.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Unauthorized {
        message: String,
        challenge: Option<String>,
    },
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("{0}")]
    Unavailable(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map an auth failure, attaching `challenge` to 401s.
    pub fn from_auth(err: AuthError, challenge: Option<String>) -> Self {
        match err {
            AuthError::StoreUnavailable => ApiError::Unavailable(err.to_string()),
            AuthError::Signing => ApiError::Internal,
            other => ApiError::Unauthorized {
                message: other.to_string(),
                challenge,
            },
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::from_auth(err, None)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            StoreError::Unavailable(reason) => {
                tracing::error!(%reason, "Store unavailable");
                ApiError::Unavailable("user store unavailable".into())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let mut response = (status, Json(ErrorBody { message: &message })).into_response();
        if let ApiError::Unauthorized {
            challenge: Some(challenge),
            ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(challenge) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_carries_challenge() {
        let err = ApiError::from_auth(
            AuthError::AuthenticationFailed,
            Some("Basic realm=\"test\"".into()),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"test\""
        );
        assert_eq!(
            body_of(response).await["message"],
            "incorrect username or password"
        );
    }

    #[tokio::test]
    async fn store_errors_map_to_status() {
        let cases = [
            (StoreError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (StoreError::AlreadyExists("a".into()), StatusCode::CONFLICT),
            (StoreError::Unavailable("closed".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let response = ApiError::from(AuthError::Signing).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await["message"], "internal server error");
    }
}
