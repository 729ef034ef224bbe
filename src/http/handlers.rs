//! REST handlers: token endpoints, user resources and health.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::credentials::TOKEN_COOKIE;
use crate::auth::{auth_middleware, AuthState, BasicStrategy, Credentials, Identity, IssuedToken, TokenStrategy};
use crate::cache::CacheClient;
use crate::http::response::ApiError;
use crate::store::{self, ListOptions, User, UserList, UserStore};

/// Shared state for the REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub basic: BasicStrategy,
    pub tokens: TokenStrategy,
    pub cache: Option<CacheClient>,
    pub realm: String,
    pub send_cookie: bool,
    pub secure_cookie: bool,
}

/// Public token endpoints plus the `/v1` resources behind `auth`.
pub fn routes(state: AppState, auth: AuthState) -> Router {
    let protected = Router::new()
        .route("/v1/users", get(list_users).post(create_user))
        .route("/v1/users/{name}", get(get_user).delete(delete_user))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/login", post(login))
        .route("/refresh_token", post(refresh_token))
        .route("/logout", post(logout))
        .route("/healthz", get(healthz))
        .merge(protected)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
    expire: String,
}

impl AppState {
    fn token_response(&self, issued: IssuedToken) -> Response {
        let mut response = Json(TokenResponse {
            expire: issued.expire.to_rfc3339_opts(SecondsFormat::Secs, true),
            token: issued.token.clone(),
        })
        .into_response();

        if self.send_cookie {
            let cookie = self.cookie(&issued.token, self.tokens.timeout_secs());
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
        }
        response
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!("{TOKEN_COOKIE}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn login_challenge(&self) -> Option<String> {
        Some(format!("Basic realm=\"{}\"", self.realm))
    }
}

async fn login(State(state): State<AppState>, parts: Parts, body: Bytes) -> Result<Response, ApiError> {
    let credentials = Credentials::from_parts(&parts, Some(body));
    let identity = state
        .basic
        .login(&credentials)
        .await
        .map_err(|e| ApiError::from_auth(e, state.login_challenge()))?;

    let issued = state.tokens.issue(&identity)?;
    tracing::info!(user = %identity.subject, "Login succeeded");
    Ok(state.token_response(issued))
}

async fn refresh_token(State(state): State<AppState>, parts: Parts) -> Result<Response, ApiError> {
    let credentials = Credentials::from_parts(&parts, None);
    let token = credentials.token().ok_or(crate::auth::AuthError::MissingToken)?;
    let issued = state.tokens.refresh(token)?;
    Ok(state.token_response(issued))
}

async fn logout(State(state): State<AppState>) -> Response {
    let mut headers = HeaderMap::new();
    if state.send_cookie {
        if let Ok(value) = HeaderValue::from_str(&state.cookie("", -1)) {
            headers.insert(header::SET_COOKIE, value);
        }
    }
    (StatusCode::OK, headers, Json(serde_json::Value::Null)).into_response()
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    cache: &'static str,
    time: String,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    let cache = match &state.cache {
        None => "disabled",
        Some(c) if c.is_connected() => "connected",
        Some(_) => "connecting",
    };
    Json(Health {
        status: "ok",
        cache,
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

async fn list_users(
    State(state): State<AppState>,
    Query(options): Query<ListOptions>,
) -> Result<Json<UserList>, ApiError> {
    Ok(Json(state.store.list(options).await?))
}

async fn get_user(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<User>, ApiError> {
    Ok(Json(state.store.get_by_username(&name).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUser {
    name: String,
    #[serde(default)]
    email: Option<String>,
    password: String,
    #[serde(default)]
    discord_id: u64,
    #[serde(default)]
    total_credits: i64,
}

async fn create_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if req.name.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("name and password are required".into()));
    }

    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || store::hash_password(&password))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::Internal
        })?;

    let user = state
        .store
        .create(User {
            id: 0,
            name: req.name,
            email: req.email,
            password: hash,
            discord_id: req.discord_id,
            total_credits: req.total_credits,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(user = %user.name, by = %identity.subject, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&name).await?;
    tracing::info!(user = %name, by = %identity.subject, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
