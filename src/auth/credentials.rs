//! Credential material pulled from an inbound request.
//!
//! Extraction only reads; the request body stays available to the handler.

use axum::body::Bytes;
use axum::http::{header, request::Parts};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use super::AuthError;

/// Query parameter carrying a token.
pub const TOKEN_QUERY: &str = "token";
/// Cookie carrying a token.
pub const TOKEN_COOKIE: &str = "jwt";

/// Which verifier the credential material is shaped for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// `Authorization: Basic …`
    Basic,
    /// JSON body `{username, password}` without a Basic header.
    Login,
    /// Anything else: a token in header, query or cookie, or nothing at all.
    Token,
}

/// A username/password pair.
#[derive(Clone, Deserialize)]
pub struct LoginInfo {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInfo")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Raw credential material of one request. Created per request and dropped
/// after verification.
#[derive(Clone, Default)]
pub struct Credentials {
    pub authorization: Option<String>,
    pub query_token: Option<String>,
    pub cookie_token: Option<String>,
    pub body: Option<Bytes>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("kind", &self.kind())
            .field("has_authorization", &self.authorization.is_some())
            .field("has_query_token", &self.query_token.is_some())
            .field("has_cookie_token", &self.cookie_token.is_some())
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .finish()
    }
}

impl Credentials {
    /// Collect credential material from request parts and an optional
    /// buffered body.
    pub fn from_parts(parts: &Parts, body: Option<Bytes>) -> Self {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let query_token = parts.uri.query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == TOKEN_QUERY)
                .map(|(_, v)| v.into_owned())
        });

        let cookie_token = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == TOKEN_COOKIE)
            .map(|(_, value)| value.to_string());

        Self {
            authorization,
            query_token,
            cookie_token,
            body,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The encoded payload of a Basic `Authorization` header.
    pub fn basic_payload(&self) -> Option<&str> {
        split_scheme(self.authorization.as_deref()?, "Basic")
    }

    /// A `{username, password}` JSON body, if the body has that shape.
    pub fn login_body(&self) -> Option<LoginInfo> {
        let body = self.body.as_ref()?;
        serde_json::from_slice::<LoginInfo>(body)
            .ok()
            .filter(|l| !l.username.is_empty() && !l.password.is_empty())
    }

    /// Token lookup in precedence order: `Authorization: Bearer`, `?token=`,
    /// then the `jwt` cookie.
    pub fn token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(|h| split_scheme(h, "Bearer"))
            .or(self.query_token.as_deref())
            .or(self.cookie_token.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Classify the material. A Basic header wins over a login body, and a
    /// login body only counts when no `Authorization` header is present.
    pub fn kind(&self) -> CredentialKind {
        if self.basic_payload().is_some() {
            CredentialKind::Basic
        } else if self.authorization.is_none() && self.login_body().is_some() {
            CredentialKind::Login
        } else {
            CredentialKind::Token
        }
    }
}

fn split_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (name, rest) = header.split_once(' ')?;
    name.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

/// Decode a Basic header value (`Basic <base64(user:pass)>`).
///
/// The password may itself contain `:`; only the first one separates.
pub fn parse_basic(header: &str) -> Result<LoginInfo, AuthError> {
    let payload = split_scheme(header, "Basic").ok_or(AuthError::MalformedHeader)?;
    let decoded = STANDARD
        .decode(payload)
        .map_err(|_| AuthError::MalformedHeader)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedHeader)?;
    let (username, password) = decoded.split_once(':').ok_or(AuthError::MalformedHeader)?;

    Ok(LoginInfo {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// `Authorization` header value for `username:password`.
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn parses_basic_header() {
        let login = parse_basic(&basic_header("alice", "se:cret")).unwrap();
        assert_eq!(login.username, "alice");
        assert_eq!(login.password, "se:cret");
    }

    #[test]
    fn rejects_malformed_basic_headers() {
        for header in [
            "Basic",
            "Bearer abc",
            "Basic !!!not-base64!!!",
            format!("Basic {}", STANDARD.encode("no-colon")).as_str(),
        ] {
            assert!(
                matches!(parse_basic(header), Err(AuthError::MalformedHeader)),
                "{header}"
            );
        }
    }

    #[test]
    fn token_lookup_precedence() {
        let req = Request::builder()
            .uri("/v1/users?token=from-query")
            .header("authorization", "Bearer from-header")
            .header("cookie", "theme=dark; jwt=from-cookie")
            .body(())
            .unwrap();
        let mut creds = Credentials::from_parts(&parts(req), None);
        assert_eq!(creds.token(), Some("from-header"));

        creds.authorization = None;
        assert_eq!(creds.token(), Some("from-query"));

        creds.query_token = None;
        assert_eq!(creds.token(), Some("from-cookie"));
    }

    #[test]
    fn basic_header_is_not_a_token() {
        let creds = Credentials::default()
            .with_authorization(basic_header("a", "b"))
            .with_body(r#"{"username":"u","password":"p"}"#);
        assert_eq!(creds.token(), None);
        assert_eq!(creds.kind(), CredentialKind::Basic);
    }

    #[test]
    fn classifies_login_body_and_token() {
        let login = Credentials::default().with_body(r#"{"username":"u","password":"p"}"#);
        assert_eq!(login.kind(), CredentialKind::Login);

        let token = Credentials::default().with_authorization("Bearer abc");
        assert_eq!(token.kind(), CredentialKind::Token);

        let junk_body = Credentials::default().with_body("not json");
        assert_eq!(junk_body.kind(), CredentialKind::Token);

        let bearer_with_body = Credentials::default()
            .with_authorization("Bearer abc")
            .with_body(r#"{"username":"u","password":"p"}"#);
        assert_eq!(bearer_with_body.kind(), CredentialKind::Token);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = Credentials::default().with_authorization(basic_header("alice", "hunter2"));
        let out = format!("{creds:?}");
        assert!(!out.contains("hunter2"));
        assert!(!out.contains(&STANDARD.encode("alice:hunter2")));
    }
}
