//! HTTP Basic authentication middleware.
//!
//! Every protected response, success or not, leaves with the no-cache
//! headers so browsers never keep a signed document or the upload form.

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, PRAGMA, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use subtle::ConstantTimeEq;

pub const REALM: &str = "Basic realm=\"Restricted Area\"";
pub const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// The single account allowed to use the service.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Constant-time comparison of both parts.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    Missing,
    Invalid,
}

impl AuthFailure {
    fn message(self) -> &'static str {
        match self {
            AuthFailure::Missing => "Authentication required",
            AuthFailure::Invalid => "Invalid authentication credentials",
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, self.message()).into_response();
        let headers = response.headers_mut();
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
        set_no_cache(headers);
        response
    }
}

/// Decode `Authorization: Basic <base64(user:pass)>`.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

pub fn check(headers: &HeaderMap, credentials: &Credentials) -> Result<(), AuthFailure> {
    let header = headers.get(AUTHORIZATION).ok_or(AuthFailure::Missing)?;
    let header = header.to_str().map_err(|_| AuthFailure::Invalid)?;
    let (user, pass) = parse_basic(header).ok_or(AuthFailure::Invalid)?;
    if credentials.matches(&user, &pass) {
        Ok(())
    } else {
        Err(AuthFailure::Invalid)
    }
}

/// Reject unauthenticated requests and mark every response uncacheable.
pub async fn require_basic_auth(
    State(credentials): State<Credentials>,
    req: Request,
    next: Next,
) -> Response {
    if let Err(failure) = check(req.headers(), &credentials) {
        tracing::warn!(uri = %req.uri(), ?failure, "Authentication failed");
        return failure.into_response();
    }
    let mut response = next.run(req).await;
    set_no_cache(response.headers_mut());
    response
}

fn set_no_cache(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
    }

    #[test]
    fn parses_basic_header() {
        assert_eq!(
            parse_basic(&basic("admin", "s3:cret")),
            Some(("admin".to_string(), "s3:cret".to_string()))
        );
        assert_eq!(
            parse_basic(&format!("basic {}", STANDARD.encode("a:b"))),
            Some(("a".to_string(), "b".to_string()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
        assert_eq!(parse_basic(&format!("Basic {}", STANDARD.encode("nocolon"))), None);
    }

    #[test]
    fn check_distinguishes_missing_and_invalid() {
        let creds = Credentials::new("admin", "pw");
        let mut headers = HeaderMap::new();
        assert_eq!(check(&headers, &creds), Err(AuthFailure::Missing));

        headers.insert(AUTHORIZATION, basic("admin", "nope").parse().unwrap());
        assert_eq!(check(&headers, &creds), Err(AuthFailure::Invalid));

        headers.insert(AUTHORIZATION, basic("admin", "pw").parse().unwrap());
        assert_eq!(check(&headers, &creds), Ok(()));
    }

    #[test]
    fn debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn unauthorized_response_carries_realm() {
        let response = AuthFailure::Missing.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], REALM);
        assert_eq!(response.headers()[CACHE_CONTROL], NO_CACHE);
    }
}
