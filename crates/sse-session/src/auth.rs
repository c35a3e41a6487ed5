//! Authentication gate for SSE sessions
//!
//! The gate runs once, before any header is written. It either yields an
//! `Identity` or rejects the request, in which case no stream is opened.

use async_trait::async_trait;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Request context passed to the auth gate
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// HTTP method (usually GET for SSE)
    pub method: Method,
    /// Full request URI (path + query string)
    pub uri: Uri,
    /// HTTP headers from the request
    pub headers: HeaderMap,
    /// Client IP address (from X-Forwarded-For)
    pub client_ip: Option<String>,
}

impl AuthRequest {
    /// Build a request context, reading the client IP from `X-Forwarded-For`
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let client_ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string());

        Self {
            method,
            uri,
            headers,
            client_ip,
        }
    }

    /// Get a header value as string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the Bearer token from Authorization header
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|auth| auth.strip_prefix("Bearer "))
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get the raw query string (without leading '?')
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Get a query parameter value by name
    ///
    /// Note: This is a simple implementation that doesn't handle URL decoding.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.uri.query().and_then(|query| {
            query.split('&').find_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next()?;
                if key == name { Some(value) } else { None }
            })
        })
    }

    /// Get a cookie value by name
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .find_map(|pair| {
                let (key, value) = pair.trim().split_once('=')?;
                if key == name { Some(value) } else { None }
            })
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Opaque subject, usually an email address
    pub subject: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

/// Rejection from the auth gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// Reason, for logs only; the client always sees `Unauthorized`
    pub reason: String,
}

impl Rejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Serialize)]
struct UnauthorizedBody {
    error: &'static str,
}

impl IntoResponse for Rejected {
    fn into_response(self) -> Response {
        unauthorized()
    }
}

/// The rejection response: `401` with `{"error":"Unauthorized"}`
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(UnauthorizedBody {
            error: "Unauthorized",
        }),
    )
        .into_response()
}

/// Trait for auth gates
///
/// # Example
///
/// ```rust,ignore
/// use sse_session::auth::{AuthGate, AuthRequest, Identity, Rejected};
/// use async_trait::async_trait;
///
/// struct HeaderGate;
///
/// #[async_trait]
/// impl AuthGate for HeaderGate {
///     async fn authenticate(&self, req: &AuthRequest) -> Result<Identity, Rejected> {
///         req.header("x-user")
///             .map(Identity::new)
///             .ok_or_else(|| Rejected::new("missing x-user"))
///     }
///
///     fn name(&self) -> &'static str { "Header" }
/// }
/// ```
#[async_trait]
pub trait AuthGate: Send + Sync + 'static {
    /// Decide whether the request may open a stream
    async fn authenticate(&self, req: &AuthRequest) -> Result<Identity, Rejected>;

    /// Return the gate name (for logging)
    fn name(&self) -> &'static str;
}

/// Gate built from an async closure, see [`auth_fn`]
pub struct FnGate<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> AuthGate for FnGate<F>
where
    F: Fn(AuthRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Identity, Rejected>> + Send + 'static,
{
    async fn authenticate(&self, req: &AuthRequest) -> Result<Identity, Rejected> {
        (self.f)(req.clone()).await
    }

    fn name(&self) -> &'static str {
        "Fn"
    }
}

/// Helper to create an auth gate from a closure
pub fn auth_fn<F, Fut>(f: F) -> FnGate<F>
where
    F: Fn(AuthRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Identity, Rejected>> + Send + 'static,
{
    FnGate { f }
}

/// Gate backed by a static token table
///
/// Accepts the token from `Authorization: Bearer <token>` or the `token`
/// query parameter.
#[derive(Clone, Default)]
pub struct BearerTokenGate {
    tokens: Arc<DashMap<String, String>>,
}

impl BearerTokenGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a subject
    pub fn with_token(self, token: impl Into<String>, subject: impl Into<String>) -> Self {
        self.insert(token, subject);
        self
    }

    /// Register a token for a subject
    pub fn insert(&self, token: impl Into<String>, subject: impl Into<String>) {
        self.tokens.insert(token.into(), subject.into());
    }

    /// Number of registered tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for BearerTokenGate
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let gate = Self::new();
        for (token, subject) in iter {
            gate.insert(token, subject);
        }
        gate
    }
}

#[async_trait]
impl AuthGate for BearerTokenGate {
    async fn authenticate(&self, req: &AuthRequest) -> Result<Identity, Rejected> {
        let token = req
            .bearer_token()
            .or_else(|| req.query_param("token"))
            .ok_or_else(|| Rejected::new("missing token"))?;

        self.tokens
            .get(token)
            .map(|subject| Identity::new(subject.value().clone()))
            .ok_or_else(|| Rejected::new("unknown token"))
    }

    fn name(&self) -> &'static str {
        "BearerToken"
    }
}
