//! Request authentication.
//!
//! [`require_session`] runs in front of protected routes:
//!
//! ```text
//! Unauthenticated -> TokenExtracted -> Verified -> SessionInjected
//!        \________________\_______________\______> Rejected (404)
//! ```
//!
//! Every rejection is an empty `404 Not Found`, so an unauthenticated caller
//! learns nothing about which routes exist or why their token failed.
//!
//! Handlers get the session through the [`AuthenticatedSession`] extractor.
//! The request extension it reads is a private type, so nothing else can
//! insert or shadow it.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cookie::Cookie;

use crate::session::{Session, SessionService};

/// Where a route expects its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A named cookie, for browser-facing routes.
    Cookie(String),
    /// `Authorization: Bearer <token>`, for service-to-service routes.
    BearerHeader,
}

impl TokenSource {
    /// Pull the raw token out of `headers`.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        match self {
            Self::Cookie(name) => extract_cookie(headers, name),
            Self::BearerHeader => extract_bearer(headers).map(str::to_string),
        }
    }
}

/// State for [`require_session`].
#[derive(Clone)]
pub struct AuthState {
    sessions: Arc<SessionService>,
    source: TokenSource,
}

impl AuthState {
    #[must_use]
    pub const fn new(sessions: Arc<SessionService>, source: TokenSource) -> Self {
        Self { sessions, source }
    }

    /// Authenticate with the configured session cookie.
    #[must_use]
    pub fn cookie(sessions: Arc<SessionService>) -> Self {
        let name = sessions.config().cookie.name.clone();
        Self::new(sessions, TokenSource::Cookie(name))
    }

    /// Authenticate with a bearer token.
    #[must_use]
    pub const fn bearer(sessions: Arc<SessionService>) -> Self {
        Self::new(sessions, TokenSource::BearerHeader)
    }
}

/// Request extension carrying the resolved session.
#[derive(Clone)]
struct SessionContext(Arc<Session>);

/// Reject the request with a bare 404 unless it carries a valid session;
/// otherwise attach the session and run the wrapped handler.
pub async fn require_session(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = auth.source.extract(request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "request rejected: no session token");
        return StatusCode::NOT_FOUND.into_response();
    };

    match auth.sessions.resolve_session(&token).await {
        Ok(session) => {
            request
                .extensions_mut()
                .insert(SessionContext(Arc::new(session)));
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), "request rejected: {e}");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// The caller's session, as injected by [`require_session`]. Only the
/// extractor can build one.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession(Arc<Session>);

impl std::ops::Deref for AuthenticatedSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedSession {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .map(|context| Self(Arc::clone(&context.0)))
            .ok_or_else(|| {
                tracing::error!(path = %parts.uri.path(), "route is missing the session layer");
                StatusCode::NOT_FOUND
            })
    }
}

/// The token from `Authorization: Bearer <token>`. The scheme is
/// case-insensitive.
#[must_use]
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The value of cookie `name`, searching every `Cookie` header.
#[must_use]
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}
