//! HTTP routes.
//!
//! | Route | Auth |
//! |---|---|
//! | `GET /.well-known/jwks.json` | none |
//! | `POST /register`, `POST /login`, `POST /logout` | none |
//! | `GET /invites`, `POST /invites`, `DELETE /invites/{invite_id}`, `GET /whoami` | session cookie |
//! | `GET /api/whoami` | bearer token |
//!
//! Authentication, redemption and login failures all answer with an empty
//! 404; see [`ApiError`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router, middleware};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{CredentialId, IdentityId, InviteId, TenantId};
use crate::invite::{InviteError, InviteService, InviteView};
use crate::keys::{JsonWebKeySet, KeyStore};
use crate::login::{LoginAttempt, LoginError, LoginService};
use crate::middleware::{AuthState, AuthenticatedSession, require_session};
use crate::registration::{Registration, RegistrationError, RegistrationService};
use crate::session::{IssuedSession, SessionError, SessionService};
use crate::storage::{Credential, Identity, Invite};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<dyn KeyStore>,
    pub sessions: Arc<SessionService>,
    pub invites: Arc<InviteService>,
    pub logins: Arc<LoginService>,
    pub registrations: Arc<RegistrationService>,
}

/// Build the router over `state`.
pub fn create_router(state: AppState) -> Router {
    let cookie_auth =
        middleware::from_fn_with_state(AuthState::cookie(Arc::clone(&state.sessions)), require_session);
    let bearer_auth =
        middleware::from_fn_with_state(AuthState::bearer(Arc::clone(&state.sessions)), require_session);

    let browser = Router::new()
        .route("/invites", get(list_invites).post(send_invite))
        .route("/invites/{invite_id}", delete(disable_invite))
        .route("/whoami", get(whoami))
        .route_layer(cookie_auth);

    let service = Router::new()
        .route("/api/whoami", get(whoami))
        .route_layer(bearer_auth);

    Router::new()
        .route("/.well-known/jwks.json", get(jwks))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(browser)
        .merge(service)
        .with_state(state)
}

/// Error returned by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Any authentication or redemption failure. The body is empty.
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Storage, notification or signing faults. Detail goes to the log only.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })).into_response()
            }
            Self::Internal(message) => {
                tracing::error!("request failed: {message}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl From<InviteError> for ApiError {
    fn from(error: InviteError) -> Self {
        match error {
            InviteError::NotFound
            | InviteError::Expired
            | InviteError::Disabled
            | InviteError::AlreadyRedeemed => {
                tracing::debug!("invite rejected: {error}");
                Self::NotFound
            }
            InviteError::InvalidEmail => Self::BadRequest(error.to_string()),
            InviteError::Notification(_) | InviteError::Store(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Invalid(_) | SessionError::UnknownIdentity | SessionError::Token(_) => {
                tracing::debug!("session rejected: {error}");
                Self::NotFound
            }
            SessionError::Store(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<LoginError> for ApiError {
    fn from(error: LoginError) -> Self {
        match error {
            LoginError::Assertion(_)
            | LoginError::ReplayedNonce
            | LoginError::UnknownCredential
            | LoginError::Disabled => {
                tracing::debug!("login rejected: {error}");
                Self::NotFound
            }
            LoginError::EmptyNonce => Self::BadRequest(error.to_string()),
            // Issuing a fresh session only fails on server-side problems.
            LoginError::Session(_) | LoginError::Store(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(error: RegistrationError) -> Self {
        match error {
            RegistrationError::MissingField(_) => Self::BadRequest(error.to_string()),
            RegistrationError::CredentialTaken => {
                tracing::debug!("registration rejected: {error}");
                Self::NotFound
            }
            RegistrationError::Invite(e) => e.into(),
            RegistrationError::Login(e) => e.into(),
            RegistrationError::SigningUnavailable
            | RegistrationError::Session(_)
            | RegistrationError::Store(_) => Self::Internal(error.to_string()),
        }
    }
}

/// Body returned when a session is issued.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub identity_id: IdentityId,
    pub tenant_id: TenantId,
    pub credential_id: CredentialId,
    /// Seconds since Unix epoch.
    pub expires_at: u64,
}

/// `assertion` is the upstream ID token. A missing one is treated like a
/// bad one.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub assertion: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub assertion: String,
}

#[derive(Debug, Deserialize)]
pub struct SendInviteRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmI {
    pub identity_id: IdentityId,
    pub tenant_id: TenantId,
    pub credential_id: Option<CredentialId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub expires_at: u64,
}

async fn jwks(State(state): State<AppState>) -> Json<JsonWebKeySet> {
    Json(state.keys.keys().to_public_jwks())
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let registered = state
        .registrations
        .register(&Registration {
            invite_code: request.code,
            first_name: request.first_name,
            last_name: request.last_name,
            assertion: request.assertion,
            ip: client_ip(&headers),
        })
        .await?;

    Ok(session_response(
        StatusCode::CREATED,
        &registered.identity,
        &registered.credential,
        &registered.session,
    ))
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let logged_in = state
        .logins
        .login(&LoginAttempt {
            assertion: request.assertion,
            ip: client_ip(&headers),
        })
        .await?;

    Ok(session_response(
        StatusCode::OK,
        &logged_in.identity,
        &logged_in.credential,
        &logged_in.session,
    ))
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, state.sessions.expired_cookie().to_string())],
    )
}

async fn list_invites(
    State(state): State<AppState>,
    session: AuthenticatedSession,
) -> Result<Json<Vec<InviteView>>, ApiError> {
    Ok(Json(state.invites.list_invites(&session).await?))
}

async fn send_invite(
    State(state): State<AppState>,
    session: AuthenticatedSession,
    Json(request): Json<SendInviteRequest>,
) -> Result<(StatusCode, Json<Invite>), ApiError> {
    // The code travels by email only.
    let sent = state.invites.send_invite(&session, &request.email).await?;
    Ok((StatusCode::CREATED, Json(sent.invite)))
}

async fn disable_invite(
    State(state): State<AppState>,
    session: AuthenticatedSession,
    Path(invite_id): Path<InviteId>,
) -> Result<StatusCode, ApiError> {
    state.invites.disable_invite(&session, &invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn whoami(session: AuthenticatedSession) -> Json<WhoAmI> {
    Json(WhoAmI {
        identity_id: session.identity_id,
        tenant_id: session.tenant_id,
        credential_id: session.credential_id,
        first_name: session.first_name.clone(),
        last_name: session.last_name.clone(),
        email: session.email.clone(),
        expires_at: session.claims.expires_at,
    })
}

fn session_response(
    status: StatusCode,
    identity: &Identity,
    credential: &Credential,
    session: &IssuedSession,
) -> Response {
    let body = SessionResponse {
        identity_id: identity.identity_id,
        tenant_id: identity.tenant_id,
        credential_id: credential.credential_id,
        expires_at: session.claims.expires_at,
    };
    (
        status,
        [(header::SET_COOKIE, session.set_cookie_header())],
        Json(body),
    )
        .into_response()
}

/// First `X-Forwarded-For` hop, for nonce records.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
