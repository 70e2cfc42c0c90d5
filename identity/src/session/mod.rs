//! Sessions: authenticated principals carried in signed tokens.
//!
//! A session is never stored. Issuing one signs a fresh [`Claims`]; resolving
//! one verifies the token and looks up display fields for the identity.
//!
//! # Invariants
//! - `not_before = issued_at - clock_skew` and `expires_at = issued_at + ttl`.
//! - Every issued session has a fresh `jti`.
//! - A token whose subject or tenant is missing or unparseable never resolves.

pub mod cookie;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ::cookie::Cookie;
use thiserror::Error;
use uuid::Uuid;

use crate::ids::{CredentialId, IdentityId, TenantId};
use crate::storage::{IdentityRepository, StoreError};
use crate::token::{Claims, TokenCodec, TokenError};

pub use self::cookie::CookieSettings;

/// Error returned when issuing or resolving a session fails.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token verified but lacks a usable subject or tenant.
    #[error("session is invalid: {0}")]
    Invalid(&'static str),
    /// The identity behind the session no longer exists or is disabled.
    #[error("session identity is unknown or disabled")]
    UnknownIdentity,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(StoreError),
}

/// Session lifetime and cookie settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl: Duration,
    /// Subtracted from `not_before` to tolerate drift between services.
    pub clock_skew: Duration,
    pub cookie: CookieSettings,
}

impl SessionConfig {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Self::DEFAULT_TTL,
            clock_skew: Self::DEFAULT_CLOCK_SKEW,
            cookie: CookieSettings::default(),
        }
    }
}

/// Verified token claims with their parsed subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub claims: Claims,
    pub identity_id: IdentityId,
    pub tenant_id: TenantId,
    pub credential_id: Option<CredentialId>,
}

/// An authenticated caller, rebuilt on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity_id: IdentityId,
    pub tenant_id: TenantId,
    pub credential_id: Option<CredentialId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub claims: Claims,
}

/// A freshly minted session.
#[derive(Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: Claims,
    pub cookie: Cookie<'static>,
}

impl IssuedSession {
    /// The `Set-Cookie` header value for this session.
    #[must_use]
    pub fn set_cookie_header(&self) -> String {
        self.cookie.to_string()
    }
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

/// Mints and resolves sessions.
pub struct SessionService {
    codec: Arc<TokenCodec>,
    identities: Arc<dyn IdentityRepository>,
    config: SessionConfig,
}

impl SessionService {
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        identities: Arc<dyn IdentityRepository>,
        config: SessionConfig,
    ) -> Self {
        Self {
            codec,
            identities,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Whether sessions can be signed right now.
    #[must_use]
    pub fn can_issue(&self) -> bool {
        self.codec.can_sign()
    }

    /// Sign a new session for the given principal.
    ///
    /// Sessions are independent: concurrent calls for the same principal
    /// produce unrelated tokens.
    ///
    /// # Errors
    /// Returns `SessionError::Token` if the token cannot be signed.
    pub fn issue_session(
        &self,
        identity_id: IdentityId,
        tenant_id: TenantId,
        credential_id: Option<CredentialId>,
    ) -> Result<IssuedSession, SessionError> {
        let now = self.codec.clock().now_secs();
        let ttl = self.config.ttl.as_secs();
        let claims = Claims {
            subject_id: Some(identity_id.to_string()),
            tenant_id: Some(tenant_id.to_string()),
            credential_id: credential_id.map(|id| id.to_string()),
            issued_at: now,
            not_before: now.saturating_sub(self.config.clock_skew.as_secs()),
            expires_at: now.saturating_add(ttl),
            issuer: self.codec.issuer().to_string(),
            audience: self.codec.audience().to_string(),
            token_id: Uuid::new_v4().to_string(),
        };

        let token = self.codec.issue(&claims)?;
        let cookie = self
            .config
            .cookie
            .session_cookie(&token, ttl, claims.expires_at);

        tracing::debug!(jti = %claims.token_id, subject = %identity_id, "session issued");
        Ok(IssuedSession {
            token,
            claims,
            cookie,
        })
    }

    /// Verify `token` and parse its principal, without touching storage.
    ///
    /// # Errors
    /// Returns `SessionError::Token` for any verification failure and
    /// `SessionError::Invalid` when the subject or tenant is missing or is
    /// not an ID.
    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, SessionError> {
        let claims = self.codec.verify(token)?;

        let identity_id = parse_claim::<IdentityId>(claims.subject_id.as_deref(), "subject")?;
        let tenant_id = parse_claim::<TenantId>(claims.tenant_id.as_deref(), "tenant")?;
        let credential_id = claims
            .credential_id
            .as_deref()
            .map(|id| CredentialId::from_str(id).map_err(|_| SessionError::Invalid("credential")))
            .transpose()?;

        Ok(VerifiedClaims {
            claims,
            identity_id,
            tenant_id,
            credential_id,
        })
    }

    /// Verify `token` and load the identity it names.
    ///
    /// # Errors
    /// See [`SessionService::verify`]; additionally `UnknownIdentity` if the
    /// identity is gone or disabled, and `Store` for storage faults.
    pub async fn resolve_session(&self, token: &str) -> Result<Session, SessionError> {
        let verified = self.verify(token)?;

        let identity = match self
            .identities
            .get_identity(&verified.tenant_id, &verified.identity_id)
            .await
        {
            Ok(identity) => identity,
            Err(StoreError::NotFound) => return Err(SessionError::UnknownIdentity),
            Err(e) => return Err(SessionError::Store(e)),
        };
        if identity.disabled_on.is_some() {
            return Err(SessionError::UnknownIdentity);
        }

        Ok(Session {
            identity_id: verified.identity_id,
            tenant_id: verified.tenant_id,
            credential_id: verified.credential_id,
            first_name: identity.first_name,
            last_name: identity.last_name,
            email: identity.email,
            claims: verified.claims,
        })
    }

    /// A cookie that clears the session in the browser.
    #[must_use]
    pub fn expired_cookie(&self) -> Cookie<'static> {
        self.config.cookie.removal_cookie()
    }
}

fn parse_claim<T: FromStr>(value: Option<&str>, name: &'static str) -> Result<T, SessionError> {
    value
        .and_then(|value| value.parse().ok())
        .ok_or(SessionError::Invalid(name))
}
