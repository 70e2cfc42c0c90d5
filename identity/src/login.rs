//! Login with an upstream credential assertion.
//!
//! The upstream provider (an OIDC issuer) has already authenticated the
//! caller and signed an ID token saying so. This layer verifies that token,
//! maps its `(provider, subject)` to a credential, rejects replayed
//! assertions by their nonce, and issues a session.
//!
//! # Invariants
//! - Provider, subject and nonce only ever come from a verified assertion.
//! - A `(credential, nonce)` pair is accepted at most once, enforced by the
//!   nonce repository's uniqueness constraint.

use std::sync::Arc;

use thiserror::Error;

use crate::assertion::{AssertionError, AssertionVerifier, VerifiedAssertion};
use crate::ids::CredentialId;
use crate::session::{IssuedSession, SessionError, SessionService};
use crate::storage::{
    Credential, Identity, IdentityRepository, LoginNonce, LoginNonceRepository, StoreError,
};
use crate::time::TimeSource;

/// Error returned when a login fails.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login nonce has already been used")]
    ReplayedNonce,
    #[error("login nonce is empty")]
    EmptyNonce,
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    #[error("unknown credential")]
    UnknownCredential,
    #[error("credential or identity is disabled")]
    Disabled,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("login storage failed: {0}")]
    Store(#[source] StoreError),
}

/// A login request: the upstream ID token and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub assertion: String,
    pub ip: String,
}

/// A successful login.
#[derive(Debug)]
pub struct LoggedIn {
    pub identity: Identity,
    pub credential: Credential,
    pub session: IssuedSession,
}

pub struct LoginService {
    assertions: Arc<AssertionVerifier>,
    identities: Arc<dyn IdentityRepository>,
    nonces: Arc<dyn LoginNonceRepository>,
    sessions: Arc<SessionService>,
    clock: Arc<dyn TimeSource>,
}

impl LoginService {
    #[must_use]
    pub fn new(
        assertions: Arc<AssertionVerifier>,
        identities: Arc<dyn IdentityRepository>,
        nonces: Arc<dyn LoginNonceRepository>,
        sessions: Arc<SessionService>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            assertions,
            identities,
            nonces,
            sessions,
            clock,
        }
    }

    /// Verify an upstream ID token.
    ///
    /// # Errors
    /// `Assertion` when the token is missing, forged, expired or incomplete.
    pub fn verify_assertion(&self, assertion: &str) -> Result<VerifiedAssertion, LoginError> {
        self.assertions.verify(assertion).map_err(|e| {
            tracing::debug!("assertion rejected: {e}");
            LoginError::Assertion(e)
        })
    }

    /// Record that `nonce` was used with `credential_id`.
    ///
    /// # Errors
    /// `EmptyNonce` for blank input, `ReplayedNonce` if the pair was seen
    /// before, `Store` for storage faults.
    pub async fn record_nonce(
        &self,
        credential_id: &CredentialId,
        nonce: &str,
        ip: &str,
    ) -> Result<LoginNonce, LoginError> {
        if nonce.trim().is_empty() {
            return Err(LoginError::EmptyNonce);
        }

        let record = LoginNonce {
            credential_id: *credential_id,
            nonce: nonce.to_string(),
            ip: ip.to_string(),
            logged_in_on: self.clock.now_ms(),
        };
        match self.nonces.insert_nonce(&record).await {
            Ok(()) => Ok(record),
            Err(StoreError::AlreadyExists) => {
                tracing::warn!(%credential_id, %ip, "login nonce replayed");
                Err(LoginError::ReplayedNonce)
            }
            Err(e) => Err(LoginError::Store(e)),
        }
    }

    /// Log in with an upstream assertion.
    ///
    /// # Errors
    /// `Assertion` if the ID token does not verify, `UnknownCredential` if no
    /// identity is bound to it, `Disabled` for disabled credentials or
    /// identities, the nonce errors of [`LoginService::record_nonce`], and
    /// `Session` if signing fails.
    pub async fn login(&self, attempt: &LoginAttempt) -> Result<LoggedIn, LoginError> {
        let asserted = self.verify_assertion(&attempt.assertion)?;
        let credential = self
            .identities
            .find_credential(&asserted.provider, &asserted.subject_id)
            .await
            .map_err(unknown_credential)?;
        if credential.disabled_on.is_some() {
            return Err(LoginError::Disabled);
        }

        let identity = self
            .identities
            .get_identity(&credential.tenant_id, &credential.identity_id)
            .await
            .map_err(unknown_credential)?;
        if identity.disabled_on.is_some() {
            return Err(LoginError::Disabled);
        }

        self.record_nonce(&credential.credential_id, &asserted.nonce, &attempt.ip)
            .await?;

        let now = self.clock.now_ms();
        self.identities
            .touch_credential(&credential.credential_id, now)
            .await
            .map_err(LoginError::Store)?;

        let session = self.sessions.issue_session(
            identity.identity_id,
            identity.tenant_id,
            Some(credential.credential_id),
        )?;

        tracing::info!(
            credential_id = %credential.credential_id,
            identity_id = %identity.identity_id,
            "login succeeded"
        );
        Ok(LoggedIn {
            identity,
            credential: Credential {
                last_used_on: Some(now),
                ..credential
            },
            session,
        })
    }
}

fn unknown_credential(error: StoreError) -> LoginError {
    match error {
        StoreError::NotFound => LoginError::UnknownCredential,
        other => LoginError::Store(other),
    }
}
