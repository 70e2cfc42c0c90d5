//! Registration: turn an invite into an identity.
//!
//! Checks that do not consume the invite (input, the upstream assertion,
//! credential availability, signing keys) run first. The invite is then
//! redeemed, so a code can only ever produce one identity. If anything after
//! redemption fails, the identity is removed and the invite released.

use std::sync::Arc;

use thiserror::Error;

use crate::ids::{CredentialId, IdentityId};
use crate::invite::{InviteError, InviteService};
use crate::login::{LoginError, LoginService};
use crate::session::{IssuedSession, SessionError, SessionService};
use crate::storage::{Credential, Identity, IdentityRepository, Invite, StoreError};
use crate::time::TimeSource;

/// Error returned when registration fails.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid registration: {0} is required")]
    MissingField(&'static str),
    #[error("credential is already registered")]
    CredentialTaken,
    #[error("no signing key is available")]
    SigningUnavailable,
    #[error(transparent)]
    Invite(#[from] InviteError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("registration storage failed: {0}")]
    Store(#[source] StoreError),
}

/// What a new user submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub invite_code: String,
    pub first_name: String,
    pub last_name: String,
    /// Upstream ID token naming the credential to bind.
    pub assertion: String,
    pub ip: String,
}

#[derive(Debug)]
pub struct Registered {
    pub identity: Identity,
    pub credential: Credential,
    pub session: IssuedSession,
}

pub struct RegistrationService {
    invites: Arc<InviteService>,
    identities: Arc<dyn IdentityRepository>,
    logins: Arc<LoginService>,
    sessions: Arc<SessionService>,
    clock: Arc<dyn TimeSource>,
}

impl RegistrationService {
    #[must_use]
    pub fn new(
        invites: Arc<InviteService>,
        identities: Arc<dyn IdentityRepository>,
        logins: Arc<LoginService>,
        sessions: Arc<SessionService>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            invites,
            identities,
            logins,
            sessions,
            clock,
        }
    }

    /// Register a new identity with an invite code.
    ///
    /// # Errors
    /// `MissingField`, `Login` (assertion), `CredentialTaken` and
    /// `SigningUnavailable` leave the invite untouched. Any `Invite` error
    /// comes from redemption. Failures after redemption undo it.
    pub async fn register(&self, registration: &Registration) -> Result<Registered, RegistrationError> {
        let first_name = required(&registration.first_name, "first_name")?;
        let last_name = required(&registration.last_name, "last_name")?;
        let asserted = self.logins.verify_assertion(&registration.assertion)?;

        match self
            .identities
            .find_credential(&asserted.provider, &asserted.subject_id)
            .await
        {
            Ok(_) => return Err(RegistrationError::CredentialTaken),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(RegistrationError::Store(e)),
        }
        if !self.sessions.can_issue() {
            return Err(RegistrationError::SigningUnavailable);
        }

        let invite = self.invites.redeem(&registration.invite_code).await?;

        let now = self.clock.now_ms();
        let identity = Identity {
            identity_id: IdentityId::new(),
            tenant_id: invite.tenant_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: invite.email.clone(),
            invite_id: Some(invite.invite_id),
            registered_on: now,
            disabled_on: None,
        };
        let credential = Credential {
            credential_id: CredentialId::new(),
            identity_id: identity.identity_id,
            tenant_id: identity.tenant_id,
            provider: asserted.provider,
            subject_id: asserted.subject_id,
            created_on: now,
            last_used_on: Some(now),
            disabled_on: None,
        };
        if let Err(e) = self.identities.register_identity(&identity, &credential).await {
            self.release(&invite).await;
            return Err(match e {
                StoreError::AlreadyExists => RegistrationError::CredentialTaken,
                other => RegistrationError::Store(other),
            });
        }

        let session = match self.sign_in(&credential, &asserted.nonce, &registration.ip).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(identity_id = %identity.identity_id, "registration rolled back: {e}");
                if let Err(delete) = self.identities.delete_identity(&identity.identity_id).await {
                    tracing::error!(identity_id = %identity.identity_id, "failed to remove identity: {delete}");
                }
                self.release(&invite).await;
                return Err(e);
            }
        };

        tracing::info!(
            identity_id = %identity.identity_id,
            invite_id = %invite.invite_id,
            "identity registered"
        );
        Ok(Registered {
            identity,
            credential,
            session,
        })
    }

    async fn sign_in(
        &self,
        credential: &Credential,
        nonce: &str,
        ip: &str,
    ) -> Result<IssuedSession, RegistrationError> {
        self.logins
            .record_nonce(&credential.credential_id, nonce, ip)
            .await?;
        Ok(self.sessions.issue_session(
            credential.identity_id,
            credential.tenant_id,
            Some(credential.credential_id),
        )?)
    }

    async fn release(&self, invite: &Invite) {
        if let Err(e) = self.invites.release(invite).await {
            tracing::error!(invite_id = %invite.invite_id, "failed to release invite: {e}");
        }
    }
}

fn required<'a>(value: &'a str, name: &'static str) -> Result<&'a str, RegistrationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(RegistrationError::MissingField(name))
    } else {
        Ok(value)
    }
}
