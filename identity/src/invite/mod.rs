//! Invitations: single-use, expiring secrets that gate registration.
//!
//! An invite is `Pending` until it is redeemed or disabled, both terminal.
//! `Expired` is derived from the clock and never stored.
//!
//! # Invariants
//! - The plaintext code leaves this module exactly once, in the invite email.
//!   Storage only sees its digest.
//! - `redeemed_on` is only ever set by [`InviteService::redeem`], through the
//!   repository's conditional update, so two concurrent redemptions of one
//!   code cannot both succeed.
//! - A failed notification never leaves the invite behind.

pub mod code;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::ids::{IdentityId, InviteId, TenantId};
use crate::notify::{EmailMessage, NotificationSender, NotifyError};
use crate::session::Session;
use crate::storage::{Invite, InviteRecord, InviteRepository, InviteStatus, StoreError};
use crate::time::TimeSource;

pub use code::SecretCode;

/// Attempts at inserting an invite before a code collision is fatal.
pub const MAX_CODE_ATTEMPTS: u32 = 3;

/// Error returned by invite operations.
#[derive(Debug, Error)]
pub enum InviteError {
    #[error("invite not found")]
    NotFound,
    #[error("invite has expired")]
    Expired,
    #[error("invite has been disabled")]
    Disabled,
    /// Redemption is one-shot; this is as terminal as `Disabled`.
    #[error("invite has already been redeemed")]
    AlreadyRedeemed,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("failed to deliver invite: {0}")]
    Notification(#[source] NotifyError),
    #[error("invite storage failed: {0}")]
    Store(#[source] StoreError),
}

/// Invite lifetime and link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteConfig {
    pub ttl: Duration,
    /// Registration page the emailed link points at.
    pub base_url: String,
}

impl InviteConfig {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8200/register";
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            ttl: Self::DEFAULT_TTL,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// A newly created invite and its plaintext code.
#[derive(Debug, Clone)]
pub struct SentInvite {
    pub invite: Invite,
    pub code: SecretCode,
}

/// An invite as listed to its tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteView {
    #[serde(flatten)]
    pub invite: Invite,
    pub status: InviteStatus,
}

/// Creates, redeems and disables invites.
pub struct InviteService {
    invites: Arc<dyn InviteRepository>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn TimeSource>,
    config: InviteConfig,
}

impl InviteService {
    #[must_use]
    pub fn new(
        invites: Arc<dyn InviteRepository>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn TimeSource>,
        config: InviteConfig,
    ) -> Self {
        Self {
            invites,
            notifier,
            clock,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &InviteConfig {
        &self.config
    }

    /// Invite `email` into the caller's tenant.
    ///
    /// # Errors
    /// `InvalidEmail` for unusable addresses, `Notification` if the email
    /// cannot be delivered (the invite is removed again) and `Store` for
    /// storage faults, including repeated code collisions.
    pub async fn send_invite(&self, session: &Session, email: &str) -> Result<SentInvite, InviteError> {
        self.create(session.tenant_id, Some(session.identity_id), email)
            .await
    }

    /// Invite `email` into `tenant_id` on behalf of the system.
    ///
    /// Used to seed the first identity of a tenant.
    ///
    /// # Errors
    /// See [`InviteService::send_invite`].
    pub async fn send_bootstrap_invite(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<SentInvite, InviteError> {
        self.create(tenant_id, None, email).await
    }

    async fn create(
        &self,
        tenant_id: TenantId,
        invited_by: Option<IdentityId>,
        email: &str,
    ) -> Result<SentInvite, InviteError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(InviteError::InvalidEmail);
        }

        let now = self.clock.now_ms();
        let ttl_ms = u64::try_from(self.config.ttl.as_millis()).unwrap_or(u64::MAX);
        let invite = Invite {
            invite_id: InviteId::new(),
            tenant_id,
            email: email.to_string(),
            invited_by,
            invited_on: now,
            expires_on: now.saturating_add(ttl_ms),
            redeemed_on: None,
            disabled_on: None,
            disabled_by: None,
        };

        let mut attempt = 1;
        let code = loop {
            let code = SecretCode::generate();
            let record = InviteRecord {
                invite: invite.clone(),
                code_hash: code.digest(),
            };
            match self.invites.insert_invite(&record).await {
                Ok(()) => break code,
                Err(StoreError::AlreadyExists) if attempt < MAX_CODE_ATTEMPTS => {
                    tracing::warn!(attempt, "invite code collision, regenerating");
                    attempt += 1;
                }
                Err(e) => return Err(InviteError::Store(e)),
            }
        };

        let message = EmailMessage::invite(self.invite_url(&code), invite.expires_on);
        if let Err(e) = self.notifier.send_email(email, &message).await {
            tracing::warn!(invite_id = %invite.invite_id, "invite delivery failed, removing invite: {e}");
            if let Err(cleanup) = self.invites.delete_invite(&invite.invite_id).await {
                tracing::error!(invite_id = %invite.invite_id, "failed to remove undelivered invite: {cleanup}");
            }
            return Err(InviteError::Notification(e));
        }

        tracing::info!(
            invite_id = %invite.invite_id,
            tenant_id = %invite.tenant_id,
            bootstrap = invited_by.is_none(),
            "invite sent"
        );
        Ok(SentInvite { invite, code })
    }

    /// Link to the registration page carrying `code`.
    #[must_use]
    pub fn invite_url(&self, code: &SecretCode) -> String {
        let separator = if self.config.base_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}code={}", self.config.base_url, code.expose())
    }

    /// Redeem the invite identified by `code`, exactly once.
    ///
    /// The code is trimmed of surrounding whitespace; case matters.
    ///
    /// # Errors
    /// `NotFound`, `Expired`, `Disabled` or `AlreadyRedeemed` when the
    /// invite cannot be redeemed, `Store` for storage faults.
    pub async fn redeem(&self, code: &str) -> Result<Invite, InviteError> {
        let code = SecretCode::from_input(code);
        if code.is_empty() {
            return Err(InviteError::NotFound);
        }
        let code_hash = code.digest();

        let invite = self.find_by_code(&code_hash).await?;
        let now = self.clock.now_ms();
        check_redeemable(&invite, now)?;

        match self.invites.redeem_invite(&invite.invite_id, now).await {
            Ok(invite) => {
                tracing::info!(invite_id = %invite.invite_id, "invite redeemed");
                Ok(invite)
            }
            Err(StoreError::Conflict) => {
                // Lost a race; report what the winner left behind.
                let current = self.find_by_code(&code_hash).await?;
                check_redeemable(&current, now)?;
                Err(InviteError::AlreadyRedeemed)
            }
            Err(StoreError::NotFound) => Err(InviteError::NotFound),
            Err(e) => Err(InviteError::Store(e)),
        }
    }

    /// Return a redeemed invite to pending after the registration it was
    /// redeemed for failed.
    ///
    /// # Errors
    /// `Store` for storage faults. A redemption that no longer matches
    /// `invite` is left as it is.
    pub async fn release(&self, invite: &Invite) -> Result<(), InviteError> {
        let Some(redeemed_on) = invite.redeemed_on else {
            return Ok(());
        };
        match self.invites.release_invite(&invite.invite_id, redeemed_on).await {
            Ok(_) => {
                tracing::info!(invite_id = %invite.invite_id, "invite released");
                Ok(())
            }
            Err(StoreError::Conflict | StoreError::NotFound) => {
                tracing::warn!(invite_id = %invite.invite_id, "invite changed before release");
                Ok(())
            }
            Err(e) => Err(InviteError::Store(e)),
        }
    }

    /// Disable an invite in the caller's tenant.
    ///
    /// Disabling is recorded even if the invite was already redeemed; a
    /// second disable keeps the first record.
    ///
    /// # Errors
    /// `NotFound` if the invite is not in the caller's tenant.
    pub async fn disable_invite(
        &self,
        session: &Session,
        invite_id: &InviteId,
    ) -> Result<Invite, InviteError> {
        let invite = self
            .invites
            .disable_invite(
                &session.tenant_id,
                invite_id,
                &session.identity_id,
                self.clock.now_ms(),
            )
            .await
            .map_err(map_store_error)?;

        tracing::info!(invite_id = %invite.invite_id, disabled_by = %session.identity_id, "invite disabled");
        Ok(invite)
    }

    /// The caller's tenant's invites with their current status.
    ///
    /// # Errors
    /// `Store` for storage faults.
    pub async fn list_invites(&self, session: &Session) -> Result<Vec<InviteView>, InviteError> {
        let now = self.clock.now_ms();
        let invites = self
            .invites
            .list_invites(&session.tenant_id)
            .await
            .map_err(InviteError::Store)?;

        Ok(invites
            .into_iter()
            .map(|invite| InviteView {
                status: invite.status(now),
                invite,
            })
            .collect())
    }

    async fn find_by_code(&self, code_hash: &str) -> Result<Invite, InviteError> {
        self.invites
            .get_invite_by_code(code_hash)
            .await
            .map_err(map_store_error)
    }
}

/// Redemption checks, in order: redeemed, expired, disabled.
const fn check_redeemable(invite: &Invite, now_ms: u64) -> Result<(), InviteError> {
    if invite.redeemed_on.is_some() {
        Err(InviteError::AlreadyRedeemed)
    } else if invite.expires_on < now_ms {
        Err(InviteError::Expired)
    } else if invite.disabled_on.is_some() {
        Err(InviteError::Disabled)
    } else {
        Ok(())
    }
}

fn map_store_error(error: StoreError) -> InviteError {
    match error {
        StoreError::NotFound => InviteError::NotFound,
        other => InviteError::Store(other),
    }
}
