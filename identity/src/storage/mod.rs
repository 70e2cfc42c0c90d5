//! Persistence collaborators.
//!
//! The services in this crate never own a database. They talk to these
//! traits, which a SQL backend implements in production. Uniqueness and
//! single-use guarantees are the backend's job (unique indexes, conditional
//! updates), not an in-process lock's, because several server instances
//! share one database.
//!
//! [`memory::InMemoryStore`] is the reference implementation used by tests
//! and by the development binary.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::ids::{CredentialId, IdentityId, InviteId, TenantId};

pub use memory::InMemoryStore;

/// Uniform error type for all storage backends.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// A conditional update matched no row.
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Lifecycle state of an invite.
///
/// `Expired` is derived from the clock and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Redeemed,
    Disabled,
    Expired,
}

/// An invitation, as stored and as returned to callers.
///
/// Holds no secret material. All timestamps are milliseconds since Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invite {
    pub invite_id: InviteId,
    pub tenant_id: TenantId,
    pub email: String,
    /// `None` for invites created by the system (bootstrap).
    pub invited_by: Option<IdentityId>,
    pub invited_on: u64,
    pub expires_on: u64,
    pub redeemed_on: Option<u64>,
    pub disabled_on: Option<u64>,
    pub disabled_by: Option<IdentityId>,
}

impl Invite {
    /// Status as of `now_ms`. Terminal states win over expiry.
    #[must_use]
    pub const fn status(&self, now_ms: u64) -> InviteStatus {
        if self.redeemed_on.is_some() {
            InviteStatus::Redeemed
        } else if self.disabled_on.is_some() {
            InviteStatus::Disabled
        } else if self.expires_on < now_ms {
            InviteStatus::Expired
        } else {
            InviteStatus::Pending
        }
    }
}

/// An invite together with the digest of its secret code.
#[derive(Debug, Clone)]
pub struct InviteRecord {
    pub invite: Invite,
    /// Hex SHA-256 of the secret code. The plaintext is never stored.
    pub code_hash: String,
}

/// A registered person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub identity_id: IdentityId,
    pub tenant_id: TenantId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub invite_id: Option<InviteId>,
    pub registered_on: u64,
    pub disabled_on: Option<u64>,
}

/// An upstream login (provider + subject) bound to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub credential_id: CredentialId,
    pub identity_id: IdentityId,
    pub tenant_id: TenantId,
    pub provider: String,
    pub subject_id: String,
    pub created_on: u64,
    pub last_used_on: Option<u64>,
    pub disabled_on: Option<u64>,
}

/// One accepted login assertion. `(credential_id, nonce)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginNonce {
    pub credential_id: CredentialId,
    pub nonce: String,
    pub ip: String,
    pub logged_in_on: u64,
}

/// Invite persistence.
#[async_trait]
pub trait InviteRepository: Send + Sync {
    /// Insert a new invite. `AlreadyExists` if its code hash is taken.
    async fn insert_invite(&self, record: &InviteRecord) -> Result<(), StoreError>;

    /// Get an invite by the digest of its secret code.
    async fn get_invite_by_code(&self, code_hash: &str) -> Result<Invite, StoreError>;

    /// Get an invite within a tenant.
    async fn get_invite(&self, tenant_id: &TenantId, invite_id: &InviteId)
    -> Result<Invite, StoreError>;

    /// List a tenant's invites, oldest first.
    async fn list_invites(&self, tenant_id: &TenantId) -> Result<Vec<Invite>, StoreError>;

    /// Set `redeemed_on` if and only if the invite is not redeemed, not
    /// disabled and not expired at `now_ms`; otherwise `Conflict`.
    async fn redeem_invite(&self, invite_id: &InviteId, now_ms: u64) -> Result<Invite, StoreError>;

    /// Set `disabled_on`/`disabled_by` unless already disabled, in which case
    /// the stored invite is returned unchanged.
    async fn disable_invite(
        &self,
        tenant_id: &TenantId,
        invite_id: &InviteId,
        disabled_by: &IdentityId,
        now_ms: u64,
    ) -> Result<Invite, StoreError>;

    /// Clear `redeemed_on` if and only if it still equals `redeemed_on`;
    /// otherwise `Conflict`. Returns an invite whose registration failed.
    async fn release_invite(&self, invite_id: &InviteId, redeemed_on: u64) -> Result<Invite, StoreError>;

    /// Remove an invite.
    async fn delete_invite(&self, invite_id: &InviteId) -> Result<(), StoreError>;
}

/// Identity and credential persistence.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    /// `NotFound` if the identity does not exist within `tenant_id`.
    async fn get_identity(
        &self,
        tenant_id: &TenantId,
        identity_id: &IdentityId,
    ) -> Result<Identity, StoreError>;

    /// Create `identity` and bind `credential` to it in one step. On
    /// `AlreadyExists` (either ID, or the credential's subject) nothing is
    /// written.
    async fn register_identity(
        &self,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<(), StoreError>;

    /// Remove an identity and every credential bound to it.
    async fn delete_identity(&self, identity_id: &IdentityId) -> Result<(), StoreError>;

    /// `AlreadyExists` if `(provider, subject_id)` is already bound.
    async fn create_credential(&self, credential: &Credential) -> Result<(), StoreError>;

    async fn get_credential(&self, credential_id: &CredentialId) -> Result<Credential, StoreError>;

    async fn find_credential(
        &self,
        provider: &str,
        subject_id: &str,
    ) -> Result<Credential, StoreError>;

    /// Record a successful use.
    async fn touch_credential(
        &self,
        credential_id: &CredentialId,
        used_on: u64,
    ) -> Result<(), StoreError>;

    async fn disable_credential(
        &self,
        credential_id: &CredentialId,
        disabled_on: u64,
    ) -> Result<(), StoreError>;
}

/// Login nonce persistence.
#[async_trait]
pub trait LoginNonceRepository: Send + Sync {
    /// `AlreadyExists` if `(credential_id, nonce)` was recorded before.
    async fn insert_nonce(&self, nonce: &LoginNonce) -> Result<(), StoreError>;
}
