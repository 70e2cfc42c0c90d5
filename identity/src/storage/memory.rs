//! In-memory repositories.
//!
//! Every conditional update runs under a single write lock, which gives the
//! same single-winner behaviour a SQL backend gets from `UPDATE ... WHERE`.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{
    Credential, Identity, IdentityRepository, Invite, InviteRecord, InviteRepository, LoginNonce,
    LoginNonceRepository, StoreError,
};
use crate::ids::{CredentialId, IdentityId, InviteId, TenantId};

#[derive(Debug, Default)]
struct InviteTable {
    by_id: HashMap<InviteId, Invite>,
    by_code_hash: HashMap<String, InviteId>,
}

#[derive(Debug, Default)]
struct CredentialTable {
    by_id: HashMap<CredentialId, Credential>,
    by_subject: HashMap<(String, String), CredentialId>,
}

/// Thread-safe in-memory implementation of every repository trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    invites: RwLock<InviteTable>,
    identities: RwLock<HashMap<IdentityId, Identity>>,
    credentials: RwLock<CredentialTable>,
    nonces: RwLock<HashSet<(CredentialId, String)>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of login nonces recorded so far.
    #[must_use]
    pub fn nonce_count(&self) -> usize {
        self.nonces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of identities stored so far.
    #[must_use]
    pub fn identity_count(&self) -> usize {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl InviteRepository for InMemoryStore {
    async fn insert_invite(&self, record: &InviteRecord) -> Result<(), StoreError> {
        let mut table = self.invites.write().unwrap_or_else(PoisonError::into_inner);
        if table.by_code_hash.contains_key(&record.code_hash)
            || table.by_id.contains_key(&record.invite.invite_id)
        {
            return Err(StoreError::AlreadyExists);
        }
        table
            .by_code_hash
            .insert(record.code_hash.clone(), record.invite.invite_id);
        table
            .by_id
            .insert(record.invite.invite_id, record.invite.clone());
        Ok(())
    }

    async fn get_invite_by_code(&self, code_hash: &str) -> Result<Invite, StoreError> {
        let table = self.invites.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_code_hash
            .get(code_hash)
            .and_then(|invite_id| table.by_id.get(invite_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_invite(
        &self,
        tenant_id: &TenantId,
        invite_id: &InviteId,
    ) -> Result<Invite, StoreError> {
        let table = self.invites.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_id
            .get(invite_id)
            .filter(|invite| invite.tenant_id == *tenant_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_invites(&self, tenant_id: &TenantId) -> Result<Vec<Invite>, StoreError> {
        let table = self.invites.read().unwrap_or_else(PoisonError::into_inner);
        let mut invites: Vec<Invite> = table
            .by_id
            .values()
            .filter(|invite| invite.tenant_id == *tenant_id)
            .cloned()
            .collect();
        invites.sort_by_key(|invite| (invite.invited_on, invite.invite_id.as_uuid().as_u128()));
        Ok(invites)
    }

    async fn redeem_invite(&self, invite_id: &InviteId, now_ms: u64) -> Result<Invite, StoreError> {
        let mut table = self.invites.write().unwrap_or_else(PoisonError::into_inner);
        let invite = table.by_id.get_mut(invite_id).ok_or(StoreError::NotFound)?;
        if invite.redeemed_on.is_some()
            || invite.disabled_on.is_some()
            || invite.expires_on < now_ms
        {
            return Err(StoreError::Conflict);
        }
        invite.redeemed_on = Some(now_ms);
        Ok(invite.clone())
    }

    async fn disable_invite(
        &self,
        tenant_id: &TenantId,
        invite_id: &InviteId,
        disabled_by: &IdentityId,
        now_ms: u64,
    ) -> Result<Invite, StoreError> {
        let mut table = self.invites.write().unwrap_or_else(PoisonError::into_inner);
        let invite = table
            .by_id
            .get_mut(invite_id)
            .filter(|invite| invite.tenant_id == *tenant_id)
            .ok_or(StoreError::NotFound)?;
        if invite.disabled_on.is_none() {
            invite.disabled_on = Some(now_ms);
            invite.disabled_by = Some(*disabled_by);
        }
        Ok(invite.clone())
    }

    async fn release_invite(&self, invite_id: &InviteId, redeemed_on: u64) -> Result<Invite, StoreError> {
        let mut table = self.invites.write().unwrap_or_else(PoisonError::into_inner);
        let invite = table.by_id.get_mut(invite_id).ok_or(StoreError::NotFound)?;
        if invite.redeemed_on != Some(redeemed_on) {
            return Err(StoreError::Conflict);
        }
        invite.redeemed_on = None;
        Ok(invite.clone())
    }

    async fn delete_invite(&self, invite_id: &InviteId) -> Result<(), StoreError> {
        let mut table = self.invites.write().unwrap_or_else(PoisonError::into_inner);
        table.by_id.remove(invite_id).ok_or(StoreError::NotFound)?;
        table.by_code_hash.retain(|_, id| id != invite_id);
        Ok(())
    }
}

#[async_trait]
impl IdentityRepository for InMemoryStore {
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut identities = self
            .identities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if identities.contains_key(&identity.identity_id) {
            return Err(StoreError::AlreadyExists);
        }
        identities.insert(identity.identity_id, identity.clone());
        Ok(())
    }

    async fn get_identity(
        &self,
        tenant_id: &TenantId,
        identity_id: &IdentityId,
    ) -> Result<Identity, StoreError> {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity_id)
            .filter(|identity| identity.tenant_id == *tenant_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn register_identity(
        &self,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        // Credentials before identities, everywhere both are held.
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut identities = self
            .identities
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let subject = (credential.provider.clone(), credential.subject_id.clone());
        if identities.contains_key(&identity.identity_id)
            || credentials.by_subject.contains_key(&subject)
            || credentials.by_id.contains_key(&credential.credential_id)
        {
            return Err(StoreError::AlreadyExists);
        }
        identities.insert(identity.identity_id, identity.clone());
        credentials.by_subject.insert(subject, credential.credential_id);
        credentials
            .by_id
            .insert(credential.credential_id, credential.clone());
        Ok(())
    }

    async fn delete_identity(&self, identity_id: &IdentityId) -> Result<(), StoreError> {
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut identities = self
            .identities
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        identities.remove(identity_id).ok_or(StoreError::NotFound)?;
        credentials
            .by_id
            .retain(|_, credential| credential.identity_id != *identity_id);
        let CredentialTable { by_id, by_subject } = &mut *credentials;
        by_subject.retain(|_, credential_id| by_id.contains_key(credential_id));
        Ok(())
    }

    async fn create_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut table = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let subject = (credential.provider.clone(), credential.subject_id.clone());
        if table.by_subject.contains_key(&subject)
            || table.by_id.contains_key(&credential.credential_id)
        {
            return Err(StoreError::AlreadyExists);
        }
        table.by_subject.insert(subject, credential.credential_id);
        table
            .by_id
            .insert(credential.credential_id, credential.clone());
        Ok(())
    }

    async fn get_credential(&self, credential_id: &CredentialId) -> Result<Credential, StoreError> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(credential_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_credential(
        &self,
        provider: &str,
        subject_id: &str,
    ) -> Result<Credential, StoreError> {
        let table = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        table
            .by_subject
            .get(&(provider.to_string(), subject_id.to_string()))
            .and_then(|credential_id| table.by_id.get(credential_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn touch_credential(
        &self,
        credential_id: &CredentialId,
        used_on: u64,
    ) -> Result<(), StoreError> {
        let mut table = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let credential = table
            .by_id
            .get_mut(credential_id)
            .ok_or(StoreError::NotFound)?;
        credential.last_used_on = Some(used_on);
        Ok(())
    }

    async fn disable_credential(
        &self,
        credential_id: &CredentialId,
        disabled_on: u64,
    ) -> Result<(), StoreError> {
        let mut table = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let credential = table
            .by_id
            .get_mut(credential_id)
            .ok_or(StoreError::NotFound)?;
        credential.disabled_on.get_or_insert(disabled_on);
        Ok(())
    }
}

#[async_trait]
impl LoginNonceRepository for InMemoryStore {
    async fn insert_nonce(&self, nonce: &LoginNonce) -> Result<(), StoreError> {
        let inserted = self
            .nonces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((nonce.credential_id, nonce.nonce.clone()));
        if inserted {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists)
        }
    }
}
