//! Key store capability and the in-memory, rotatable backend.
//!
//! # Invariants
//! - A store exposes a consistent snapshot: `keys()` and `signing_key()` never
//!   observe a half-applied rotation.
//! - The current signing key is always part of the verification set.

use std::sync::{Arc, PoisonError, RwLock};

use super::KeyError;
use super::jwk::JsonWebKeySet;
use super::key_pair::{Algorithm, KeyPair};

/// Something that can supply verification keys and, optionally, a signing key.
///
/// Backends are selected at startup; see [`super::open_key_store`].
pub trait KeyStore: Send + Sync {
    /// All keys valid for verification.
    fn keys(&self) -> KeySet;

    /// The key new tokens are signed with. Read-only backends have none.
    fn signing_key(&self) -> Option<Arc<KeyPair>> {
        None
    }

    /// Find a verification key by ID.
    ///
    /// `None` means a signature under `key_id` cannot be verified.
    fn lookup(&self, key_id: &str) -> Option<Arc<KeyPair>> {
        self.keys().lookup(key_id)
    }
}

/// An immutable set of keys.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<Arc<KeyPair>>,
}

impl KeySet {
    #[must_use]
    pub const fn new(keys: Vec<Arc<KeyPair>>) -> Self {
        Self { keys }
    }

    /// Load every key of a JWKS document as a verification-only key.
    ///
    /// # Errors
    /// Fails on an empty document or on the first key that cannot be loaded;
    /// a partial set is never returned.
    pub fn from_jwks(jwks: &JsonWebKeySet) -> Result<Self, KeyError> {
        if jwks.keys.is_empty() {
            return Err(KeyError::Malformed("key set is empty".to_string()));
        }
        let keys = jwks
            .keys
            .iter()
            .map(|jwk| KeyPair::from_jwk(jwk).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<KeyPair>> {
        self.keys.iter()
    }

    #[must_use]
    pub fn lookup(&self, key_id: &str) -> Option<Arc<KeyPair>> {
        self.keys
            .iter()
            .find(|key| key.key_id() == key_id)
            .map(Arc::clone)
    }

    /// The same keys with private halves stripped.
    #[must_use]
    pub fn public_only(&self) -> Self {
        Self {
            keys: self
                .keys
                .iter()
                .map(|key| Arc::new(key.public_view()))
                .collect(),
        }
    }

    /// The publishable JWKS for this set. Keys carrying private material
    /// are dropped.
    #[must_use]
    pub fn to_public_jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: self.keys.iter().map(|key| key.to_public_jwk()).collect(),
        }
        .public_only()
    }
}

/// Keys held in process memory, generated at boot or supplied by the caller.
///
/// Rotation swaps the whole ring behind one write lock, so concurrent
/// issuers see either the old or the new current key, never a mix.
pub struct InMemoryKeyStore {
    ring: RwLock<Arc<KeyRing>>,
    algorithm: Algorithm,
    bits: usize,
}

struct KeyRing {
    current: Arc<KeyPair>,
    /// Newest first. Includes `current`.
    keys: Vec<Arc<KeyPair>>,
}

impl InMemoryKeyStore {
    /// Generate one key and make it current.
    ///
    /// # Errors
    /// Returns `KeyError::Generation` if key generation fails.
    pub fn generate(algorithm: Algorithm, bits: usize) -> Result<Self, KeyError> {
        let key = Arc::new(KeyPair::generate(algorithm, bits)?);
        Ok(Self::with_ring(
            KeyRing {
                current: Arc::clone(&key),
                keys: vec![key],
            },
            algorithm,
            bits,
        ))
    }

    /// Build a store from existing keys. The first key becomes current.
    ///
    /// # Errors
    /// Returns `KeyError::InvalidKey` if `keys` is empty or the first key
    /// cannot sign.
    pub fn from_keys(keys: Vec<KeyPair>) -> Result<Self, KeyError> {
        let keys: Vec<Arc<KeyPair>> = keys.into_iter().map(Arc::new).collect();
        let Some(current) = keys.first().map(Arc::clone) else {
            return Err(KeyError::InvalidKey("no keys supplied".to_string()));
        };
        if !current.is_private() {
            return Err(KeyError::InvalidKey(format!(
                "current key {} has no private half",
                current.key_id()
            )));
        }
        let algorithm = current.algorithm();
        let bits = current.bits();
        Ok(Self::with_ring(KeyRing { current, keys }, algorithm, bits))
    }

    fn with_ring(ring: KeyRing, algorithm: Algorithm, bits: usize) -> Self {
        Self {
            ring: RwLock::new(Arc::new(ring)),
            algorithm,
            bits,
        }
    }

    fn snapshot(&self) -> Arc<KeyRing> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&ring)
    }

    /// ID of the key currently used for signing.
    #[must_use]
    pub fn current_key_id(&self) -> String {
        self.snapshot().current.key_id().to_string()
    }

    /// Generate a new key with the store's algorithm and size and make it current.
    ///
    /// Generation happens outside the lock; previous keys stay valid for
    /// verification until retired.
    ///
    /// # Errors
    /// Returns `KeyError::Generation` if key generation fails.
    pub fn rotate(&self) -> Result<Arc<KeyPair>, KeyError> {
        let key = KeyPair::generate(self.algorithm, self.bits)?;
        self.rotate_to(key)
    }

    /// Make `key` the current signing key.
    ///
    /// # Errors
    /// Returns `KeyError::InvalidKey` if `key` has no private half.
    pub fn rotate_to(&self, key: KeyPair) -> Result<Arc<KeyPair>, KeyError> {
        if !key.is_private() {
            return Err(KeyError::InvalidKey(format!(
                "key {} has no private half",
                key.key_id()
            )));
        }
        let key = Arc::new(key);

        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let mut keys = Vec::with_capacity(ring.keys.len() + 1);
        keys.push(Arc::clone(&key));
        keys.extend(
            ring.keys
                .iter()
                .filter(|existing| existing.key_id() != key.key_id())
                .map(Arc::clone),
        );
        *ring = Arc::new(KeyRing {
            current: Arc::clone(&key),
            keys,
        });
        drop(ring);

        tracing::info!(kid = %key.key_id(), "rotated signing key");
        Ok(key)
    }

    /// Remove a previous key from the verification set.
    ///
    /// Tokens signed with it stop verifying immediately.
    ///
    /// # Errors
    /// Returns `KeyError::RetireCurrent` for the current key and
    /// `KeyError::NotFound` for an unknown key ID.
    pub fn retire(&self, key_id: &str) -> Result<(), KeyError> {
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        if ring.current.key_id() == key_id {
            return Err(KeyError::RetireCurrent(key_id.to_string()));
        }
        if !ring.keys.iter().any(|key| key.key_id() == key_id) {
            return Err(KeyError::NotFound(key_id.to_string()));
        }
        let keys = ring
            .keys
            .iter()
            .filter(|key| key.key_id() != key_id)
            .map(Arc::clone)
            .collect();
        *ring = Arc::new(KeyRing {
            current: Arc::clone(&ring.current),
            keys,
        });
        drop(ring);

        tracing::info!(kid = %key_id, "retired key");
        Ok(())
    }
}

impl KeyStore for InMemoryKeyStore {
    fn keys(&self) -> KeySet {
        KeySet::new(self.snapshot().keys.clone())
    }

    fn signing_key(&self) -> Option<Arc<KeyPair>> {
        Some(Arc::clone(&self.snapshot().current))
    }
}
