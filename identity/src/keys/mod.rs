//! Signing and verification key management.
//!
//! A key store holds RSA keys tagged by key ID (kid). Three backends share the
//! [`KeyStore`] capability:
//!
//! - [`InMemoryKeyStore`]: generated at boot (or built from supplied keys),
//!   rotatable, signing-capable.
//! - [`FileKeyStore`]: read once from a PEM private key or a JWKS file.
//! - [`RemoteKeyStore`]: fetched once from a JWKS URL, verification only.
//!
//! # Invariants
//! - Private key material never leaves a `KeyPair`; everything published goes
//!   through [`KeySet::to_public_jwks`].
//! - File and remote backends either load a complete key set or fail at
//!   construction.

pub mod file;
pub mod jwk;
pub mod key_pair;
pub mod remote;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use file::FileKeyStore;
pub use jwk::{JsonWebKey, JsonWebKeySet};
pub use key_pair::{Algorithm, DEFAULT_RSA_BITS, KeyPair, MIN_RSA_BITS};
pub use remote::RemoteKeyStore;
pub use store::{InMemoryKeyStore, KeySet, KeyStore};

/// Errors raised while creating, loading or managing keys.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("unsupported key: {0}")]
    Unsupported(String),
    #[error("malformed key set: {0}")]
    Malformed(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch key set from {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("key {0} is the current signing key")]
    RetireCurrent(String),
    #[error("key {0} not found")]
    NotFound(String),
}

/// Where the process gets its keys from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySourceConfig {
    /// Generate a fresh key at startup.
    Generated { algorithm: Algorithm, bits: usize },
    /// Read a PEM private key or a JWKS document from disk.
    File(PathBuf),
    /// Fetch a JWKS document over HTTP.
    Remote(String),
}

impl Default for KeySourceConfig {
    fn default() -> Self {
        Self::Generated {
            algorithm: Algorithm::RS256,
            bits: DEFAULT_RSA_BITS,
        }
    }
}

/// Build the key store selected by `config`.
///
/// # Errors
/// Propagates the backend's construction error; nothing is retried.
pub async fn open_key_store(config: &KeySourceConfig) -> Result<Arc<dyn KeyStore>, KeyError> {
    let store: Arc<dyn KeyStore> = match config {
        KeySourceConfig::Generated { algorithm, bits } => {
            let (algorithm, bits) = (*algorithm, *bits);
            // RSA generation is CPU-bound; keep it off the async workers.
            let store = tokio::task::spawn_blocking(move || {
                InMemoryKeyStore::generate(algorithm, bits)
            })
            .await
            .map_err(|e| KeyError::Generation(e.to_string()))??;
            Arc::new(store)
        }
        KeySourceConfig::File(path) => Arc::new(FileKeyStore::open(path)?),
        KeySourceConfig::Remote(url) => Arc::new(RemoteKeyStore::fetch(url).await?),
    };
    Ok(store)
}
