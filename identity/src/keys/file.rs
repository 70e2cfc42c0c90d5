//! Keys loaded from a file at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::KeyError;
use super::jwk::JsonWebKeySet;
use super::key_pair::{Algorithm, KeyPair};
use super::store::{KeySet, KeyStore};

/// A read-only key store backed by one file, read once.
///
/// - `*.json` is parsed as a JWKS and yields verification-only keys. Private
///   JWK members in the file are ignored.
/// - Anything else is parsed as a PEM RSA private key, which also becomes the
///   signing key. This is how several instances share one signing key.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    keys: KeySet,
    signing_key: Option<Arc<KeyPair>>,
}

impl FileKeyStore {
    /// Read and parse `path`.
    ///
    /// # Errors
    /// Returns `KeyError::Io` if the file cannot be read, and
    /// `KeyError::Malformed`/`KeyError::InvalidKey` if its contents are not a
    /// usable key set.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let path = path.as_ref().to_path_buf();
        let contents = std::fs::read_to_string(&path).map_err(|source| KeyError::Io {
            path: path.clone(),
            source,
        })?;

        let is_jwks = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

        let store = if is_jwks {
            let jwks: JsonWebKeySet = serde_json::from_str(&contents)
                .map_err(|e| KeyError::Malformed(format!("{}: {e}", path.display())))?;
            Self {
                keys: KeySet::from_jwks(&jwks)?,
                signing_key: None,
                path,
            }
        } else {
            let key = Arc::new(KeyPair::from_pem(&contents, Algorithm::RS256)?);
            Self {
                keys: KeySet::new(vec![Arc::clone(&key)]),
                signing_key: Some(key),
                path,
            }
        };

        tracing::info!(
            path = %store.path.display(),
            keys = store.keys.len(),
            signing = store.signing_key.is_some(),
            "loaded keys from file"
        );
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn keys(&self) -> KeySet {
        self.keys.clone()
    }

    fn signing_key(&self) -> Option<Arc<KeyPair>> {
        self.signing_key.as_ref().map(Arc::clone)
    }
}
