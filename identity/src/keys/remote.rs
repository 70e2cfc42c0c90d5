//! Keys fetched once from a remote JWKS endpoint.

use std::time::Duration;

use super::KeyError;
use super::jwk::JsonWebKeySet;
use super::store::{KeySet, KeyStore};

/// How long the startup fetch may take.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A read-only, verification-only key store holding a snapshot of a remote
/// JWKS document.
///
/// The document is fetched once at construction and never refreshed, so
/// verification never waits on the network.
#[derive(Debug)]
pub struct RemoteKeyStore {
    url: String,
    keys: KeySet,
}

impl RemoteKeyStore {
    /// Fetch the JWKS at `url`.
    ///
    /// # Errors
    /// Returns `KeyError::Fetch` if the endpoint is unreachable or answers
    /// with a non-success status, and `KeyError::Malformed`/`KeyError::InvalidKey`
    /// if the document is not a usable, non-empty key set.
    pub async fn fetch(url: &str) -> Result<Self, KeyError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| fetch_error(url, &e))?;
        Self::fetch_with_client(&client, url).await
    }

    /// Fetch the JWKS at `url` using an existing HTTP client.
    ///
    /// # Errors
    /// See [`RemoteKeyStore::fetch`].
    pub async fn fetch_with_client(client: &reqwest::Client, url: &str) -> Result<Self, KeyError> {
        let response = client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_error(url, &e))?;

        let body = response.bytes().await.map_err(|e| fetch_error(url, &e))?;
        let jwks: JsonWebKeySet = serde_json::from_slice(&body)
            .map_err(|e| KeyError::Malformed(format!("{url}: {e}")))?;
        let keys = KeySet::from_jwks(&jwks)?;

        tracing::info!(%url, keys = keys.len(), "loaded keys from remote JWKS");
        Ok(Self {
            url: url.to_string(),
            keys,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl KeyStore for RemoteKeyStore {
    fn keys(&self) -> KeySet {
        self.keys.clone()
    }
}

fn fetch_error(url: &str, error: &reqwest::Error) -> KeyError {
    KeyError::Fetch {
        url: url.to_string(),
        reason: error.to_string(),
    }
}
