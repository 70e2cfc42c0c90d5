//! JSON Web Key (RFC 7517) documents.
//!
//! Only RSA keys are modeled. The private RSA members (`d`, `p`, `q`, `dp`,
//! `dq`, `qi`) are deserialized so that a document carrying them can be
//! detected and filtered, never so they can be used.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::key_pair::Algorithm;

/// A single JWK.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qi: Option<String>,
}

impl JsonWebKey {
    /// A public RSA signing key.
    #[must_use]
    pub fn rsa_public(key_id: &str, algorithm: Algorithm, n: String, e: String) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: Some(key_id.to_string()),
            alg: Some(algorithm.as_str().to_string()),
            key_use: Some("sig".to_string()),
            n: Some(n),
            e: Some(e),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
        }
    }

    /// Whether any private member is present and non-empty.
    #[must_use]
    pub fn is_private(&self) -> bool {
        [&self.d, &self.p, &self.q, &self.dp, &self.dq, &self.qi]
            .into_iter()
            .any(|member| member.as_deref().is_some_and(|value| !value.is_empty()))
    }
}

impl fmt::Debug for JsonWebKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonWebKey")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("private", &self.is_private())
            .finish_non_exhaustive()
    }
}

/// A JWK Set, as served from `/.well-known/jwks.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// Find a key by `kid`.
    #[must_use]
    pub fn find(&self, key_id: &str) -> Option<&JsonWebKey> {
        self.keys
            .iter()
            .find(|key| key.kid.as_deref() == Some(key_id))
    }

    /// Drop every key that carries private material.
    #[must_use]
    pub fn public_only(mut self) -> Self {
        self.keys.retain(|key| !key.is_private());
        self
    }
}
