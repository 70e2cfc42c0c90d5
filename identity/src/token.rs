//! Signed session tokens.
//!
//! Binds a [`Claims`] payload to an RSA signature and the signing key's ID.
//!
//! # Pre-conditions
//! - Issuing requires a key store with a current signing key.
//!
//! # Post-conditions
//! - An issued token carries the signing key's `kid` in its header.
//! - A token only verifies if its `kid` resolves to a key in the store, the
//!   header algorithm matches that key, the signature checks out, the
//!   issuer/audience match and `nbf <= now <= exp` on the injected clock.
//!
//! # Invariants
//! - The `kid` in an untrusted header only ever selects a *verification* key.
//!   Signing always uses the store's current key.
//! - Verification never reads the wall clock; time comes from [`TimeSource`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Header, Validation, decode, decode_header, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::KeyStore;
use crate::time::TimeSource;

/// How far `nbf` may precede `iat` unless configured otherwise.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// Claims carried by a session token.
///
/// Timestamps are whole seconds since the Unix epoch (JWT numeric dates).
/// Subject and tenant are optional on the wire; the session layer decides
/// whether their absence is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(rename = "tid", default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(rename = "cid", default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    #[serde(rename = "iat")]
    pub issued_at: u64,
    #[serde(rename = "nbf")]
    pub not_before: u64,
    #[serde(rename = "exp")]
    pub expires_at: u64,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "aud")]
    pub audience: String,
    /// Unique per issuance.
    #[serde(rename = "jti")]
    pub token_id: String,
}

/// Error returned when issuing or verifying a token fails.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No signing key is available, or signing itself failed.
    #[error("cannot sign token: {0}")]
    Signing(String),
    /// The claims are internally inconsistent.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
    /// The token or its header cannot be parsed, or carries no `kid`.
    #[error("malformed token")]
    Malformed,
    /// The header's `kid` does not match any known key.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
    /// The signature does not verify, or the algorithm does not match the key.
    #[error("invalid token signature")]
    InvalidSignature,
    /// `now` is past `exp`.
    #[error("token has expired")]
    Expired,
    /// `now` is before `nbf`.
    #[error("token is not valid yet")]
    NotYetValid,
    /// Issuer or audience differ from this codec's configuration.
    #[error("token {0} does not match")]
    ClaimMismatch(&'static str),
}

/// Issues and verifies signed tokens against a key store.
pub struct TokenCodec {
    keys: Arc<dyn KeyStore>,
    clock: Arc<dyn TimeSource>,
    issuer: String,
    audience: String,
    clock_skew: Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        keys: Arc<dyn KeyStore>,
        clock: Arc<dyn TimeSource>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            clock,
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Allow `nbf` to precede `iat` by up to `clock_skew`.
    #[must_use]
    pub const fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn TimeSource> {
        &self.clock
    }

    /// Whether the store currently holds a private signing key.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.keys
            .signing_key()
            .is_some_and(|key| key.encoding_key().is_some())
    }

    /// Sign `claims` with the store's current key.
    ///
    /// # Errors
    /// Returns `TokenError::InvalidClaims` unless `expires_at > not_before`
    /// and `not_before >= issued_at - clock_skew`, and `TokenError::Signing`
    /// if there is no private signing key.
    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        if claims.expires_at <= claims.not_before {
            return Err(TokenError::InvalidClaims(
                "expiry must be after not-before".to_string(),
            ));
        }
        if claims.not_before.saturating_add(self.clock_skew.as_secs()) < claims.issued_at {
            return Err(TokenError::InvalidClaims(
                "not-before precedes issued-at by more than the clock skew".to_string(),
            ));
        }

        let key = self
            .keys
            .signing_key()
            .ok_or_else(|| TokenError::Signing("no signing key configured".to_string()))?;
        let encoding_key = key
            .encoding_key()
            .ok_or_else(|| TokenError::Signing(format!("key {} has no private half", key.key_id())))?;

        let mut header = Header::new(key.algorithm().to_jwt());
        header.kid = Some(key.key_id().to_string());

        encode(&header, claims, encoding_key).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify `token` against the injected clock.
    ///
    /// # Errors
    /// See [`TokenCodec::verify_at`].
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, self.clock.now_ms())
    }

    /// Verify `token` as of `now_ms` (milliseconds since Unix epoch).
    ///
    /// # Errors
    /// Returns, in order of checking: `Malformed`, `UnknownKey`,
    /// `InvalidSignature`, `ClaimMismatch`, `Expired`, `NotYetValid`.
    pub fn verify_at(&self, token: &str, now_ms: u64) -> Result<Claims, TokenError> {
        let claims: Claims = decode_signed(&*self.keys, token)?;

        if claims.issuer != self.issuer {
            return Err(TokenError::ClaimMismatch("issuer"));
        }
        if claims.audience != self.audience {
            return Err(TokenError::ClaimMismatch("audience"));
        }
        if now_ms > claims.expires_at.saturating_mul(1000) {
            return Err(TokenError::Expired);
        }
        if now_ms < claims.not_before.saturating_mul(1000) {
            return Err(TokenError::NotYetValid);
        }

        Ok(claims)
    }
}

/// The `kid` a token's header names, if it parses and names one.
///
/// # Errors
/// `TokenError::Malformed` when the header is unreadable or has no `kid`.
pub fn key_id(token: &str) -> Result<String, TokenError> {
    decode_header(token)
        .map_err(|_| TokenError::Malformed)?
        .kid
        .ok_or(TokenError::Malformed)
}

/// Check `token`'s signature against the key its `kid` names in `keys` and
/// return its payload. No claim is checked.
///
/// # Errors
/// `Malformed`, `UnknownKey` or `InvalidSignature`.
pub fn decode_signed<T: DeserializeOwned>(keys: &dyn KeyStore, token: &str) -> Result<T, TokenError> {
    let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
    let kid = header.kid.ok_or(TokenError::Malformed)?;
    let key = keys.lookup(&kid).ok_or(TokenError::UnknownKey(kid))?;

    if header.alg != key.algorithm().to_jwt() {
        return Err(TokenError::InvalidSignature);
    }

    let validation = signature_only(key.algorithm().to_jwt());
    decode::<T>(token, key.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(map_jwt_error)
}

/// Validation that only checks the signature and algorithm.
///
/// Time and audience checks are done by the codec against the injected clock.
fn signature_only(algorithm: jsonwebtoken::Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

/// Maps jsonwebtoken errors to our `TokenError` type.
fn map_jwt_error(error: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match error.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        _ => TokenError::Malformed,
    }
}
