//! Upstream credential assertions.
//!
//! Login and registration never take a provider or subject from the request
//! body. The caller presents an ID token signed by an upstream OIDC issuer,
//! and `(provider, subject, nonce)` are read from it once its signature,
//! issuer, audience and validity window check out.
//!
//! # Invariants
//! - A provider is selected by the `kid` of the token header; its key store
//!   is the only one consulted for that token.
//! - Time comes from the injected [`TimeSource`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::{KeySourceConfig, KeyStore};
use crate::time::TimeSource;
use crate::token::{self, TokenError};

/// Where an upstream provider's assertions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Name stored on credentials, e.g. `google`.
    pub provider: String,
    /// Expected `iss`.
    pub issuer: String,
    /// Expected `aud`: this service's client ID at the provider.
    pub audience: String,
    /// The provider's published verification keys.
    pub keys: KeySourceConfig,
}

impl UpstreamConfig {
    pub const DEFAULT_PROVIDER: &'static str = "google";
    pub const DEFAULT_ISSUER: &'static str = "https://accounts.google.com";
    pub const DEFAULT_KEYS_URL: &'static str = "https://www.googleapis.com/oauth2/v3/certs";
}

/// `aud` is a string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(value) => value == audience,
            Self::Many(values) => values.iter().any(|value| value == audience),
        }
    }
}

/// The ID token claims this service reads. Timestamps are seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    pub aud: Audience,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// What a verified assertion vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAssertion {
    pub provider: String,
    pub subject_id: String,
    pub nonce: String,
}

#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("no credential assertion presented")]
    Missing,
    #[error("assertion is missing the '{0}' claim")]
    MissingClaim(&'static str),
    #[error("invalid assertion: {0}")]
    Token(#[from] TokenError),
}

/// One trusted upstream issuer.
pub struct UpstreamProvider {
    name: String,
    issuer: String,
    audience: String,
    keys: Arc<dyn KeyStore>,
}

impl UpstreamProvider {
    #[must_use]
    pub fn new(config: &UpstreamConfig, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            name: config.provider.clone(),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            keys,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Verifies assertions against the configured upstream providers.
pub struct AssertionVerifier {
    providers: Vec<UpstreamProvider>,
    clock: Arc<dyn TimeSource>,
    clock_skew: Duration,
}

impl AssertionVerifier {
    #[must_use]
    pub fn new(
        providers: Vec<UpstreamProvider>,
        clock: Arc<dyn TimeSource>,
        clock_skew: Duration,
    ) -> Self {
        Self {
            providers,
            clock,
            clock_skew,
        }
    }

    /// No providers: every assertion is rejected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Verify `assertion` and return what it vouches for.
    ///
    /// # Errors
    /// `Missing` for blank input, `Token` when no provider knows the `kid` or
    /// the signature, issuer, audience or validity window fail, and
    /// `MissingClaim` when `sub` or `nonce` are absent.
    pub fn verify(&self, assertion: &str) -> Result<VerifiedAssertion, AssertionError> {
        let assertion = assertion.trim();
        if assertion.is_empty() {
            return Err(AssertionError::Missing);
        }

        let kid = token::key_id(assertion)?;
        let provider = self
            .providers
            .iter()
            .find(|provider| provider.keys.lookup(&kid).is_some())
            .ok_or(TokenError::UnknownKey(kid))?;

        let claims: IdTokenClaims = token::decode_signed(&*provider.keys, assertion)?;
        if claims.iss != provider.issuer {
            return Err(TokenError::ClaimMismatch("issuer").into());
        }
        if !claims.aud.contains(&provider.audience) {
            return Err(TokenError::ClaimMismatch("audience").into());
        }

        let now_ms = self.clock.now_ms();
        let skew_ms = u64::try_from(self.clock_skew.as_millis()).unwrap_or(u64::MAX);
        if now_ms > claims.exp.saturating_mul(1000).saturating_add(skew_ms) {
            return Err(TokenError::Expired.into());
        }
        let starts = claims.nbf.or(claims.iat).unwrap_or(0);
        if now_ms.saturating_add(skew_ms) < starts.saturating_mul(1000) {
            return Err(TokenError::NotYetValid.into());
        }

        let subject_id = claims.sub.trim();
        if subject_id.is_empty() {
            return Err(AssertionError::MissingClaim("sub"));
        }
        let nonce = claims
            .nonce
            .as_deref()
            .map(str::trim)
            .filter(|nonce| !nonce.is_empty())
            .ok_or(AssertionError::MissingClaim("nonce"))?;

        Ok(VerifiedAssertion {
            provider: provider.name.clone(),
            subject_id: subject_id.to_string(),
            nonce: nonce.to_string(),
        })
    }
}
