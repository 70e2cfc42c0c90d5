//! RSA signing keys tagged by key ID.
//!
//! # Invariants
//! - A generated or PEM-loaded key's ID is the truncated RFC 7638 thumbprint
//!   of its public half, so any verifier can recompute it.
//! - `private_key` and `encoding_key` are either both present or both absent.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::KeyError;
use super::jwk::JsonWebKey;

/// Smallest RSA modulus accepted for generated keys.
pub const MIN_RSA_BITS: usize = 2048;

/// Modulus size used when nothing else is configured.
pub const DEFAULT_RSA_BITS: usize = 4096;

/// Number of thumbprint bytes kept in a key ID.
const KEY_ID_BYTES: usize = 16;

/// JWS algorithm a key signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    #[default]
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    RS512,
}

impl Algorithm {
    /// The JWA name, as used in JWT headers and JWK `alg` members.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
        }
    }

    /// The equivalent `jsonwebtoken` algorithm.
    #[must_use]
    pub const fn to_jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::RS256 => jsonwebtoken::Algorithm::RS256,
            Self::RS384 => jsonwebtoken::Algorithm::RS384,
            Self::RS512 => jsonwebtoken::Algorithm::RS512,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            other => Err(KeyError::Unsupported(format!("algorithm {other}"))),
        }
    }
}

/// An RSA key, optionally including its private half.
///
/// Verification material is always present. Signing material is only present
/// for keys this process owns (generated or loaded from a private PEM); keys
/// read from a JWKS document are public-only.
pub struct KeyPair {
    key_id: String,
    algorithm: Algorithm,
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
    decoding_key: DecodingKey,
    encoding_key: Option<EncodingKey>,
}

impl KeyPair {
    /// Generate a fresh RSA key pair.
    ///
    /// # Errors
    /// Returns `KeyError::Generation` if `bits` is below [`MIN_RSA_BITS`] or
    /// the RNG fails.
    pub fn generate(algorithm: Algorithm, bits: usize) -> Result<Self, KeyError> {
        if bits < MIN_RSA_BITS {
            return Err(KeyError::Generation(format!(
                "{bits}-bit keys are below the {MIN_RSA_BITS}-bit minimum"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut rand_core::OsRng, bits)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let key = Self::from_private_key(private_key, algorithm)?;

        tracing::info!(kid = %key.key_id, %algorithm, bits, "generated signing key");
        Ok(key)
    }

    /// Build a signing-capable key from an RSA private key.
    ///
    /// # Errors
    /// Returns `KeyError::InvalidKey` if the key cannot be converted into
    /// `jsonwebtoken` key material.
    pub fn from_private_key(
        private_key: RsaPrivateKey,
        algorithm: Algorithm,
    ) -> Result<Self, KeyError> {
        let pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        let public_key = private_key.to_public_key();
        let mut key = Self::from_public_key(public_key, algorithm, None)?;
        key.private_key = Some(private_key);
        key.encoding_key = Some(encoding_key);
        Ok(key)
    }

    /// Parse a PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    ///
    /// # Errors
    /// Returns `KeyError::InvalidKey` if the PEM is neither form.
    pub fn from_pem(pem: &str, algorithm: Algorithm) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| KeyError::InvalidKey(format!("unreadable RSA private key: {e}")))?;
        Self::from_private_key(private_key, algorithm)
    }

    /// Build a verification-only key.
    ///
    /// When `key_id` is `None` the thumbprint is used.
    ///
    /// # Errors
    /// Returns `KeyError::InvalidKey` if the public components are rejected.
    pub fn from_public_key(
        public_key: RsaPublicKey,
        algorithm: Algorithm,
        key_id: Option<String>,
    ) -> Result<Self, KeyError> {
        let n = encode_component(public_key.n());
        let e = encode_component(public_key.e());
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|err| KeyError::InvalidKey(err.to_string()))?;
        let key_id = key_id.unwrap_or_else(|| thumbprint(&n, &e));

        Ok(Self {
            key_id,
            algorithm,
            public_key,
            private_key: None,
            decoding_key,
            encoding_key: None,
        })
    }

    /// Build a verification-only key from a JWK.
    ///
    /// Private members of the JWK are ignored. A JWK without `kid` gets the
    /// thumbprint; a JWK without `alg` is assumed to be RS256.
    ///
    /// # Errors
    /// Returns `KeyError::Unsupported` for non-RSA or non-signature keys and
    /// `KeyError::InvalidKey` for undecodable components.
    pub fn from_jwk(jwk: &JsonWebKey) -> Result<Self, KeyError> {
        if jwk.kty != "RSA" {
            return Err(KeyError::Unsupported(format!("key type {}", jwk.kty)));
        }
        if let Some(key_use) = jwk.key_use.as_deref().filter(|key_use| *key_use != "sig") {
            return Err(KeyError::Unsupported(format!("key use {key_use}")));
        }
        let algorithm = jwk
            .alg
            .as_deref()
            .map_or(Ok(Algorithm::RS256), Algorithm::from_str)?;

        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            return Err(KeyError::InvalidKey(
                "RSA key is missing n or e".to_string(),
            ));
        };
        let public_key = RsaPublicKey::new(decode_component(n)?, decode_component(e)?)
            .map_err(|err| KeyError::InvalidKey(err.to_string()))?;

        Self::from_public_key(public_key, algorithm, jwk.kid.clone())
    }

    /// The key ID embedded in token headers.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The algorithm this key signs and verifies with.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Whether this key carries private material.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        self.private_key.is_some()
    }

    /// Modulus size in bits.
    #[must_use]
    pub fn bits(&self) -> usize {
        self.public_key.size() * 8
    }

    /// Key material for signature checks.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Key material for signing, if this key has a private half.
    #[must_use]
    pub const fn encoding_key(&self) -> Option<&EncodingKey> {
        self.encoding_key.as_ref()
    }

    /// A copy of this key with the private half stripped.
    #[must_use]
    pub fn public_view(&self) -> Self {
        Self {
            key_id: self.key_id.clone(),
            algorithm: self.algorithm,
            public_key: self.public_key.clone(),
            private_key: None,
            decoding_key: self.decoding_key.clone(),
            encoding_key: None,
        }
    }

    /// The public JWK for this key. Never contains private members.
    #[must_use]
    pub fn to_public_jwk(&self) -> JsonWebKey {
        JsonWebKey::rsa_public(
            &self.key_id,
            self.algorithm,
            encode_component(self.public_key.n()),
            encode_component(self.public_key.e()),
        )
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("private", &self.is_private())
            .finish_non_exhaustive()
    }
}

/// Compute the key ID for RSA components already in base64url form.
///
/// This is the RFC 7638 JWK thumbprint (SHA-256 over the canonical
/// `{"e","kty","n"}` JSON), truncated to 16 bytes and hex-encoded.
#[must_use]
pub fn thumbprint(n: &str, e: &str) -> String {
    // Members in lexicographic order, no whitespace. base64url needs no escaping.
    let canonical = format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#);
    let digest = Sha256::digest(canonical.as_bytes());
    digest[..KEY_ID_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn encode_component(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

fn decode_component(value: &str) -> Result<BigUint, KeyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| KeyError::InvalidKey(format!("bad base64url component: {e}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}
