//! Invite secret codes.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes per code (256 bits).
pub const CODE_BYTES: usize = 32;

/// The plaintext secret that redeems an invite.
///
/// Only ever handed to the notifier; storage sees [`SecretCode::digest`].
#[derive(Clone, PartialEq, Eq)]
pub struct SecretCode(String);

impl SecretCode {
    /// Draw a fresh code from the OS-seeded CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; CODE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap caller input, trimming surrounding whitespace. Case is kept.
    #[must_use]
    pub fn from_input(input: &str) -> Self {
        Self(input.trim().to_string())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The plaintext. Callers must not log or persist it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Lowercase hex SHA-256 of the code; the storage lookup key.
    #[must_use]
    pub fn digest(&self) -> String {
        Sha256::digest(self.0.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl std::fmt::Debug for SecretCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCode(<redacted>)")
    }
}
