//! Server configuration module.
//!
//! Configuration is read from `IDENTITY_*` environment variables. Parsing
//! goes through a lookup function so tests can supply a map instead of
//! touching the process environment.
//!
//! # Environment Variables
//!
//! - `IDENTITY_LISTEN_PORT`: Port to listen on (default: `8200`)
//! - `IDENTITY_ISSUER`: Token issuer (default: `identity`)
//! - `IDENTITY_AUDIENCE`: Token audience (default: `identity`)
//! - `IDENTITY_SESSION_TTL_SECS`: Session lifetime (default: `3600`)
//! - `IDENTITY_CLOCK_SKEW_SECS`: Allowed drift between services (default: `5`)
//! - `IDENTITY_SESSION_COOKIE_NAME`: Session cookie name (default: `moov`)
//! - `IDENTITY_COOKIE_SAME_SITE`: `strict`, `lax` or `none` (default: `strict`)
//! - `IDENTITY_COOKIE_SECURE`: Set the `Secure` flag (default: `true`)
//! - `IDENTITY_INVITE_TTL_SECS`: Invite lifetime (default: `86400`)
//! - `IDENTITY_INVITE_BASE_URL`: Registration page for invite links
//!   (default: `http://localhost:8200/register`)
//! - `IDENTITY_KEYS_FILE`: PEM private key or JWKS file to load keys from
//! - `IDENTITY_KEYS_URL`: JWKS URL to load verification keys from
//! - `IDENTITY_KEY_BITS`: RSA modulus size for generated keys (default: `4096`)
//! - `IDENTITY_BOOTSTRAP_EMAIL`: Send a bootstrap invite to this address at startup
//! - `IDENTITY_BOOTSTRAP_TENANT`: Tenant for the bootstrap invite (default: a new tenant)
//! - `IDENTITY_UPSTREAM_AUDIENCE`: Client ID upstream ID tokens are issued to.
//!   Login and registration are disabled while unset.
//! - `IDENTITY_UPSTREAM_PROVIDER`: Provider name stored on credentials (default: `google`)
//! - `IDENTITY_UPSTREAM_ISSUER`: Expected `iss` of ID tokens
//!   (default: `https://accounts.google.com`)
//! - `IDENTITY_UPSTREAM_KEYS_URL`: JWKS URL of the upstream issuer
//!   (default: `https://www.googleapis.com/oauth2/v3/certs`)
//! - `IDENTITY_UPSTREAM_KEYS_FILE`: JWKS or PEM file with the upstream keys
//!
//! # Invariants
//!
//! - `listen_port` is in the range 1-65535.
//! - Session and invite TTLs are positive.
//! - At most one of `IDENTITY_KEYS_FILE` and `IDENTITY_KEYS_URL` is set;
//!   with neither, keys are generated at startup.
//! - Upstream settings without `IDENTITY_UPSTREAM_AUDIENCE` are an error.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cookie::SameSite;
use thiserror::Error;

use crate::assertion::UpstreamConfig;
use crate::ids::TenantId;
use crate::invite::InviteConfig;
use crate::keys::{Algorithm, DEFAULT_RSA_BITS, KeySourceConfig, MIN_RSA_BITS};
use crate::session::{CookieSettings, SessionConfig};

/// Server configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()`, every invariant in the module docs holds.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on for HTTP connections.
    pub listen_port: u16,
    /// `iss` claim of issued tokens; verified tokens must match.
    pub issuer: String,
    /// `aud` claim of issued tokens; verified tokens must match.
    pub audience: String,
    pub session: SessionConfig,
    pub invite: InviteConfig,
    pub key_source: KeySourceConfig,
    /// If set, an invite goes to this address at startup.
    pub bootstrap_email: Option<String>,
    pub bootstrap_tenant: Option<TenantId>,
    /// Issuer of the ID tokens presented at login and registration.
    pub upstream: Option<UpstreamConfig>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

impl ConfigError {
    fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 8200;
    /// Default token issuer and audience.
    pub const DEFAULT_ISSUER: &'static str = "identity";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is set to an invalid value, or if
    /// both key sources are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let listen_port = vars.parse("IDENTITY_LISTEN_PORT", Self::DEFAULT_PORT)?;
        if listen_port == 0 {
            return Err(ConfigError::invalid(
                "IDENTITY_LISTEN_PORT",
                "must be 1-65535",
            ));
        }

        let issuer = vars.non_empty("IDENTITY_ISSUER", Self::DEFAULT_ISSUER)?;
        let audience = vars.non_empty("IDENTITY_AUDIENCE", Self::DEFAULT_ISSUER)?;

        let session = SessionConfig {
            ttl: vars.positive_secs("IDENTITY_SESSION_TTL_SECS", SessionConfig::DEFAULT_TTL)?,
            clock_skew: Duration::from_secs(vars.parse(
                "IDENTITY_CLOCK_SKEW_SECS",
                SessionConfig::DEFAULT_CLOCK_SKEW.as_secs(),
            )?),
            cookie: Self::load_cookie(&vars)?,
        };

        let invite = InviteConfig {
            ttl: vars.positive_secs("IDENTITY_INVITE_TTL_SECS", InviteConfig::DEFAULT_TTL)?,
            base_url: vars.non_empty("IDENTITY_INVITE_BASE_URL", InviteConfig::DEFAULT_BASE_URL)?,
        };

        let bootstrap_tenant = vars
            .optional("IDENTITY_BOOTSTRAP_TENANT")
            .map(|value| {
                TenantId::from_str(&value).map_err(|e| {
                    ConfigError::invalid("IDENTITY_BOOTSTRAP_TENANT", format!("'{value}' is not a UUID: {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            listen_port,
            issuer,
            audience,
            session,
            invite,
            key_source: Self::load_key_source(&vars)?,
            bootstrap_email: vars.optional("IDENTITY_BOOTSTRAP_EMAIL"),
            bootstrap_tenant,
            upstream: Self::load_upstream(&vars)?,
        })
    }

    fn load_upstream<F: Fn(&str) -> Option<String>>(
        vars: &Vars<F>,
    ) -> Result<Option<UpstreamConfig>, ConfigError> {
        const AUDIENCE: &str = "IDENTITY_UPSTREAM_AUDIENCE";
        const RELATED: [&str; 4] = [
            "IDENTITY_UPSTREAM_PROVIDER",
            "IDENTITY_UPSTREAM_ISSUER",
            "IDENTITY_UPSTREAM_KEYS_URL",
            "IDENTITY_UPSTREAM_KEYS_FILE",
        ];

        let Some(audience) = vars.optional(AUDIENCE) else {
            if RELATED.iter().any(|name| vars.optional(name).is_some()) {
                return Err(ConfigError::MissingEnvVar(AUDIENCE.to_string()));
            }
            return Ok(None);
        };

        let keys = match (
            vars.optional("IDENTITY_UPSTREAM_KEYS_FILE"),
            vars.optional("IDENTITY_UPSTREAM_KEYS_URL"),
        ) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::invalid(
                    "IDENTITY_UPSTREAM_KEYS_URL",
                    "cannot be combined with IDENTITY_UPSTREAM_KEYS_FILE",
                ));
            }
            (Some(path), None) => KeySourceConfig::File(PathBuf::from(path)),
            (None, Some(url)) => KeySourceConfig::Remote(url),
            (None, None) => KeySourceConfig::Remote(UpstreamConfig::DEFAULT_KEYS_URL.to_string()),
        };

        Ok(Some(UpstreamConfig {
            provider: vars.non_empty("IDENTITY_UPSTREAM_PROVIDER", UpstreamConfig::DEFAULT_PROVIDER)?,
            issuer: vars.non_empty("IDENTITY_UPSTREAM_ISSUER", UpstreamConfig::DEFAULT_ISSUER)?,
            audience,
            keys,
        }))
    }

    fn load_cookie<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<CookieSettings, ConfigError> {
        let same_site = match vars.optional("IDENTITY_COOKIE_SAME_SITE") {
            None => SameSite::Strict,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "strict" => SameSite::Strict,
                "lax" => SameSite::Lax,
                "none" => SameSite::None,
                _ => {
                    return Err(ConfigError::invalid(
                        "IDENTITY_COOKIE_SAME_SITE",
                        format!("'{value}' is not one of strict, lax, none"),
                    ));
                }
            },
        };

        let secure = match vars.optional("IDENTITY_COOKIE_SECURE") {
            None => true,
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::invalid("IDENTITY_COOKIE_SECURE", format!("'{value}' is not a boolean"))
            })?,
        };

        Ok(CookieSettings {
            name: vars.non_empty("IDENTITY_SESSION_COOKIE_NAME", crate::session::cookie::DEFAULT_COOKIE_NAME)?,
            same_site,
            // `SameSite=None` is only honoured on secure cookies.
            secure: secure || same_site == SameSite::None,
        })
    }

    fn load_key_source<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<KeySourceConfig, ConfigError> {
        let bits = vars.parse("IDENTITY_KEY_BITS", DEFAULT_RSA_BITS)?;
        if bits < MIN_RSA_BITS {
            return Err(ConfigError::invalid(
                "IDENTITY_KEY_BITS",
                format!("must be at least {MIN_RSA_BITS}"),
            ));
        }

        match (
            vars.optional("IDENTITY_KEYS_FILE"),
            vars.optional("IDENTITY_KEYS_URL"),
        ) {
            (Some(_), Some(_)) => Err(ConfigError::invalid(
                "IDENTITY_KEYS_URL",
                "cannot be combined with IDENTITY_KEYS_FILE",
            )),
            (Some(path), None) => Ok(KeySourceConfig::File(PathBuf::from(path))),
            (None, Some(url)) => Ok(KeySourceConfig::Remote(url)),
            (None, None) => Ok(KeySourceConfig::Generated {
                algorithm: Algorithm::RS256,
                bits,
            }),
        }
    }
}

/// Variable access over a lookup function.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// The trimmed value of `name`, treating empty as unset.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::invalid(name, format!("'{value}' is not a valid number"))),
        }
    }

    fn positive_secs(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.parse(name, default.as_secs())? {
            0 => Err(ConfigError::invalid(name, "must be greater than 0")),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    fn non_empty(&self, name: &str, default: &str) -> Result<String, ConfigError> {
        match (self.0)(name) {
            None => Ok(default.to_string()),
            Some(value) if value.trim().is_empty() => {
                Err(ConfigError::invalid(name, "must not be empty"))
            }
            Some(value) => Ok(value.trim().to_string()),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
