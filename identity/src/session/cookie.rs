//! Session cookie construction.

use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite};

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "moov";

/// How the session cookie is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub name: String,
    pub same_site: SameSite,
    /// Ignored (forced on) when `same_site` is `None`.
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            same_site: SameSite::Strict,
            secure: true,
        }
    }
}

impl CookieSettings {
    /// Browsers drop `SameSite=None` cookies that are not `Secure`.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure || self.same_site == SameSite::None
    }

    /// A cookie carrying `token`, living `max_age_secs` and expiring at
    /// `expires_at` (seconds since Unix epoch).
    #[must_use]
    pub fn session_cookie(&self, token: &str, max_age_secs: u64, expires_at: u64) -> Cookie<'static> {
        let max_age = Duration::seconds(i64::try_from(max_age_secs).unwrap_or(i64::MAX));
        let expires = i64::try_from(expires_at)
            .ok()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());

        Cookie::build((self.name.clone(), token.to_string()))
            .path("/")
            .http_only(true)
            .same_site(self.same_site)
            .secure(self.is_secure())
            .max_age(max_age)
            .expires(expires)
            .build()
    }

    /// A cookie that tells the browser to drop the session.
    #[must_use]
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), String::new()))
            .path("/")
            .http_only(true)
            .same_site(self.same_site)
            .secure(self.is_secure())
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH)
            .build()
    }
}
