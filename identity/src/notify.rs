//! Outbound notifications.
//!
//! Delivery (SMTP, a mail API) lives outside this crate behind
//! [`NotificationSender`]. [`LoggingNotifier`] is the development sink.

use async_trait::async_trait;
use thiserror::Error;

/// Error returned when a notification cannot be delivered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// The kinds of email this service sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    /// An invitation to register. `invite_url` embeds the secret code.
    Invite {
        invite_url: String,
        /// Milliseconds since Unix epoch.
        expires_on: u64,
    },
}

impl EmailTemplate {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Invite { .. } => "invite",
        }
    }
}

/// A rendered email.
#[derive(Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub template: EmailTemplate,
}

// The template carries secret URLs; only its name is printed.
impl std::fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailMessage")
            .field("subject", &self.subject)
            .field("template", &self.template.name())
            .finish()
    }
}

impl EmailMessage {
    #[must_use]
    pub fn invite(invite_url: String, expires_on: u64) -> Self {
        Self {
            subject: "You have been invited".to_string(),
            template: EmailTemplate::Invite {
                invite_url,
                expires_on,
            },
        }
    }
}

/// Sends email on behalf of the services.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Logs deliveries instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationSender for LoggingNotifier {
    async fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotifyError> {
        // Development only: the URL carries the secret code.
        match &message.template {
            EmailTemplate::Invite { invite_url, .. } => {
                tracing::info!(%to, subject = %message.subject, %invite_url, "email (not sent)");
            }
        }
        Ok(())
    }
}
