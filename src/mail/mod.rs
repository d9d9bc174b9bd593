//! Digest email delivery.
//!
//! The email transport primitive is reached through the [`EmailTransport`]
//! trait; the production implementation is [`SmtpMailer`], which builds the
//! plain-text MIME message and hands it to an async SMTP relay.
//!
//! Send failures are the scheduled path's problem to absorb: they are
//! logged there and never crash the host process.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::error::{Error, Result};

// ============================================================================
// OutgoingEmail
// ============================================================================

/// One digest email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

// ============================================================================
// EmailTransport
// ============================================================================

/// Email transport primitive.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Delivers one email.
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

// ============================================================================
// SmtpMailer
// ============================================================================

/// SMTP implementation of [`EmailTransport`].
#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    /// Creates a mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an address cannot be parsed or the
    /// relay cannot be configured.
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::config(format!("invalid from address: {e}")))?;
        let to: Mailbox = config
            .to
            .parse()
            .map_err(|e| Error::config(format!("invalid to address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| Error::config(format!("invalid SMTP relay: {e}")))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        debug!(host = %config.smtp_host, port = config.smtp_port, "SMTP mailer configured");

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| Error::email_send(format!("cannot build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::email_send(e.to_string()))?;

        info!(to = %self.to, subject = %email.subject, "Digest email sent");
        Ok(())
    }
}

// ============================================================================
// Test Mocks
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    //! Recording transport used by the scheduler tests.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::{Error, Result};

    use super::{EmailTransport, OutgoingEmail};

    /// Transport recording every send, optionally failing them all.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub attempts: AtomicUsize,
        pub fail: bool,
    }

    impl MockTransport {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl EmailTransport for MockTransport {
        async fn send(&self, email: OutgoingEmail) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                return Err(Error::email_send("relay unavailable"));
            }

            self.sent.lock().push(email);
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailer_from_default_config() {
        let mailer = SmtpMailer::from_config(&EmailConfig::default());
        assert!(mailer.is_ok());
    }

    #[test]
    fn test_mailer_rejects_invalid_addresses() {
        let config = EmailConfig {
            from: "not an address".to_string(),
            ..EmailConfig::default()
        };

        let err = SmtpMailer::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_mailer_parses_display_name_addresses() {
        let config = EmailConfig {
            from: "HN Digest <digest@example.com>".to_string(),
            to: "Reader <reader@example.com>".to_string(),
            ..EmailConfig::default()
        };

        assert!(SmtpMailer::from_config(&config).is_ok());
    }
}
