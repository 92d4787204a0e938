//! Outbound delivery over SMTP with explicit STARTTLS.
//!
//! One connection per message: `SmtpSender::send` opens a session,
//! authenticates, transmits and closes.

use std::collections::HashSet;
use std::sync::Mutex;

use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};

use super::compose::{OutgoingMessage, to_message};
use super::error::{EmailError, EmailResult};
use crate::config::SmtpConfig;

/// Delivers composed messages.
pub trait MailSender {
    fn send(&self, outgoing: &OutgoingMessage) -> EmailResult<()>;
}

// ── SmtpSender ──────────────────────────────────────────────────────────

/// SMTP submission client (STARTTLS on the configured port).
pub struct SmtpSender {
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> EmailResult<SmtpTransport> {
        let builder =
            SmtpTransport::starttls_relay(&self.config.host).map_err(|e| EmailError::Delivery {
                message: format!("invalid SMTP relay {}: {e}", self.config.host),
            })?;
        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.sender_email.clone(),
                self.config.sender_password.clone(),
            ))
            .build())
    }
}

impl MailSender for SmtpSender {
    fn send(&self, outgoing: &OutgoingMessage) -> EmailResult<()> {
        let message = to_message(outgoing)?;
        let transport = self.transport()?;

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            to = %outgoing.to,
            "sending forwarded email"
        );
        transport.send(&message).map_err(|e| EmailError::Delivery {
            message: format!("SMTP send to {} failed: {e}", outgoing.to),
        })?;
        tracing::info!(to = %outgoing.to, "email forwarded");
        Ok(())
    }
}

impl std::fmt::Debug for SmtpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSender")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish()
    }
}

// ── MockSender ──────────────────────────────────────────────────────────

/// In-memory sender for tests. Records every delivered message.
#[derive(Debug, Default)]
pub struct MockSender {
    sent: Mutex<Vec<OutgoingMessage>>,
    reject: HashSet<String>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail delivery to `recipient` with a `Delivery` error.
    pub fn rejecting(mut self, recipient: &str) -> Self {
        self.reject.insert(recipient.to_string());
        self
    }

    /// Messages delivered so far, in order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl MailSender for MockSender {
    fn send(&self, outgoing: &OutgoingMessage) -> EmailResult<()> {
        if self.reject.contains(&outgoing.to) {
            return Err(EmailError::Delivery {
                message: format!("550 mailbox unavailable: {}", outgoing.to),
            });
        }
        // Exercise MIME rendering like the real sender does.
        to_message(outgoing)?;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(outgoing.clone());
        }
        Ok(())
    }
}
