//! Email subsystem error types with rich miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from the mailbox session, MIME parsing, composition and delivery.
#[derive(Debug, Error, Diagnostic)]
pub enum EmailError {
    #[error("mailbox connection failed: {message}")]
    #[diagnostic(
        code(mailroute::email::connection),
        help(
            "Check that the IMAP server is reachable and the host/port are correct. \
             The mailbox is always opened over implicit TLS (IMAPS)."
        )
    )]
    Connection { message: String },

    #[error("mailbox authentication failed: {message}")]
    #[diagnostic(
        code(mailroute::email::auth),
        help(
            "Check the IMAP user and password. Providers with 2FA usually require \
             an app password."
        )
    )]
    Authentication { message: String },

    #[error("failed to fetch message {id}: {message}")]
    #[diagnostic(
        code(mailroute::email::fetch),
        help("The server rejected the FETCH or returned no body for this identifier.")
    )]
    Fetch { id: String, message: String },

    #[error("failed to update flags on message {id}: {message}")]
    #[diagnostic(
        code(mailroute::email::store),
        help("The server rejected STORE +FLAGS (\\Seen) for this identifier.")
    )]
    Store { id: String, message: String },

    #[error("email parsing failed: {message}")]
    #[diagnostic(
        code(mailroute::email::parse),
        help(
            "The MIME message could not be parsed. It may be malformed or use an \
             unsupported encoding. Check the raw message for RFC 5322 compliance."
        )
    )]
    Parse { message: String },

    #[error("failed to compose outgoing message: {message}")]
    #[diagnostic(
        code(mailroute::email::compose),
        help("Check that the sender and recipient addresses are valid RFC 5322 mailboxes.")
    )]
    Compose { message: String },

    #[error("email delivery failed: {message}")]
    #[diagnostic(
        code(mailroute::email::delivery),
        help(
            "SMTP delivery failed. Check the SMTP server configuration, that it \
             supports STARTTLS on the configured port, and the sender credentials."
        )
    )]
    Delivery { message: String },
}

/// Convenience alias for email operations.
pub type EmailResult<T> = std::result::Result<T, EmailError>;
