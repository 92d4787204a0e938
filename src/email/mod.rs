//! Email subsystem: IMAP mailbox session, MIME parsing, forward
//! composition and SMTP delivery.

pub mod compose;
pub mod error;
pub mod mailbox;
pub mod parser;
pub mod sender;

pub use compose::{ForwardingComposer, OutgoingMessage, address_block, to_message, to_mime};
pub use error::{EmailError, EmailResult};
pub use mailbox::{ImapMailbox, MailboxClient, MockMailbox, RawMessage, SessionState};
pub use parser::{MessagePart, ParsedMessage, PdfAttachment, parse_message};
pub use sender::{MailSender, MockSender, SmtpSender};
