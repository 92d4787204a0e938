//! Forwarding decision and outgoing message composition.
//!
//! The outgoing message keeps the original subject, carries the original
//! selected body plus an optional `Address:` block, and re-attaches the PDF
//! unchanged. Rendering to RFC 5322 MIME goes through `lettre`.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};

use super::error::{EmailError, EmailResult};
use super::parser::{ParsedMessage, PdfAttachment};
use crate::llm::ExtractionResult;

// ── OutgoingMessage ─────────────────────────────────────────────────────

/// A forwarded message ready for SMTP delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// The original PDF, byte-identical.
    pub attachment: Option<PdfAttachment>,
}

// ── ForwardingComposer ──────────────────────────────────────────────────

/// Decides whether a message is forwarded and builds the forward.
#[derive(Debug, Clone)]
pub struct ForwardingComposer {
    sender_email: String,
}

impl ForwardingComposer {
    pub fn new(sender_email: impl Into<String>) -> Self {
        Self {
            sender_email: sender_email.into(),
        }
    }

    /// Forward only when a recipient was found.
    pub fn decide(&self, extraction: &ExtractionResult) -> bool {
        extraction.recipient().is_some()
    }

    /// Build the forward of `parsed` to the extracted recipient.
    pub fn compose(
        &self,
        parsed: &ParsedMessage,
        extraction: &ExtractionResult,
    ) -> EmailResult<OutgoingMessage> {
        let to = extraction.recipient().ok_or_else(|| EmailError::Compose {
            message: "no recipient to forward to".into(),
        })?;
        parse_mailbox("From", &self.sender_email)?;
        parse_mailbox("To", to)?;

        let mut body = parsed.selected_body().to_string();
        if let Some(address) = extraction.address() {
            body.push_str(&address_block(address));
        }

        Ok(OutgoingMessage {
            from: self.sender_email.clone(),
            to: to.to_string(),
            subject: parsed.subject.clone(),
            body,
            attachment: parsed.pdf_attachment.clone(),
        })
    }
}

/// The delimited block appended to a forwarded body.
pub fn address_block(address: &str) -> String {
    format!("\n\n---\nAddress:\n{address}")
}

// ── to_message / to_mime ────────────────────────────────────────────────

/// Render an `OutgoingMessage` as a `multipart/mixed` `lettre` message.
pub fn to_message(outgoing: &OutgoingMessage) -> EmailResult<Message> {
    let builder = Message::builder()
        .from(parse_mailbox("From", &outgoing.from)?)
        .to(parse_mailbox("To", &outgoing.to)?)
        .subject(outgoing.subject.clone());

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(outgoing.body.clone()));
    if let Some(pdf) = &outgoing.attachment {
        let content_type =
            ContentType::parse("application/pdf").map_err(|e| EmailError::Compose {
                message: format!("invalid attachment content type: {e}"),
            })?;
        parts = parts.singlepart(
            Attachment::new(pdf.filename.clone()).body(pdf.data.clone(), content_type),
        );
    }

    builder.multipart(parts).map_err(|e| EmailError::Compose {
        message: format!("failed to build MIME message: {e}"),
    })
}

/// Render an `OutgoingMessage` to raw RFC 5322 bytes.
pub fn to_mime(outgoing: &OutgoingMessage) -> EmailResult<Vec<u8>> {
    Ok(to_message(outgoing)?.formatted())
}

fn parse_mailbox(header: &str, addr: &str) -> EmailResult<Mailbox> {
    addr.parse().map_err(|e| EmailError::Compose {
        message: format!("invalid {header} address \"{addr}\": {e}"),
    })
}

// ── Tests ───────────────────────────────────────────────────────────────
