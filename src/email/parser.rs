//! MIME email parsing via `mail-parser`.
//!
//! Walks the part tree once and classifies every part into a closed set of
//! variants (`MessagePart`). `ParsedMessage` is folded from those variants,
//! so nothing downstream looks at raw Content-Type strings again.

use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::extract::html::html_to_text;

use super::error::{EmailError, EmailResult};

// ── MessagePart ─────────────────────────────────────────────────────────

/// A PDF attachment carried by a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfAttachment {
    pub filename: String,
    /// Decoded attachment bytes.
    pub data: Vec<u8>,
}

/// The kinds of MIME leaf the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    /// Inline `text/plain` (decoded).
    Text(String),
    /// Inline `text/html`, already stripped to text.
    Html(String),
    /// `application/pdf` attachment with a filename.
    PdfAttachment(PdfAttachment),
    /// Any other attachment.
    OtherAttachment {
        content_type: String,
        filename: Option<String>,
    },
}

// ── ParsedMessage ───────────────────────────────────────────────────────

/// Structured view of an inbound message.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// `From` header rendered as `Name <addr>` (or just the address).
    pub sender: String,
    /// Fully decoded subject.
    pub subject: String,
    /// Last inline `text/plain` part.
    pub body_plain: Option<String>,
    /// Last inline `text/html` part, stripped to text.
    pub body_html_text: Option<String>,
    /// Last qualifying PDF attachment in tree order.
    pub pdf_attachment: Option<PdfAttachment>,
    /// Number of attachments that were not retained.
    pub other_attachments: usize,
}

impl ParsedMessage {
    /// Plain text if present, else stripped HTML, else empty.
    pub fn selected_body(&self) -> &str {
        self.body_plain
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.body_html_text.as_deref())
            .unwrap_or("")
    }

    /// Fold classified parts in tree order. Later parts overwrite earlier ones.
    pub fn from_parts(
        sender: String,
        subject: String,
        parts: impl IntoIterator<Item = MessagePart>,
    ) -> Self {
        let mut parsed = Self {
            sender,
            subject,
            ..Default::default()
        };
        for part in parts {
            match part {
                MessagePart::Text(text) => parsed.body_plain = Some(text),
                MessagePart::Html(text) => parsed.body_html_text = Some(text),
                MessagePart::PdfAttachment(pdf) => {
                    if let Some(previous) = parsed.pdf_attachment.replace(pdf) {
                        tracing::debug!(filename = %previous.filename, "discarding earlier PDF attachment");
                        parsed.other_attachments += 1;
                    }
                }
                MessagePart::OtherAttachment { .. } => parsed.other_attachments += 1,
            }
        }
        parsed
    }
}

// ── parse_message ───────────────────────────────────────────────────────

/// Parse raw RFC 5322 bytes into a `ParsedMessage`.
pub fn parse_message(data: &[u8]) -> EmailResult<ParsedMessage> {
    let message = MessageParser::default()
        .parse(data)
        .ok_or_else(|| EmailError::Parse {
            message: format!("failed to parse MIME message ({} bytes)", data.len()),
        })?;

    let sender = extract_sender(&message);
    let subject = message.subject().unwrap_or_default().to_string();

    let mut parts = Vec::new();
    collect_parts(&message, &mut parts);
    let parsed = ParsedMessage::from_parts(sender, subject, parts);

    if let Some(pdf) = &parsed.pdf_attachment {
        tracing::info!(filename = %pdf.filename, bytes = pdf.data.len(), "found PDF attachment");
    }
    Ok(parsed)
}

/// Classify every leaf in tree order, descending into attached
/// `message/rfc822` parts at the position they occur.
fn collect_parts(message: &mail_parser::Message<'_>, out: &mut Vec<MessagePart>) {
    for part in &message.parts {
        if let PartType::Message(nested) = &part.body {
            collect_parts(nested, out);
        } else if let Some(classified) = classify_part(part) {
            out.push(classified);
        }
    }
}

/// Classify a single MIME part; multipart containers and inline
/// non-text parts yield `None`.
fn classify_part(part: &mail_parser::MessagePart<'_>) -> Option<MessagePart> {
    let content_type = content_type_of(part);
    let is_attachment = part
        .content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));

    if is_attachment {
        let filename = part.attachment_name().map(|s| s.to_string());
        return Some(match (content_type.as_str(), filename) {
            ("application/pdf", Some(filename)) => MessagePart::PdfAttachment(PdfAttachment {
                filename,
                data: part.contents().to_vec(),
            }),
            (_, filename) => MessagePart::OtherAttachment {
                content_type,
                filename,
            },
        });
    }

    match content_type.as_str() {
        "text/plain" => Some(MessagePart::Text(part_text(part))),
        "text/html" => Some(MessagePart::Html(html_to_text(&part_text(part)))),
        _ => None,
    }
}

/// Lower-cased `type/subtype`; parts without a Content-Type are `text/plain`.
fn content_type_of(part: &mail_parser::MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_lowercase(),
            None => ct.ctype().to_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}

fn part_text(part: &mail_parser::MessagePart<'_>) -> String {
    match part.text_contents() {
        Some(text) => text.to_string(),
        None => String::from_utf8_lossy(part.contents()).into_owned(),
    }
}

fn extract_sender(message: &mail_parser::Message<'_>) -> String {
    let Some(first) = message.from().and_then(|addr| addr.first()) else {
        return String::new();
    };
    match (first.name(), first.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
