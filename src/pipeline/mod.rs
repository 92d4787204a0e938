//! Batch pipeline: unseen mail in, forwarded mail out.
//!
//! `PipelineOrchestrator` runs each unseen message through
//! fetch → parse → extract → classify → decide/compose → send → mark seen.
//! Every failure is contained at message granularity and recorded in that
//! message's `ProcessingResult`; the batch itself never fails.

pub mod report;

pub use report::{BatchReport, ProcessingResult};

use std::panic::{AssertUnwindSafe, catch_unwind};

use miette::Diagnostic;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::email::{
    EmailError, ForwardingComposer, ImapMailbox, MailSender, MailboxClient, SmtpSender,
};
use crate::extract::{ContentExtractor, ExtractError, TesseractOcr};
use crate::llm::{GroqExtractor, InformationExtractor, LlmError};
use report::{
    STATUS_CONNECT_FAILED, STATUS_FAILED, STATUS_NO_UNSEEN, STATUS_NOT_FOUND, status_sent,
};

/// A per-message failure, tagged with the step that produced it.
#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    #[error("fetch: {0}")]
    #[diagnostic(code(mailroute::pipeline::fetch))]
    Fetch(#[source] EmailError),

    #[error("parse: {0}")]
    #[diagnostic(code(mailroute::pipeline::parse))]
    Parse(#[source] EmailError),

    #[error("extract: {0}")]
    #[diagnostic(code(mailroute::pipeline::extract))]
    Extract(#[source] ExtractError),

    #[error("classify: {0}")]
    #[diagnostic(code(mailroute::pipeline::classify))]
    Classify(#[source] LlmError),

    #[error("compose: {0}")]
    #[diagnostic(code(mailroute::pipeline::compose))]
    Compose(#[source] EmailError),

    #[error("send: {0}")]
    #[diagnostic(code(mailroute::pipeline::send))]
    Send(#[source] EmailError),

    #[error("mark-seen: {0}")]
    #[diagnostic(code(mailroute::pipeline::mark_seen))]
    MarkSeen(#[source] EmailError),
}

/// Sequences the collaborators over one mailbox session.
pub struct PipelineOrchestrator<'a> {
    mailbox: &'a mut dyn MailboxClient,
    content: &'a ContentExtractor,
    classifier: &'a dyn InformationExtractor,
    sender: &'a dyn MailSender,
    composer: ForwardingComposer,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(
        mailbox: &'a mut dyn MailboxClient,
        content: &'a ContentExtractor,
        classifier: &'a dyn InformationExtractor,
        sender: &'a dyn MailSender,
        composer: ForwardingComposer,
    ) -> Self {
        Self {
            mailbox,
            content,
            classifier,
            sender,
            composer,
        }
    }

    /// Run one batch. Always returns a report.
    ///
    /// The session is closed exactly once if `connect` succeeded and never
    /// touched again if it failed.
    pub fn run(&mut self) -> BatchReport {
        tracing::info!("connecting to mailbox");
        if let Err(e) = self.mailbox.connect() {
            tracing::error!("mailbox connection failed: {e}");
            return BatchReport::terminal(STATUS_CONNECT_FAILED, Some(e.to_string()));
        }

        let report = self.process_unseen();
        self.mailbox.close();

        tracing::info!(
            processed = report.processed_count,
            sent = report.sent_count,
            "batch complete"
        );
        report
    }

    fn process_unseen(&mut self) -> BatchReport {
        let ids = match self.mailbox.search_unseen() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("unseen search failed: {e}");
                return BatchReport::terminal(STATUS_CONNECT_FAILED, Some(e.to_string()));
            }
        };
        if ids.is_empty() {
            tracing::info!("no unseen emails");
            return BatchReport::terminal(STATUS_NO_UNSEEN, None);
        }

        tracing::info!(count = ids.len(), "found unseen emails");
        let mut results = Vec::with_capacity(ids.len());
        for id in &ids {
            results.push(self.process_one(id));
        }
        BatchReport::from_results(results)
    }

    /// Process one identifier, containing every failure including panics.
    fn process_one(&mut self, id: &str) -> ProcessingResult {
        let mut result = ProcessingResult::terminal(STATUS_FAILED, None);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.forward(id, &mut result)));
        match outcome {
            Ok(Ok(status)) => result.status = status,
            Ok(Err(e)) => {
                tracing::error!(id, "failed to process email: {e}");
                result.status = STATUS_FAILED.to_string();
                result.details = Some(e.to_string());
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(id, "unexpected failure while processing email: {reason}");
                result.status = STATUS_FAILED.to_string();
                result.details = Some(format!("unexpected failure: {reason}"));
            }
        }
        result
    }

    /// The happy path for one message. Sender and subject are recorded
    /// into `result` as soon as the message is parsed.
    fn forward(&mut self, id: &str, result: &mut ProcessingResult) -> Result<String, StepError> {
        tracing::info!(id, "processing email");
        let raw = self.mailbox.fetch(id).map_err(StepError::Fetch)?;

        let parsed = self.content.parse(&raw.data).map_err(StepError::Parse)?;
        result.source_from = Some(parsed.sender.clone());
        result.source_subject = Some(parsed.subject.clone());
        tracing::info!(id, from = %parsed.sender, subject = %parsed.subject, "parsed email");

        let content = self.content.extract(&parsed).map_err(StepError::Extract)?;
        tracing::debug!(id, chars = content.text.len(), "assembled content");

        let extraction = self
            .classifier
            .classify(&content.text)
            .map_err(StepError::Classify)?;

        if !self.composer.decide(&extraction) {
            tracing::warn!(id, "recipient email not found, skipping");
            return Ok(STATUS_NOT_FOUND.to_string());
        }

        let outgoing = self
            .composer
            .compose(&parsed, &extraction)
            .map_err(StepError::Compose)?;
        self.sender.send(&outgoing).map_err(StepError::Send)?;
        self.mailbox.mark_seen(id).map_err(StepError::MarkSeen)?;

        tracing::info!(id, to = %outgoing.to, "email forwarded and marked seen");
        Ok(status_sent(&outgoing.to))
    }
}

impl std::fmt::Debug for PipelineOrchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("mailbox_state", &self.mailbox.state())
            .field("composer", &self.composer)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one batch against the live services described by `config`.
pub fn run_batch(config: &PipelineConfig) -> BatchReport {
    let mut mailbox = ImapMailbox::new(config.mailbox.clone());
    let content = ContentExtractor::new(Box::new(TesseractOcr::new(config.ocr.clone())));
    let classifier = GroqExtractor::new(config.inference.clone());
    let sender = SmtpSender::new(config.smtp.clone());
    let composer = ForwardingComposer::new(config.smtp.sender_email.clone());

    PipelineOrchestrator::new(&mut mailbox, &content, &classifier, &sender, composer).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{MockMailbox, MockSender};
    use crate::extract::{ExtractResult, OcrEngine};
    use crate::llm::{ExtractionResult, LlmResult, MockExtractor, NOT_FOUND};

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn recognize(&self, _image: &[u8]) -> ExtractResult<String> {
            Ok(String::new())
        }
    }

    struct PanickingExtractor;

    impl InformationExtractor for PanickingExtractor {
        fn classify(&self, _text: &str) -> LlmResult<ExtractionResult> {
            panic!("model client blew up");
        }
    }

    fn email(subject: &str, body: &str) -> String {
        format!(
            "From: Alice <alice@example.com>\r\n\
             To: inbox@example.com\r\n\
             Subject: {subject}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             {body}\r\n"
        )
    }

    #[test]
    fn step_error_names_the_step() {
        let err = StepError::Send(EmailError::Delivery {
            message: "timeout".into(),
        });
        assert_eq!(err.to_string(), "send: email delivery failed: timeout");
        let err = StepError::Classify(LlmError::ParseError {
            message: "missing field".into(),
        });
        assert!(err.to_string().starts_with("classify: "));
    }

    #[test]
    fn panic_is_contained_per_message() {
        let mut mailbox = MockMailbox::new();
        mailbox.push("1", email("First", "body one"));
        mailbox.push("2", email("Second", "body two"));
        let content = ContentExtractor::new(Box::new(NoOcr));
        let sender = MockSender::new();

        let report = PipelineOrchestrator::new(
            &mut mailbox,
            &content,
            &PanickingExtractor,
            &sender,
            ForwardingComposer::new("bot@example.com"),
        )
        .run();

        assert_eq!(report.processed_count, 2);
        for result in &report.results {
            assert_eq!(result.status, STATUS_FAILED);
            assert!(result.details.as_deref().unwrap().contains("model client blew up"));
        }
        assert_eq!(report.results[0].source_subject.as_deref(), Some("First"));
        assert_eq!(mailbox.close_count(), 1);
    }

    #[test]
    fn mark_seen_only_after_send() {
        let mut mailbox = MockMailbox::new().peek();
        mailbox.push("7", email("Forward me", "to jane"));
        mailbox.push("8", email("Nobody", "no recipient here"));
        let content = ContentExtractor::new(Box::new(NoOcr));
        let classifier = MockExtractor::new(&MockExtractor::reply(NOT_FOUND, NOT_FOUND))
            .on("to jane", &MockExtractor::reply("jane@example.com", NOT_FOUND));
        let sender = MockSender::new();

        let report = PipelineOrchestrator::new(
            &mut mailbox,
            &content,
            &classifier,
            &sender,
            ForwardingComposer::new("bot@example.com"),
        )
        .run();

        assert_eq!(report.sent_count, 1);
        assert_eq!(
            report.results[0].status,
            "Email sent successfully to jane@example.com."
        );
        assert_eq!(report.results[1].status, STATUS_NOT_FOUND);
        assert_eq!(mailbox.marked_seen(), ["7".to_string()]);
        assert!(!mailbox.is_seen("8"));
    }
}
