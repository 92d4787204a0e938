//! Per-message results and the batch report returned to callers.

use serde::Serialize;

pub const STATUS_CONNECT_FAILED: &str = "Failed to connect to IMAP server.";
pub const STATUS_NO_UNSEEN: &str = "No unseen emails found.";
pub const STATUS_NOT_FOUND: &str = "Recipient email not found by AI. No action taken.";
pub const STATUS_FAILED: &str = "Failed to process email.";
pub const REPORT_MESSAGE: &str = "Processing complete.";

/// Status for a successful forward.
pub fn status_sent(recipient: &str) -> String {
    format!("Email sent successfully to {recipient}.")
}

/// Outcome for one mailbox identifier (or one terminal condition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_subject: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ProcessingResult {
    /// A result not tied to any particular message.
    pub fn terminal(status: &str, details: Option<String>) -> Self {
        Self {
            source_from: None,
            source_subject: None,
            status: status.to_string(),
            details,
        }
    }

    /// Whether the status denotes a successful delivery.
    pub fn is_sent(&self) -> bool {
        self.status.contains("successfully")
    }
}

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub message: String,
    pub processed_count: usize,
    pub sent_count: usize,
    pub results: Vec<ProcessingResult>,
}

impl BatchReport {
    /// Build a report whose counts are derived from `results`.
    pub fn from_results(results: Vec<ProcessingResult>) -> Self {
        Self {
            message: REPORT_MESSAGE.to_string(),
            processed_count: results.len(),
            sent_count: results.iter().filter(|r| r.is_sent()).count(),
            results,
        }
    }

    /// Single-entry report for a terminal condition.
    pub fn terminal(status: &str, details: Option<String>) -> Self {
        Self::from_results(vec![ProcessingResult::terminal(status, details)])
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} processed: {}, sent: {}",
            self.message, self.processed_count, self.sent_count
        )?;
        for result in &self.results {
            write!(f, "  - {}", result.status)?;
            if let Some(subject) = &result.source_subject {
                write!(f, " [{subject}]")?;
            }
            if let Some(details) = &result.details {
                write!(f, " ({details})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: &str) -> ProcessingResult {
        ProcessingResult::terminal(status, None)
    }

    #[test]
    fn counts_follow_results() {
        let report = BatchReport::from_results(vec![
            result(&status_sent("a@b.com")),
            result(STATUS_NOT_FOUND),
            result(STATUS_FAILED),
            result(&status_sent("c@d.com")),
        ]);
        assert_eq!(report.message, "Processing complete.");
        assert_eq!(report.processed_count, 4);
        assert_eq!(report.sent_count, 2);
    }

    #[test]
    fn terminal_report_has_one_result() {
        let report = BatchReport::terminal(STATUS_NO_UNSEEN, None);
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.sent_count, 0);
        assert_eq!(report.results[0].status, "No unseen emails found.");
    }

    #[test]
    fn serializes_snake_case_and_skips_empty() {
        let report = BatchReport::terminal(STATUS_CONNECT_FAILED, Some("refused".into()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["processed_count"], 1);
        assert_eq!(json["sent_count"], 0);
        assert_eq!(json["results"][0]["details"], "refused");
        assert!(json["results"][0].get("source_from").is_none());
    }

    #[test]
    fn display_lists_statuses() {
        let report = BatchReport::from_results(vec![ProcessingResult {
            source_from: Some("a@example.com".into()),
            source_subject: Some("Invoice".into()),
            status: status_sent("x@y.com"),
            details: None,
        }]);
        let text = report.to_string();
        assert!(text.contains("processed: 1, sent: 1"));
        assert!(text.contains("Email sent successfully to x@y.com. [Invoice]"));
    }
}
