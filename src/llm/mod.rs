//! Recipient/address extraction over an OpenAI-compatible chat endpoint.
//!
//! One deterministic completion per message: a single user-role prompt,
//! temperature 0, and `response_format = json_object`. The reply must be a
//! JSON object with string fields `recipient_email` and `physical_address`;
//! anything else is an `LlmError::ParseError`.

use std::sync::Mutex;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::config::InferenceConfig;

/// Sentinel the model uses for a value it could not find.
pub const NOT_FOUND: &str = "Not Found";

/// Errors from the inference subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("inference request failed: {message}")]
    #[diagnostic(
        code(mailroute::llm::request_failed),
        help("Check the API key, base URL and model name in the [inference] config.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse extraction result: {message}")]
    #[diagnostic(
        code(mailroute::llm::parse_error),
        help(
            "The model must return a JSON object with string fields \
             \"recipient_email\" and \"physical_address\"."
        )
    )]
    ParseError { message: String },
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

// ── ExtractionResult ────────────────────────────────────────────────────

/// Normalized extraction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Trimmed and lower-cased.
    pub recipient_email: String,
    /// Trimmed, case preserved.
    pub physical_address: String,
}

impl ExtractionResult {
    /// The recipient, unless empty or the sentinel.
    pub fn recipient(&self) -> Option<&str> {
        present(&self.recipient_email)
    }

    /// The physical address, unless empty or the sentinel.
    pub fn address(&self) -> Option<&str> {
        present(&self.physical_address)
    }
}

fn present(value: &str) -> Option<&str> {
    if value.is_empty() || value.eq_ignore_ascii_case(NOT_FOUND) {
        None
    } else {
        Some(value)
    }
}

/// The model's reply, exactly as required.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    recipient_email: String,
    physical_address: String,
}

/// Parse and normalize the model's JSON reply.
pub fn parse_extraction(content: &str) -> LlmResult<ExtractionResult> {
    let raw: RawExtraction =
        serde_json::from_str(content.trim()).map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;
    Ok(ExtractionResult {
        recipient_email: raw.recipient_email.trim().to_lowercase(),
        physical_address: raw.physical_address.trim().to_string(),
    })
}

/// The instruction prompt wrapped around the assembled content.
pub fn build_prompt(content: &str) -> String {
    format!(
        "You are an expert information extraction system. From the text below, which \
         includes content from an email body, PDF text, and OCR from images inside the PDF, \
         extract the recipient's email address and their full physical mailing address.\n\
         Return a single, valid JSON object with two keys: \"recipient_email\" and \
         \"physical_address\".\n\
         If a value is not found, use the string \"{NOT_FOUND}\".\n\
         \n\
         Here is the content:\n\
         ---\n\
         {content}\n\
         ---\n\
         \n\
         JSON Response:\n"
    )
}

// ── InformationExtractor ────────────────────────────────────────────────

/// Extracts a recipient and physical address from free text.
pub trait InformationExtractor {
    fn classify(&self, text: &str) -> LlmResult<ExtractionResult>;
}

/// Client for a Groq (OpenAI-compatible) chat-completions API.
pub struct GroqExtractor {
    config: InferenceConfig,
    agent: ureq::Agent,
}

impl GroqExtractor {
    pub fn new(config: InferenceConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Self { config, agent }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0,
            "response_format": { "type": "json_object" },
        })
    }

    /// Pull `choices[0].message.content` out of a completion response.
    fn completion_content(body: &str) -> LlmResult<String> {
        let json: serde_json::Value =
            serde_json::from_str(body).map_err(|e| LlmError::ParseError {
                message: format!("completion response is not JSON: {e}"),
            })?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'choices[0].message.content' field".into(),
            })
    }
}

impl InformationExtractor for GroqExtractor {
    fn classify(&self, text: &str) -> LlmResult<ExtractionResult> {
        let body = self.request_body(&build_prompt(text));
        let body_str = serde_json::to_string(&body).map_err(|e| LlmError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = self
            .agent
            .post(&self.endpoint())
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => LlmError::RequestFailed {
                    message: format!(
                        "server returned status {code}: {}",
                        resp.into_string().unwrap_or_default()
                    ),
                },
                other => LlmError::RequestFailed {
                    message: other.to_string(),
                },
            })?;

        let resp_str = resp.into_string().map_err(|e| LlmError::RequestFailed {
            message: format!("failed to read response body: {e}"),
        })?;

        let content = Self::completion_content(&resp_str)?;
        let result = parse_extraction(&content)?;
        tracing::info!(
            recipient_email = %result.recipient_email,
            physical_address = %result.physical_address,
            "inference result"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for GroqExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqExtractor")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

// ── MockExtractor ───────────────────────────────────────────────────────

/// Scripted extractor for tests.
///
/// Replies with the first rule whose needle occurs in the input text, or
/// the default reply. Replies are raw model output and go through
/// `parse_extraction`, so malformed JSON can be simulated too.
#[derive(Debug)]
pub struct MockExtractor {
    default_reply: String,
    rules: Vec<(String, String)>,
    inputs: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub fn new(default_reply: &str) -> Self {
        Self {
            default_reply: default_reply.to_string(),
            rules: Vec::new(),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `raw` when the input contains `needle`.
    pub fn on(mut self, needle: &str, raw: &str) -> Self {
        self.rules.push((needle.to_string(), raw.to_string()));
        self
    }

    /// Build a well-formed reply.
    pub fn reply(recipient_email: &str, physical_address: &str) -> String {
        serde_json::json!({
            "recipient_email": recipient_email,
            "physical_address": physical_address,
        })
        .to_string()
    }

    /// Every text passed to `classify`, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

impl InformationExtractor for MockExtractor {
    fn classify(&self, text: &str) -> LlmResult<ExtractionResult> {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(text.to_string());
        }
        let raw = self
            .rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, raw)| raw.as_str())
            .unwrap_or(&self.default_reply);
        parse_extraction(raw)
    }
}
