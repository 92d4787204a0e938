//! Pipeline configuration: mailbox, SMTP, inference endpoint and OCR settings.
//!
//! Loaded from a TOML file (`PipelineConfig::load`) or from the process
//! environment (`PipelineConfig::from_env`). Secrets are redacted from the
//! `Debug` output so a config can be logged safely.

use std::path::Path;
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(mailroute::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(mailroute::config::parse),
        help("Check the TOML syntax. Required tables: [mailbox], [smtp], [inference].")
    )]
    Parse { path: String, message: String },

    #[error("missing environment variable {name}")]
    #[diagnostic(
        code(mailroute::config::missing),
        help(
            "Set {name} in the environment, or pass --config with a TOML file instead."
        )
    )]
    Missing { name: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(mailroute::config::invalid))]
    Invalid { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ── Sections ────────────────────────────────────────────────────────────

/// IMAP mailbox settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Mailbox to SELECT.
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Fetch with `BODY.PEEK[]` instead of `RFC822`.
    ///
    /// `RFC822` implicitly sets `\Seen` on most servers, so every fetched
    /// message is consumed by the run. With `peek` enabled only a
    /// successful forward marks a message as seen.
    #[serde(default)]
    pub peek: bool,
}

/// Outbound SMTP settings. The session is always upgraded with STARTTLS.
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub sender_email: String,
    pub sender_password: String,
}

/// Chat-completions endpoint used for recipient/address extraction.
#[derive(Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// OCR engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Path or name of the `tesseract` executable.
    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: String,
    /// Tesseract language pack(s), e.g. `eng` or `eng+deu`.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_bin: default_tesseract_bin(),
            language: default_language(),
        }
    }
}

fn default_imap_port() -> u16 {
    993
}
fn default_mailbox() -> String {
    "INBOX".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_model() -> String {
    "llama3-8b-8192".into()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_tesseract_bin() -> String {
    "tesseract".into()
}
fn default_language() -> String {
    "eng".into()
}

// ── PipelineConfig ──────────────────────────────────────────────────────

/// Everything one batch run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mailbox: MailboxConfig,
    pub smtp: SmtpConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

impl PipelineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "(inline)".into(),
            message: e.to_string(),
        })
    }

    /// Build from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name).ok_or_else(|| ConfigError::Missing {
                name: name.to_string(),
            })
        };
        let parse_port = |name: &str, raw: String| {
            raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                message: format!("{name}=\"{raw}\" is not a port number: {e}"),
            })
        };

        let imap_port = match lookup("IMAP_PORT") {
            Some(raw) => parse_port("IMAP_PORT", raw)?,
            None => default_imap_port(),
        };
        let smtp_port = parse_port("SMTP_PORT", require("SMTP_PORT")?)?;

        Ok(Self {
            mailbox: MailboxConfig {
                host: require("IMAP_SERVER")?,
                port: imap_port,
                user: require("IMAP_USER")?,
                password: require("IMAP_PASSWORD")?,
                mailbox: lookup("IMAP_MAILBOX").unwrap_or_else(default_mailbox),
                peek: lookup("IMAP_PEEK")
                    .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
            smtp: SmtpConfig {
                host: require("SMTP_SERVER")?,
                port: smtp_port,
                sender_email: require("SENDER_EMAIL")?,
                sender_password: require("SENDER_PASSWORD")?,
            },
            inference: InferenceConfig {
                api_key: require("GROQ_API_KEY")?,
                model: lookup("GROQ_MODEL").unwrap_or_else(default_model),
                base_url: lookup("GROQ_BASE_URL").unwrap_or_else(default_base_url),
                timeout_secs: default_timeout_secs(),
            },
            ocr: OcrConfig {
                tesseract_bin: lookup("TESSERACT_BIN").unwrap_or_else(default_tesseract_bin),
                language: lookup("TESSERACT_LANG").unwrap_or_else(default_language),
            },
        })
    }

    /// Validate this configuration, returning an error if invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };
        if self.mailbox.host.trim().is_empty() {
            return invalid("mailbox.host must not be empty");
        }
        if self.mailbox.user.trim().is_empty() {
            return invalid("mailbox.user must not be empty");
        }
        if self.mailbox.port == 0 {
            return invalid("mailbox.port must be non-zero");
        }
        if self.smtp.host.trim().is_empty() {
            return invalid("smtp.host must not be empty");
        }
        if self.smtp.port == 0 {
            return invalid("smtp.port must be non-zero");
        }
        if !self.smtp.sender_email.contains('@') {
            return invalid("smtp.sender_email must be an email address");
        }
        if self.inference.api_key.trim().is_empty() {
            return invalid("inference.api_key must not be empty");
        }
        if self.inference.timeout_secs == 0 {
            return invalid("inference.timeout_secs must be non-zero");
        }
        Ok(())
    }
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .field("peek", &self.peek)
            .finish()
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("sender_email", &self.sender_email)
            .field("sender_password", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
