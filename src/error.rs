//! Top-level error type.
//!
//! Each subsystem defines its own miette diagnostic enum; `MailrouteError`
//! wraps them transparently so codes and help text reach the CLI intact.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::email::EmailError;
use crate::extract::ExtractError;
use crate::llm::LlmError;

#[derive(Debug, Error, Diagnostic)]
pub enum MailrouteError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),
}

pub type MailrouteResult<T> = std::result::Result<T, MailrouteError>;
