// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # mailroute
//!
//! Batch email extraction and forwarding. Each unseen message in an IMAP
//! inbox is parsed, its text gathered from the body, an attached PDF and
//! OCR of the PDF's images, and handed to an LLM that extracts a recipient
//! address and a physical address. Messages with a recipient are forwarded
//! over SMTP with the PDF re-attached, then marked seen.
//!
//! ## Architecture
//!
//! - **Mailbox** (`email::mailbox`): IMAP session trait with IMAPS and mock implementations
//! - **Extraction** (`extract`): MIME body selection, HTML stripping, PDF text, Tesseract OCR
//! - **Inference** (`llm`): strict two-field JSON extraction over a chat-completions API
//! - **Delivery** (`email::compose`, `email::sender`): forward composition and STARTTLS SMTP
//! - **Pipeline** (`pipeline`): per-message orchestration and the batch report
//!
//! ## Library usage
//!
//! ```no_run
//! use mailroute::config::PipelineConfig;
//! use mailroute::pipeline::run_batch;
//!
//! let config = PipelineConfig::from_env().unwrap();
//! let report = run_batch(&config);
//! println!("{report}");
//! ```

pub mod config;
pub mod email;
pub mod error;
pub mod extract;
pub mod llm;
pub mod pipeline;
