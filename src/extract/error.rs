//! Content-extraction error types.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from PDF, HTML and OCR extraction.
///
/// `Ocr` never leaves `ContentExtractor`: a failed recognition is rendered
/// as an inline marker in the assembled text instead.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("PDF extraction failed: {message}")]
    #[diagnostic(
        code(mailroute::extract::pdf),
        help("The attachment may be encrypted, truncated, or not actually a PDF.")
    )]
    Pdf { message: String },

    #[error("OCR failed: {message}")]
    #[diagnostic(
        code(mailroute::extract::ocr),
        help(
            "Check that tesseract is installed and on PATH (or set ocr.tesseract_bin), \
             and that the configured language pack is installed."
        )
    )]
    Ocr { message: String },
}

pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
