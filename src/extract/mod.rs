//! Multi-format content extraction.
//!
//! `ContentExtractor` turns a raw message into the single text blob sent to
//! the inference service: subject, selected body, PDF text, and OCR text
//! from images embedded in the PDF, each behind a literal section marker.
//!
//! OCR runs in degraded mode: an engine failure becomes an inline
//! `[OCR error: ...]` marker and extraction carries on.

pub mod error;
pub mod html;
pub mod ocr;
pub mod pdf;

pub use error::{ExtractError, ExtractResult};
pub use ocr::{OcrEngine, TesseractOcr};
pub use pdf::PageImage;

use crate::email::error::EmailResult;
use crate::email::parser::{ParsedMessage, parse_message};

/// Recognized text for one embedded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrText {
    /// 1-based page number the image came from.
    pub page: u32,
    /// Recognized text, or an error marker.
    pub text: String,
}

/// The assembled text handed to the inference service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub text: String,
}

impl std::fmt::Display for ExtractedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parses messages and gathers their text from every supported source.
pub struct ContentExtractor {
    ocr: Box<dyn OcrEngine>,
}

impl ContentExtractor {
    pub fn new(ocr: Box<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    /// Parse raw message bytes.
    pub fn parse(&self, raw: &[u8]) -> EmailResult<ParsedMessage> {
        parse_message(raw)
    }

    pub fn extract_pdf_text(&self, data: &[u8]) -> ExtractResult<String> {
        pdf::extract_text(data)
    }

    pub fn extract_pdf_images(&self, data: &[u8]) -> ExtractResult<Vec<PageImage>> {
        pdf::extract_images(data)
    }

    /// Recognize text in one image. Never fails: engine errors come back
    /// as an `[OCR error: ...]` marker.
    pub fn ocr(&self, image: &[u8]) -> String {
        match self.ocr.recognize(image) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("OCR failed: {e}");
                ocr_error_marker(&e)
            }
        }
    }

    /// Gather all text for a parsed message.
    ///
    /// Fails only if the PDF attachment's text cannot be read. If its
    /// images cannot be enumerated, the OCR sections are omitted.
    pub fn extract(&self, parsed: &ParsedMessage) -> ExtractResult<ExtractedContent> {
        let Some(pdf) = &parsed.pdf_attachment else {
            return Ok(assemble(parsed, None, &[]));
        };

        let pdf_text = self.extract_pdf_text(&pdf.data)?;

        tracing::info!("searching for images within PDF for OCR");
        let images = self.extract_pdf_images(&pdf.data).unwrap_or_else(|e| {
            tracing::warn!(filename = %pdf.filename, "skipping OCR: {e}");
            Vec::new()
        });

        let ocr_results: Vec<OcrText> = images
            .iter()
            .map(|image| OcrText {
                page: image.page,
                text: self.ocr(&image.data),
            })
            .collect();

        Ok(assemble(parsed, Some(&pdf_text), &ocr_results))
    }
}

impl std::fmt::Debug for ContentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentExtractor").finish_non_exhaustive()
    }
}

/// Inline marker recorded in place of text for an image OCR could not read.
pub fn ocr_error_marker(error: &ExtractError) -> String {
    let reason = match error {
        ExtractError::Ocr { message } | ExtractError::Pdf { message } => message,
    };
    format!("[OCR error: {reason}]")
}

/// Concatenate the sections in fixed order.
///
/// `pdf_text` is `Some` only when the message carried a PDF; OCR results
/// whose text is blank are dropped.
pub fn assemble(
    parsed: &ParsedMessage,
    pdf_text: Option<&str>,
    ocr_results: &[OcrText],
) -> ExtractedContent {
    let mut text = format!("Email Subject: {}\n\n", parsed.subject);
    text.push_str(&format!("Email Body:\n{}\n\n", parsed.selected_body()));

    if let Some(pdf_text) = pdf_text {
        let filename = parsed
            .pdf_attachment
            .as_ref()
            .map(|p| p.filename.as_str())
            .unwrap_or("attachment.pdf");
        text.push_str(&format!("--- Text from PDF '{filename}' ---\n{pdf_text}\n"));

        for ocr in ocr_results.iter().filter(|o| !o.text.trim().is_empty()) {
            tracing::info!(page = ocr.page, "found text in image via OCR");
            text.push_str(&format!(
                "\n--- OCR Text from Image on Page {} ---\n{}\n",
                ocr.page, ocr.text
            ));
        }
    }

    ExtractedContent { text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::parser::PdfAttachment;
    use crate::extract::pdf::tests::{TestImage, build_pdf};
    use std::sync::Mutex;

    /// Returns scripted results in call order.
    struct ScriptedOcr {
        results: Mutex<Vec<ExtractResult<String>>>,
    }

    impl ScriptedOcr {
        fn new(mut results: Vec<ExtractResult<String>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
            }
        }
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize(&self, _image: &[u8]) -> ExtractResult<String> {
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn message_with_pdf(pdf: Vec<u8>) -> ParsedMessage {
        ParsedMessage {
            sender: "a@example.com".into(),
            subject: "Scan".into(),
            body_plain: Some("See scan.".into()),
            pdf_attachment: Some(PdfAttachment {
                filename: "scan.pdf".into(),
                data: pdf,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn assemble_without_pdf() {
        let parsed = ParsedMessage {
            subject: "Hi".into(),
            body_html_text: Some("Hello\nWorld".into()),
            ..Default::default()
        };
        let content = assemble(&parsed, None, &[]);
        assert_eq!(
            content.text,
            "Email Subject: Hi\n\nEmail Body:\nHello\nWorld\n\n"
        );
    }

    #[test]
    fn assemble_with_pdf_and_ocr() {
        let parsed = message_with_pdf(Vec::new());
        let ocr = vec![
            OcrText {
                page: 1,
                text: "Ship to 1 Main St".into(),
            },
            OcrText {
                page: 2,
                text: "   \n".into(),
            },
        ];
        let content = assemble(&parsed, Some("page text"), &ocr);
        assert!(content.text.starts_with("Email Subject: Scan\n\nEmail Body:\nSee scan.\n\n"));
        assert!(content.text.contains("--- Text from PDF 'scan.pdf' ---\npage text\n"));
        assert!(content
            .text
            .contains("\n--- OCR Text from Image on Page 1 ---\nShip to 1 Main St\n"));
        assert!(!content.text.contains("Page 2"));
    }

    #[test]
    fn ocr_failure_becomes_marker() {
        let extractor = ContentExtractor::new(Box::new(ScriptedOcr::new(vec![Err(
            ExtractError::Ocr {
                message: "engine crashed".into(),
            },
        )])));
        assert_eq!(extractor.ocr(b"img"), "[OCR error: engine crashed]");
    }

    #[test]
    fn extract_without_pdf_skips_ocr() {
        let extractor = ContentExtractor::new(Box::new(ScriptedOcr::new(vec![Err(
            ExtractError::Ocr {
                message: "should not run".into(),
            },
        )])));
        let parsed = ParsedMessage {
            subject: "Plain".into(),
            body_plain: Some("Body".into()),
            ..Default::default()
        };
        let content = extractor.extract(&parsed).unwrap();
        assert!(!content.text.contains("OCR"));
        assert!(!content.text.contains("Text from PDF"));
    }

    #[test]
    fn one_failed_image_does_not_abort_extraction() {
        let pdf = build_pdf(&[
            ("Invoice for Jane", vec![TestImage::jpeg(b"img-1")]),
            ("Second page", vec![TestImage::jpeg(b"img-2")]),
        ]);
        let extractor = ContentExtractor::new(Box::new(ScriptedOcr::new(vec![
            Err(ExtractError::Ocr {
                message: "bad image".into(),
            }),
            Ok("jane@example.com".into()),
        ])));

        let content = extractor.extract(&message_with_pdf(pdf)).unwrap();
        assert!(content.text.contains("Invoice for Jane"));
        assert!(content.text.contains("Second page"));
        assert!(content
            .text
            .contains("--- OCR Text from Image on Page 1 ---\n[OCR error: bad image]"));
        assert!(content
            .text
            .contains("--- OCR Text from Image on Page 2 ---\njane@example.com"));
    }

    #[test]
    fn unreadable_pdf_is_error() {
        let extractor = ContentExtractor::new(Box::new(ScriptedOcr::new(Vec::new())));
        let parsed = message_with_pdf(b"garbage".to_vec());
        assert!(matches!(
            extractor.extract(&parsed),
            Err(ExtractError::Pdf { .. })
        ));
    }
}
