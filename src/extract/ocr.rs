//! Optical character recognition for images embedded in PDFs.
//!
//! `TesseractOcr` pipes the image into the `tesseract` CLI
//! (`tesseract stdin stdout -l <lang>`) and reads the recognized text back.

use std::io::Write;
use std::process::{Child, Command, Stdio};

use crate::config::OcrConfig;

use super::error::{ExtractError, ExtractResult};

/// Something that can turn image bytes into text.
pub trait OcrEngine {
    fn recognize(&self, image: &[u8]) -> ExtractResult<String>;
}

/// Tesseract via its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(OcrConfig::default())
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8]) -> ExtractResult<String> {
        let mut child = Command::new(&self.config.tesseract_bin)
            .args(["stdin", "stdout", "-l", self.config.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractError::Ocr {
                message: format!("failed to start {}: {e}", self.config.tesseract_bin),
            })?;

        feed_image(&mut child, image)?;

        let output = child.wait_with_output().map_err(|e| ExtractError::Ocr {
            message: format!("tesseract did not finish: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Ocr {
                message: format!("tesseract exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Write the image to the child's stdin and close it. On failure the child
/// is killed and reaped before the error is returned.
fn feed_image(child: &mut Child, image: &[u8]) -> ExtractResult<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(image) {
        drop(stdin);
        child.kill().ok();
        child.wait().ok();
        return Err(ExtractError::Ocr {
            message: format!("failed to write image to tesseract: {e}"),
        });
    }
    Ok(())
}
