//! Text recognizers.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

use super::tools::{check_binary, TESSERACT_NOT_FOUND};

/// Errors from local text recognition.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads text from a page image. Implementations block; call them from
/// `spawn_blocking`.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn recognize(&self, image_path: &Path) -> Result<String, OcrError>;
}

/// Tesseract via its command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn recognize(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr.trim())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(TESSERACT_NOT_FOUND.to_string()))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}
