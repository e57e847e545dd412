//! Local text recognition used by the heuristic page classifier.

mod recognizer;
mod tools;

pub use recognizer::{OcrError, TesseractRecognizer, TextRecognizer};
pub use tools::{check_binary, tool_hint, PDFTOPPM_NOT_FOUND, TESSERACT_NOT_FOUND};
