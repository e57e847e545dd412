//! External tool discovery.

/// Error message when pdftoppm is not found.
pub const PDFTOPPM_NOT_FOUND: &str = "pdftoppm not found (install poppler-utils)";

/// Error message when tesseract is not found.
pub const TESSERACT_NOT_FOUND: &str = "tesseract not found (install tesseract-ocr)";

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Install hint for a missing tool, or `None` if it is available.
pub fn tool_hint(name: &str) -> Option<String> {
    if check_binary(name) {
        return None;
    }
    Some(match name {
        "pdftoppm" => "pdftoppm not installed. Install with: apt install poppler-utils".to_string(),
        "tesseract" => "Tesseract not installed. Install with: apt install tesseract-ocr".to_string(),
        other => format!("{} not found in PATH", other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary() {
        assert!(!check_binary("definitely-not-a-real-binary-rollcall"));
        assert!(tool_hint("definitely-not-a-real-binary-rollcall")
            .unwrap()
            .contains("not found"));
    }
}
