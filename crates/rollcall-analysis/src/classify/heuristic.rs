//! Keyword-based page classification over locally recognized text.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use rollcall::config::ClassificationSettings;
use rollcall::credentials::similarity::ratio;
use rollcall::models::PageLabel;

use crate::ocr::TextRecognizer;

/// Tokens shorter than this are ignored.
const MIN_TOKEN_LEN: usize = 3;

/// How strongly a page matches one keyword set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeywordScore {
    /// Keywords with at least one token at or above the threshold.
    pub hits: usize,
    /// Best similarity among the hits, 0-100.
    pub best: f64,
}

impl KeywordScore {
    fn compare(&self, other: &Self) -> Ordering {
        self.hits
            .cmp(&other.hits)
            .then(self.best.partial_cmp(&other.best).unwrap_or(Ordering::Equal))
    }
}

/// Labels a page from its text alone. Holds no mutable state, so one
/// instance can serve every worker.
pub struct HeuristicPageClassifier {
    recognizer: Arc<dyn TextRecognizer>,
    threshold: f64,
    signin_keywords: Vec<String>,
    dinein_keywords: Vec<String>,
}

impl HeuristicPageClassifier {
    pub fn new(settings: &ClassificationSettings, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let lower = |words: &[String]| words.iter().map(|w| w.to_lowercase()).collect();
        Self {
            recognizer,
            threshold: settings.heuristic_threshold as f64,
            signin_keywords: lower(&settings.signin_keywords),
            dinein_keywords: lower(&settings.dinein_keywords),
        }
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Recognize a page raster and label it. Blocks on the recognizer.
    pub fn classify(&self, raster: &Path) -> PageLabel {
        match self.recognizer.recognize(raster) {
            Ok(text) => self.classify_text(&text),
            Err(e) => {
                tracing::warn!(
                    page = %raster.display(),
                    recognizer = self.recognizer.name(),
                    "Text recognition failed, page left unknown: {}",
                    e
                );
                PageLabel::Unknown
            }
        }
    }

    /// Label already recognized text.
    pub fn classify_text(&self, text: &str) -> PageLabel {
        let tokens = tokenize(text);
        let signin = self.score(&tokens, &self.signin_keywords);
        let dinein = self.score(&tokens, &self.dinein_keywords);
        tracing::trace!(?signin, ?dinein, "Keyword scores");

        if signin.hits == 0 && dinein.hits == 0 {
            return PageLabel::Unknown;
        }
        match signin.compare(&dinein) {
            Ordering::Less => PageLabel::Dinein,
            Ordering::Greater | Ordering::Equal => PageLabel::Signin,
        }
    }

    fn score(&self, tokens: &[String], keywords: &[String]) -> KeywordScore {
        let mut score = KeywordScore::default();
        for keyword in keywords {
            let best = tokens
                .iter()
                .map(|token| ratio(token, keyword))
                .fold(0.0_f64, f64::max);
            if best >= self.threshold {
                score.hits += 1;
                score.best = score.best.max(best);
            }
        }
        score
    }
}

/// Lowercase alphanumeric runs of at least three characters.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrError;

    struct FixedText(Result<&'static str, ()>);

    impl TextRecognizer for FixedText {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn recognize(&self, _image_path: &Path) -> Result<String, OcrError> {
            self.0
                .map(str::to_string)
                .map_err(|_| OcrError::OcrFailed("unreadable".to_string()))
        }
    }

    fn classifier(text: Result<&'static str, ()>) -> HeuristicPageClassifier {
        HeuristicPageClassifier::new(&ClassificationSettings::default(), Arc::new(FixedText(text)))
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Name: Jo  SIGNATURE / M.D."),
            vec!["name".to_string(), "signature".to_string()]
        );
    }

    #[test]
    fn test_signin_sheet() {
        let c = classifier(Ok(""));
        let text = "Printed Name    Signature    Credential\nJane Doe   J. Doe   MD";
        assert_eq!(c.classify_text(text), PageLabel::Signin);
    }

    #[test]
    fn test_receipt() {
        let c = classifier(Ok(""));
        let text = "Bistro Restaurant\nTable 4  Server: Kim\nSubtotal 120.00\nTax 9.60\nTip\nTotal";
        assert_eq!(c.classify_text(text), PageLabel::Dinein);
    }

    #[test]
    fn test_ocr_noise_still_hits() {
        let c = classifier(Ok(""));
        // "signatur" vs "signature" is about 94
        assert_eq!(c.classify_text("Names  Signatur"), PageLabel::Signin);
    }

    #[test]
    fn test_no_keywords_is_unknown() {
        let c = classifier(Ok(""));
        assert_eq!(c.classify_text("lorem ipsum dolor sit amet"), PageLabel::Unknown);
        assert_eq!(c.classify_text(""), PageLabel::Unknown);
    }

    #[test]
    fn test_tie_goes_to_signin() {
        let c = classifier(Ok(""));
        // one exact hit in each set
        assert_eq!(c.classify_text("name menu"), PageLabel::Signin);
    }

    #[test]
    fn test_recognition_failure_is_unknown() {
        let c = classifier(Err(()));
        assert_eq!(c.classify(Path::new("page-1.png")), PageLabel::Unknown);
    }

    #[test]
    fn test_classify_uses_recognized_text() {
        let c = classifier(Ok("NAME SIGNATURE CREDENTIAL"));
        assert_eq!(c.classify(Path::new("page-1.png")), PageLabel::Signin);
    }
}
