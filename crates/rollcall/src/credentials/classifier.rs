//! Three-tier credential classification.
//!
//! Tiers are tried in order and the first hit wins:
//! 1. exact alias match (organization-wide, not jurisdiction filtered)
//! 2. exact credential match within the page filter
//! 3. best token-sort similarity within the page filter, if at or above the threshold
//!
//! Anything else gets the default category with score 0.

use super::similarity::token_sort_ratio;
use super::{normalize_credential, CredentialFilter};
use crate::config::CredentialSettings;
use crate::models::{CaseId, ClassifiedRecord, ExtractionRecord, MatchMethod, PageRef};

/// Outcome of classifying one credential string.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialMatch {
    pub standardized: String,
    pub category: String,
    pub score: u8,
    pub method: MatchMethod,
}

/// Matches OCR'd credential text against a page's [`CredentialFilter`].
#[derive(Debug, Clone)]
pub struct FuzzyCredentialClassifier {
    threshold: u8,
    default_category: String,
}

impl FuzzyCredentialClassifier {
    pub fn new(settings: &CredentialSettings) -> Self {
        Self {
            threshold: settings.fuzzy_threshold,
            default_category: settings.default_category.clone(),
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Classify a single credential string.
    pub fn classify_one(&self, raw: &str, filter: &CredentialFilter) -> CredentialMatch {
        let normalized = normalize_credential(raw);

        if !normalized.is_empty() {
            if let Some(alias) = filter.alias(&normalized) {
                return CredentialMatch {
                    standardized: alias.credential.clone(),
                    category: alias.category.clone(),
                    score: 100,
                    method: MatchMethod::ExactName,
                };
            }

            if let Some(entry) = filter.exact(&normalized) {
                return CredentialMatch {
                    standardized: entry.credential.clone(),
                    category: entry.category.clone(),
                    score: 100,
                    method: MatchMethod::ExactCredential,
                };
            }

            let mut best: Option<(f64, _)> = None;
            for entry in filter.iter() {
                let score = token_sort_ratio(&normalized, &normalize_credential(&entry.credential));
                // Strict comparison keeps the first entry on ties
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, entry));
                }
            }

            if let Some((score, entry)) = best {
                if score >= f64::from(self.threshold) {
                    return CredentialMatch {
                        standardized: entry.credential.clone(),
                        category: entry.category.clone(),
                        score: score.round().clamp(0.0, 100.0) as u8,
                        method: MatchMethod::Fuzzy,
                    };
                }
                tracing::trace!(credential = raw, best = score, "No credential above threshold");
            }
        }

        CredentialMatch {
            standardized: raw.trim().to_string(),
            category: self.default_category.clone(),
            score: 0,
            method: MatchMethod::None,
        }
    }

    /// Classify every record of a page.
    pub fn classify(
        &self,
        records: Vec<ExtractionRecord>,
        filter: &CredentialFilter,
        case_id: &CaseId,
        page: &PageRef,
    ) -> Vec<ClassifiedRecord> {
        records
            .into_iter()
            .map(|record| {
                let m = self.classify_one(&record.raw_credential, filter);
                ClassifiedRecord {
                    name: record.name,
                    raw_credential: record.raw_credential,
                    organization: record.organization,
                    standardized_credential: m.standardized,
                    classification: m.category,
                    match_score: m.score,
                    method: m.method,
                    case_id: case_id.clone(),
                    page: page.clone(),
                }
            })
            .collect()
    }
}
