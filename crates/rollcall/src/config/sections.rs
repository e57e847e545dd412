//! Configuration sections, one per component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CredentialEntry, OrganizationId};

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Directory scanned for PDF and image inputs.
    pub input_dir: PathBuf,
    /// Rasterized pages and their cache manifests.
    pub pages_dir: PathBuf,
    /// Per-case result files.
    pub output_dir: PathBuf,
    /// Reference data: a SQLite database (`.db`, `.sqlite`) or a
    /// JSON/TOML/YAML reference file.
    pub reference: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            pages_dir: PathBuf::from("pages"),
            output_dir: PathBuf::from("output"),
            reference: None,
        }
    }
}

impl PathSettings {
    /// Expand `~` and anchor relative paths at `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &Path| -> PathBuf {
            let raw = path.to_string_lossy();
            let expanded = PathBuf::from(shellexpand::tilde(&raw).into_owned());
            if expanded.is_absolute() {
                expanded
            } else {
                base.join(expanded)
            }
        };
        self.input_dir = resolve(&self.input_dir);
        self.pages_dir = resolve(&self.pages_dir);
        self.output_dir = resolve(&self.output_dir);
        self.reference = self.reference.as_deref().map(resolve);
    }
}

/// AI Gateway connection and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub model: String,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Requests allowed per sliding minute across all workers.
    pub requests_per_minute: u32,
    /// Attempts on rate-limit signals before giving up.
    pub max_rate_limit_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub temperature: f32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            requests_per_minute: 60,
            max_rate_limit_attempts: 3,
            base_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            request_timeout_secs: 120,
            temperature: 0.1,
        }
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Page classification: heuristic keywords and AI fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationSettings {
    /// Minimum token similarity (0-100) for a keyword hit.
    pub heuristic_threshold: u8,
    /// Ask the AI Gateway when no page of a document looks like a signin page.
    pub ai_fallback: bool,
    /// Pages per fallback request.
    pub batch_size: usize,
    pub signin_keywords: Vec<String>,
    pub dinein_keywords: Vec<String>,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|w| w.to_string()).collect();
        Self {
            heuristic_threshold: 85,
            ai_fallback: true,
            batch_size: 10,
            signin_keywords: words(&["name", "signature", "credential"]),
            dinein_keywords: words(&[
                "menu",
                "price",
                "restaurant",
                "total",
                "subtotal",
                "tax",
                "tip",
                "gratuity",
                "receipt",
                "invoice",
                "order",
                "server",
                "table",
                "appetizer",
                "entree",
                "dessert",
                "beverage",
                "catering",
            ]),
        }
    }
}

/// Per-page preprocessing and extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub ocr_workers: usize,
    /// Skew corrections at or beyond this angle are skipped.
    pub max_rotation_degrees: f32,
    pub contrast_factor: f32,
    pub sharpness_factor: f32,
    /// Longest side of the image sent for extraction, in pixels.
    pub max_image_dimension: u32,
    pub render_dpi: u32,
    /// Tesseract language for local text recognition.
    pub language: String,
    /// Organization assumed when the sheet header names none.
    pub default_organization: OrganizationId,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            ocr_workers: 8,
            max_rotation_degrees: 10.0,
            contrast_factor: 1.5,
            sharpness_factor: 1.5,
            max_image_dimension: 4096,
            render_dpi: 300,
            language: "eng".to_string(),
            default_organization: OrganizationId(1),
        }
    }
}

/// Credential resolution and fuzzy matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub fuzzy_threshold: u8,
    /// Category reported when no tier matches.
    pub default_category: String,
    /// Entries present in every filter regardless of jurisdiction.
    pub always_valid: Vec<CredentialEntry>,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 80,
            default_category: "Non-HCP".to_string(),
            always_valid: vec![
                CredentialEntry::new(-1, "Field Employee", "Field Employee"),
                CredentialEntry::new(-2, "Non-HCP", "Non-HCP"),
            ],
        }
    }
}

/// Batch job limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Documents rendered before the next group is taken in.
    pub documents_per_batch: usize,
    /// Documents rendered concurrently within a group.
    pub document_workers: usize,
    /// Overall job limit; unset means no limit.
    pub job_timeout_secs: Option<u64>,
    /// Memory use (percent) above which intake pauses.
    pub max_memory_percent: f32,
    /// Longest pause waiting for memory before intake stops.
    pub memory_pause_secs: u64,
    pub memory_poll_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            documents_per_batch: 10,
            document_workers: 5,
            job_timeout_secs: None,
            max_memory_percent: 90.0,
            memory_pause_secs: 60,
            memory_poll_secs: 5,
        }
    }
}

impl BatchSettings {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}
