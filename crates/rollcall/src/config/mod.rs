//! Configuration management for rollcall using the prefer crate.
//!
//! All tunables live in one [`Settings`] tree. Components receive the
//! section they need at construction and never read globals.

mod sections;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sections::{
    BatchSettings, ClassificationSettings, CredentialSettings, ExtractionSettings,
    GatewaySettings, PathSettings,
};

/// Name used for config file discovery.
pub const CONFIG_NAME: &str = "rollcall";

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub gateway: GatewaySettings,
    pub classification: ClassificationSettings,
    pub extraction: ExtractionSettings,
    pub credentials: CredentialSettings,
    pub batch: BatchSettings,
}

impl Settings {
    /// Load settings from an explicit file, or discover one with prefer.
    ///
    /// Environment overrides are applied last, then the result is validated.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match explicit {
            Some(path) => Self::load_from_path(path).await?,
            None => match prefer::load(CONFIG_NAME).await {
                Ok(pref_config) => match pref_config.source_path() {
                    Some(path) => Self::load_from_path(path).await?,
                    None => Self::default(),
                },
                Err(_) => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut settings = Self::parse(path, &contents)?;
        if let Some(base) = path.parent() {
            settings.paths.resolve_relative_to(base);
        }
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(settings)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parsed = match ext {
            "toml" => toml::from_str(contents).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            _ => serde_json::from_str(contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(key) = get("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
            self.gateway.api_key = Some(key);
        }
        if let Some(model) = get("ROLLCALL_MODEL").filter(|m| !m.is_empty()) {
            self.gateway.model = model;
        }
        if let Some(rpm) = get("ROLLCALL_REQUESTS_PER_MINUTE").and_then(|v| v.parse().ok()) {
            self.gateway.requests_per_minute = rpm;
        }
        if let Some(workers) = get("ROLLCALL_OCR_WORKERS").and_then(|v| v.parse().ok()) {
            self.extraction.ocr_workers = workers;
        }
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                key,
                message: message.into(),
            }
        }

        if self.gateway.requests_per_minute == 0 {
            return Err(invalid("gateway.requests_per_minute", "must be at least 1"));
        }
        if self.gateway.max_rate_limit_attempts == 0 {
            return Err(invalid("gateway.max_rate_limit_attempts", "must be at least 1"));
        }
        if self.classification.heuristic_threshold > 100 {
            return Err(invalid("classification.heuristic_threshold", "must be 0-100"));
        }
        if self.classification.batch_size == 0 {
            return Err(invalid("classification.batch_size", "must be at least 1"));
        }
        if self.credentials.fuzzy_threshold > 100 {
            return Err(invalid("credentials.fuzzy_threshold", "must be 0-100"));
        }
        if self.extraction.ocr_workers == 0 {
            return Err(invalid("extraction.ocr_workers", "must be at least 1"));
        }
        if self.extraction.max_rotation_degrees.is_nan() || self.extraction.max_rotation_degrees <= 0.0 {
            return Err(invalid("extraction.max_rotation_degrees", "must be positive"));
        }
        if self.extraction.max_image_dimension == 0 {
            return Err(invalid("extraction.max_image_dimension", "must be at least 1"));
        }
        if self.batch.documents_per_batch == 0 || self.batch.document_workers == 0 {
            return Err(invalid(
                "batch.documents_per_batch",
                "batch size and document workers must be at least 1",
            ));
        }
        if !(0.0..=100.0).contains(&self.batch.max_memory_percent) {
            return Err(invalid("batch.max_memory_percent", "must be 0-100"));
        }
        Ok(())
    }

    /// OCR workers actually started: never more than the per-minute budget.
    pub fn effective_ocr_workers(&self) -> usize {
        self.extraction
            .ocr_workers
            .min(self.gateway.requests_per_minute as usize)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.extraction.ocr_workers, 8);
        assert_eq!(settings.credentials.fuzzy_threshold, 80);
        assert_eq!(settings.classification.batch_size, 10);
        assert_eq!(settings.gateway.max_rate_limit_attempts, 3);
    }

    #[tokio::test]
    async fn test_load_toml_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            r#"
[paths]
input_dir = "scans"

[credentials]
fuzzy_threshold = 90

[extraction]
ocr_workers = 3
"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(&path).await.unwrap();
        assert_eq!(settings.paths.input_dir, dir.path().join("scans"));
        assert_eq!(settings.credentials.fuzzy_threshold, 90);
        assert_eq!(settings.extraction.ocr_workers, 3);
        // Untouched sections keep defaults
        assert_eq!(settings.batch.documents_per_batch, 10);
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.yaml");
        std::fs::write(&path, "gateway:\n  requests_per_minute: 15\n").unwrap();

        let settings = Settings::load_from_path(&path).await.unwrap();
        assert_eq!(settings.gateway.requests_per_minute, 15);
    }

    #[tokio::test]
    async fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Settings::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env_from(|key| match key {
            "GEMINI_API_KEY" => Some("secret".to_string()),
            "ROLLCALL_OCR_WORKERS" => Some("4".to_string()),
            "ROLLCALL_REQUESTS_PER_MINUTE" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(settings.gateway.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.extraction.ocr_workers, 4);
        assert_eq!(settings.gateway.requests_per_minute, 60);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut settings = Settings::default();
        settings.credentials.fuzzy_threshold = 101;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { key: "credentials.fuzzy_threshold", .. })
        ));
    }

    #[test]
    fn test_workers_clamped_to_budget() {
        let mut settings = Settings::default();
        settings.gateway.requests_per_minute = 5;
        settings.extraction.ocr_workers = 8;
        assert_eq!(settings.effective_ocr_workers(), 5);
    }
}
