//! Writing case results.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{CaseResult, ClassifiedRecord};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize case {case}: {source}")]
    Serialize {
        case: String,
        source: serde_json::Error,
    },
}

/// Receives one deduplicated result per case.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Persist a case result and return where it went.
    async fn export(&self, result: &CaseResult) -> Result<String, ExportError>;
}

/// Writes `OCR_Results_Classified_<case>.json` files.
pub struct JsonExporter {
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct CaseFile<'a> {
    case_id: &'a str,
    total_records: usize,
    records: &'a [ClassifiedRecord],
}

impl JsonExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, case_id: &str) -> PathBuf {
        let safe: String = case_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.output_dir
            .join(format!("OCR_Results_Classified_{}.json", safe))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl Exporter for JsonExporter {
    async fn export(&self, result: &CaseResult) -> Result<String, ExportError> {
        let path = self.path_for(result.case_id.as_str());
        let file = CaseFile {
            case_id: result.case_id.as_str(),
            total_records: result.records.len(),
            records: &result.records,
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| ExportError::Serialize {
            case: result.case_id.to_string(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| ExportError::Io {
                path: self.output_dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| ExportError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(case = %result.case_id, records = result.records.len(), path = %path.display(), "Wrote case results");
        Ok(path.display().to_string())
    }
}
