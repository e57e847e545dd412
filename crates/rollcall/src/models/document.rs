//! Source documents and the case identifiers parsed from their file names.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extensions accepted as single-page image inputs.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Identifier shared by every document that belongs to one event.
///
/// File names follow `[ID]_[Event Type]_[Case ID]_[...]`; the third
/// underscore-delimited token is the case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse the case id from a file name, falling back to the file stem
    /// when the name does not carry enough tokens.
    pub fn from_filename(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        match stem.split('_').nth(2).filter(|t| !t.is_empty()) {
            Some(token) => Self(token.to_string()),
            None => {
                tracing::warn!(
                    file = %path.display(),
                    "File name has no case token, using file stem as case id"
                );
                Self(stem)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a document's pages are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Multi-page PDF that must be rasterized.
    Pdf,
    /// Already-rasterized single page, always treated as a signin page.
    Image,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "pdf" {
            Some(Self::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// An input file belonging to a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// File stem, unique within one input directory.
    pub id: String,
    pub case_id: CaseId,
    pub path: PathBuf,
    pub kind: DocumentKind,
}

impl Document {
    /// Build a document from a path, or `None` if the extension is not supported.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = DocumentKind::from_path(&path)?;
        let id = path.file_stem()?.to_string_lossy().into_owned();
        Some(Self {
            case_id: CaseId::from_filename(&path),
            id,
            path,
            kind,
        })
    }

    /// Collect the supported documents of a directory, sorted by file name.
    pub fn scan_dir(dir: &Path) -> std::io::Result<Vec<Self>> {
        let mut docs: Vec<Self> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(Self::from_path)
            .collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }
}
