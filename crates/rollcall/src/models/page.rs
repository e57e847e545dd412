//! Rasterized pages and their signin classification.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{CaseId, PageRef};

/// What a page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLabel {
    /// Attendance sheet with names and credentials.
    Signin,
    /// Receipt, menu or other meal record.
    Dinein,
    /// Neither set of evidence was found.
    Unknown,
}

impl PageLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signin => "signin",
            Self::Dinein => "dinein",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a label leniently, as returned by the AI endpoint.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "signin" | "signinsheet" => Some(Self::Signin),
            "dinein" | "receipt" | "menu" => Some(Self::Dinein),
            "unknown" | "other" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of a document.
///
/// The label is fixed at construction; a page that needs a different
/// verdict is a different page value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    document_id: String,
    case_id: CaseId,
    /// 1-indexed.
    index: u32,
    label: PageLabel,
    raster: PathBuf,
}

impl Page {
    pub fn new(
        document_id: impl Into<String>,
        case_id: CaseId,
        index: u32,
        label: PageLabel,
        raster: impl Into<PathBuf>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            case_id,
            index,
            label,
            raster: raster.into(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn label(&self) -> PageLabel {
        self.label
    }

    pub fn raster(&self) -> &Path {
        &self.raster
    }

    pub fn is_signin(&self) -> bool {
        self.label == PageLabel::Signin
    }

    pub fn page_ref(&self) -> PageRef {
        PageRef {
            document_id: self.document_id.clone(),
            index: self.index,
        }
    }
}
