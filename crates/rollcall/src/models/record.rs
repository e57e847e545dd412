//! Extracted and classified attendee records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::CaseId;

/// Sponsoring organization identified from a signin sheet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub u32);

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A credential known to the reference store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub id: i64,
    /// Standardized credential text, e.g. `MD`.
    pub credential: String,
    /// Category reported for matches, e.g. `HCP`.
    pub category: String,
}

impl CredentialEntry {
    pub fn new(id: i64, credential: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            credential: credential.into(),
            category: category.into(),
        }
    }
}

/// Alternate spelling of a credential, scoped to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialAlias {
    pub alias: String,
    pub credential: String,
    pub category: String,
}

impl CredentialAlias {
    pub fn new(
        alias: impl Into<String>,
        credential: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            credential: credential.into(),
            category: category.into(),
        }
    }
}

/// Reference data for the case a document belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseContext {
    /// Attendee names expected at the event.
    #[serde(default)]
    pub expected_names: Vec<String>,
    /// Credentials recorded at registration, keyed by attendee name.
    #[serde(default)]
    pub credential_hints: BTreeMap<String, String>,
    /// Venue state, when known.
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

/// One name/credential pair read from a signin page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub name: String,
    pub raw_credential: String,
    pub organization: OrganizationId,
}

/// Which tier produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactName,
    ExactCredential,
    Fuzzy,
    None,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactName => "exact_name",
            Self::ExactCredential => "exact_credential",
            Self::Fuzzy => "fuzzy",
            Self::None => "none",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a page within a batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub document_id: String,
    pub index: u32,
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.index)
    }
}

/// An extraction record with its credential classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub name: String,
    pub raw_credential: String,
    pub organization: OrganizationId,
    pub standardized_credential: String,
    pub classification: String,
    /// Similarity in 0..=100.
    pub match_score: u8,
    pub method: MatchMethod,
    pub case_id: CaseId,
    pub page: PageRef,
}

impl ClassifiedRecord {
    /// Key used to deduplicate records within a case.
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.name.trim().to_uppercase(),
            self.standardized_credential.trim().to_uppercase(),
        )
    }
}

/// Deduplicated records of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: CaseId,
    pub records: Vec<ClassifiedRecord>,
}
