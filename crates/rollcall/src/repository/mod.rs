//! Reference store: valid credentials, credential aliases and case context.
//!
//! The pipeline only depends on the [`ReferenceStore`] query contract. Two
//! backends are provided: an in-memory store loaded from a reference file and
//! a SQLite store.

mod memory;
mod sqlite;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use crate::error::ReferenceLookupError;
pub use memory::{InMemoryReferenceStore, ReferenceData, ScopedAlias, ScopedCredential};
pub use sqlite::SqliteReferenceStore;

use crate::models::{CaseContext, CaseId, CredentialAlias, CredentialEntry, OrganizationId};

/// Scope tag for credentials valid in every jurisdiction.
pub const FEDERAL_SCOPE: &str = "federal";

/// Read-only queries the pipeline makes against reference data.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Credentials valid for the organization in the given jurisdiction,
    /// i.e. those tagged federal or with that jurisdiction. Without a
    /// jurisdiction every credential of the organization is returned.
    async fn valid_credentials(
        &self,
        organization: OrganizationId,
        jurisdiction: Option<&str>,
    ) -> Result<Vec<CredentialEntry>, ReferenceLookupError>;

    /// Known alternate spellings of credentials for the organization.
    async fn possible_names(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<CredentialAlias>, ReferenceLookupError>;

    /// Expected attendees and venue of a case, if the case is known.
    async fn case_context(
        &self,
        case_id: &CaseId,
    ) -> Result<Option<CaseContext>, ReferenceLookupError>;
}

/// Open the store behind a reference path, choosing the backend by extension.
pub fn open_reference_store(path: &Path) -> Result<Arc<dyn ReferenceStore>, ReferenceLookupError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "db" | "sqlite" | "sqlite3" => Ok(Arc::new(SqliteReferenceStore::new(path)?)),
        _ => Ok(Arc::new(InMemoryReferenceStore::from_path(path)?)),
    }
}

/// Whether a credential's scope tag applies to the requested jurisdiction.
pub(crate) fn scope_matches(scope: &str, jurisdiction: Option<&str>) -> bool {
    match jurisdiction {
        None => true,
        Some(j) => scope.eq_ignore_ascii_case(FEDERAL_SCOPE) || scope.eq_ignore_ascii_case(j),
    }
}
