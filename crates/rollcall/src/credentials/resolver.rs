//! Per-page credential resolution.

use std::sync::Arc;

use super::CredentialFilter;
use crate::models::{CredentialEntry, OrganizationId};
use crate::repository::{ReferenceLookupError, ReferenceStore};

/// Builds the [`CredentialFilter`] for a single page.
///
/// `resolve` consumes the resolver, so an instance cannot outlive the page it
/// was created for.
pub struct CredentialResolver {
    store: Arc<dyn ReferenceStore>,
    always_valid: Vec<CredentialEntry>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn ReferenceStore>, always_valid: Vec<CredentialEntry>) -> Self {
        Self {
            store,
            always_valid,
        }
    }

    /// Query the store for the page's scope and union the always-valid set.
    pub async fn resolve(
        self,
        organization: OrganizationId,
        jurisdiction: Option<&str>,
    ) -> Result<CredentialFilter, ReferenceLookupError> {
        let jurisdiction = jurisdiction.map(str::trim).filter(|j| !j.is_empty());
        let entries = self
            .store
            .valid_credentials(organization, jurisdiction)
            .await?;
        let aliases = self.store.possible_names(organization).await?;

        let filter = CredentialFilter::new(entries, &self.always_valid, aliases);
        tracing::debug!(
            organization = %organization,
            jurisdiction = jurisdiction.unwrap_or("*"),
            credentials = filter.len(),
            "Resolved credential filter"
        );
        Ok(filter)
    }
}
