//! In-memory reference store loaded from a JSON, TOML or YAML file.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{scope_matches, ReferenceLookupError, ReferenceStore};
use crate::models::{CaseContext, CaseId, CredentialAlias, CredentialEntry, OrganizationId};

/// A credential row tagged with its organization and scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedCredential {
    pub organization: OrganizationId,
    /// `federal` or a jurisdiction code.
    pub scope: String,
    #[serde(flatten)]
    pub entry: CredentialEntry,
}

/// An alias row tagged with its organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedAlias {
    pub organization: OrganizationId,
    #[serde(flatten)]
    pub alias: CredentialAlias,
}

/// Serialized form of a reference file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub credentials: Vec<ScopedCredential>,
    pub aliases: Vec<ScopedAlias>,
    pub cases: BTreeMap<String, CaseContext>,
}

impl ReferenceData {
    /// Parse reference data, choosing the format by file extension.
    pub fn from_path(path: &Path) -> Result<Self, ReferenceLookupError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReferenceLookupError::Unavailable(format!("{}: {}", path.display(), e))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parsed = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
            _ => serde_json::from_str(&contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| ReferenceLookupError::Malformed(format!("{}: {}", path.display(), e)))
    }
}

/// Reference store holding all data in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceStore {
    data: ReferenceData,
}

impl InMemoryReferenceStore {
    pub fn new(data: ReferenceData) -> Self {
        Self { data }
    }

    pub fn from_path(path: &Path) -> Result<Self, ReferenceLookupError> {
        let data = ReferenceData::from_path(path)?;
        tracing::debug!(
            path = %path.display(),
            credentials = data.credentials.len(),
            aliases = data.aliases.len(),
            cases = data.cases.len(),
            "Loaded reference file"
        );
        Ok(Self::new(data))
    }

    pub fn data(&self) -> &ReferenceData {
        &self.data
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn valid_credentials(
        &self,
        organization: OrganizationId,
        jurisdiction: Option<&str>,
    ) -> Result<Vec<CredentialEntry>, ReferenceLookupError> {
        Ok(self
            .data
            .credentials
            .iter()
            .filter(|c| c.organization == organization && scope_matches(&c.scope, jurisdiction))
            .map(|c| c.entry.clone())
            .collect())
    }

    async fn possible_names(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<CredentialAlias>, ReferenceLookupError> {
        Ok(self
            .data
            .aliases
            .iter()
            .filter(|a| a.organization == organization)
            .map(|a| a.alias.clone())
            .collect())
    }

    async fn case_context(
        &self,
        case_id: &CaseId,
    ) -> Result<Option<CaseContext>, ReferenceLookupError> {
        Ok(self.data.cases.get(case_id.as_str()).cloned())
    }
}
