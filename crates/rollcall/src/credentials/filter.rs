//! Immutable per-page credential reference.

use std::collections::{BTreeMap, HashMap};

use super::normalize_credential;
use crate::models::{CredentialAlias, CredentialEntry};

/// Credentials valid for one page's organization and jurisdiction, plus the
/// organization's credential aliases.
///
/// Built once by the resolver and never modified. Iteration order is
/// ascending credential id.
#[derive(Debug, Clone, Default)]
pub struct CredentialFilter {
    entries: BTreeMap<i64, CredentialEntry>,
    /// Normalized credential -> id of the first entry carrying it.
    by_key: HashMap<String, i64>,
    /// Normalized alias -> first alias row carrying it.
    aliases: HashMap<String, CredentialAlias>,
}

impl CredentialFilter {
    /// Build a filter from store entries and the always-valid set.
    ///
    /// Always-valid entries replace store entries with the same id.
    pub fn new(
        entries: impl IntoIterator<Item = CredentialEntry>,
        always_valid: &[CredentialEntry],
        aliases: impl IntoIterator<Item = CredentialAlias>,
    ) -> Self {
        let mut map: BTreeMap<i64, CredentialEntry> =
            entries.into_iter().map(|e| (e.id, e)).collect();
        for entry in always_valid {
            map.insert(entry.id, entry.clone());
        }

        let mut by_key = HashMap::new();
        for (id, entry) in &map {
            by_key
                .entry(normalize_credential(&entry.credential))
                .or_insert(*id);
        }

        let mut alias_map = HashMap::new();
        for alias in aliases {
            alias_map
                .entry(normalize_credential(&alias.alias))
                .or_insert(alias);
        }

        Self {
            entries: map,
            by_key,
            aliases: alias_map,
        }
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &CredentialEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry whose normalized credential equals `normalized`.
    pub fn exact(&self, normalized: &str) -> Option<&CredentialEntry> {
        self.by_key
            .get(normalized)
            .and_then(|id| self.entries.get(id))
    }

    /// Alias whose normalized spelling equals `normalized`.
    pub fn alias(&self, normalized: &str) -> Option<&CredentialAlias> {
        self.aliases.get(normalized)
    }
}
