//! Helpers shared by commands.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;

use rollcall::config::Settings;
use rollcall::repository::{open_reference_store, InMemoryReferenceStore, ReferenceStore};

/// Reference database used when none is configured.
pub fn default_reference_db() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rollcall")
        .join("reference.db")
}

/// Open the configured reference store, or an empty one with a warning.
pub fn reference_store(settings: &Settings) -> anyhow::Result<Arc<dyn ReferenceStore>> {
    match &settings.paths.reference {
        Some(path) => Ok(open_reference_store(path)?),
        None => {
            eprintln!(
                "{} No reference data configured (paths.reference); every credential will be unmatched",
                style("!").yellow()
            );
            Ok(Arc::new(InMemoryReferenceStore::default()))
        }
    }
}
