//! Reference database commands.

use std::path::{Path, PathBuf};

use console::style;

use rollcall::config::Settings;
use rollcall::repository::{ReferenceData, SqliteReferenceStore};

use super::helpers::default_reference_db;

fn db_path(settings: &Settings, db: Option<PathBuf>) -> PathBuf {
    db.or_else(|| settings.paths.reference.clone())
        .unwrap_or_else(default_reference_db)
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Create the reference database schema.
pub async fn cmd_reference_init(settings: &Settings, db: Option<PathBuf>) -> anyhow::Result<()> {
    let path = db_path(settings, db);
    ensure_parent(&path)?;
    let store = tokio::task::spawn_blocking(move || SqliteReferenceStore::new(&path)).await??;
    println!(
        "{} Reference database ready at {}",
        style("✓").green(),
        store.path().display()
    );
    Ok(())
}

/// Replace the database contents with a reference file.
pub async fn cmd_reference_import(
    settings: &Settings,
    file: &Path,
    db: Option<PathBuf>,
) -> anyhow::Result<()> {
    let path = db_path(settings, db);
    ensure_parent(&path)?;
    let data = ReferenceData::from_path(file)?;
    let counts = (data.credentials.len(), data.aliases.len(), data.cases.len());

    tokio::task::spawn_blocking(move || {
        let store = SqliteReferenceStore::new(&path)?;
        store.import(&data)
    })
    .await??;

    println!(
        "{} Imported {} credentials, {} aliases and {} cases from {}",
        style("✓").green(),
        counts.0,
        counts.1,
        counts.2,
        file.display()
    );
    Ok(())
}
