//! On-disk cache of rendered and labelled pages.
//!
//! Each document gets `pages_dir/<document id>/` holding its page rasters and
//! a `manifest.json` keyed by the SHA-256 of the source file.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use rollcall::error::DocumentError;
use rollcall::models::{Document, Page, PageLabel};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ManifestPage {
    index: u32,
    /// File name inside the document's cache directory.
    file: String,
    label: PageLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Manifest {
    source_sha256: String,
    /// Labels still await an AI verdict the last run could not get.
    #[serde(default)]
    fallback_pending: bool,
    pages: Vec<ManifestPage>,
}

/// Pages read back from the cache.
#[derive(Debug)]
pub struct CachedPages {
    pub pages: Vec<Page>,
    /// The rasters are reusable but the labels must be classified again.
    pub fallback_pending: bool,
}

/// Compute the SHA-256 hex digest of a file.
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct PageCache {
    root: PathBuf,
}

impl PageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for one document's rasters and manifest.
    pub fn document_dir(&self, document: &Document) -> PathBuf {
        self.root.join(&document.id)
    }

    fn manifest_path(&self, document: &Document) -> PathBuf {
        self.document_dir(document).join(MANIFEST_FILE)
    }

    /// Cached pages for a document, if the manifest matches the current
    /// source hash and every raster is still present.
    pub fn load(&self, document: &Document, source_sha256: &str) -> Option<CachedPages> {
        let path = self.manifest_path(document);
        let contents = std::fs::read_to_string(&path).ok()?;
        let manifest: Manifest = match serde_json::from_str(&contents) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(document = %document.id, "Ignoring unreadable page manifest: {}", e);
                return None;
            }
        };

        if manifest.source_sha256 != source_sha256 {
            tracing::debug!(document = %document.id, "Source changed since pages were cached");
            return None;
        }

        let dir = self.document_dir(document);
        let mut pages = Vec::with_capacity(manifest.pages.len());
        for entry in manifest.pages {
            let raster = dir.join(&entry.file);
            if !raster.is_file() {
                tracing::debug!(document = %document.id, page = entry.index, "Cached raster missing");
                return None;
            }
            pages.push(Page::new(
                document.id.clone(),
                document.case_id.clone(),
                entry.index,
                entry.label,
                raster,
            ));
        }
        Some(CachedPages {
            pages,
            fallback_pending: manifest.fallback_pending,
        })
    }

    /// Record a document's pages. Rasters must live in the document's cache
    /// directory. `fallback_pending` marks labels that still need an AI
    /// verdict, so the next run reclassifies instead of trusting them.
    pub fn store(
        &self,
        document: &Document,
        source_sha256: &str,
        pages: &[Page],
        fallback_pending: bool,
    ) -> Result<(), DocumentError> {
        let cache_err = |message: String| DocumentError::Cache {
            document: document.id.clone(),
            message,
        };

        let dir = self.document_dir(document);
        let mut entries = Vec::with_capacity(pages.len());
        for page in pages {
            let file = page
                .raster()
                .strip_prefix(&dir)
                .ok()
                .and_then(|p| p.to_str())
                .ok_or_else(|| {
                    cache_err(format!(
                        "raster {} is outside {}",
                        page.raster().display(),
                        dir.display()
                    ))
                })?;
            entries.push(ManifestPage {
                index: page.index(),
                file: file.to_string(),
                label: page.label(),
            });
        }

        let manifest = Manifest {
            source_sha256: source_sha256.to_string(),
            fallback_pending,
            pages: entries,
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| cache_err(e.to_string()))?;

        std::fs::create_dir_all(&dir).map_err(|source| DocumentError::Io {
            path: dir.clone(),
            source,
        })?;

        // Written beside the target, then renamed into place.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|source| DocumentError::Io {
            path: dir.clone(),
            source,
        })?;
        std::io::Write::write_all(&mut tmp, json.as_bytes()).map_err(|source| DocumentError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;
        let target = self.manifest_path(document);
        tmp.persist(&target).map_err(|e| DocumentError::Io {
            path: target.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}
