//! PDF rasterization.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::ocr::{check_binary, PDFTOPPM_NOT_FOUND};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer not available: {0}")]
    NotAvailable(String),

    #[error("Render failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a PDF into one image file per page. Implementations block; call
/// them from `spawn_blocking`.
pub trait PageRenderer: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Render every page into `output_dir`, returning paths in page order.
    fn render(&self, pdf_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, RenderError>;
}

/// Rasterizes with poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn name(&self) -> &str {
        "pdftoppm"
    }

    fn is_available(&self) -> bool {
        check_binary("pdftoppm")
    }

    fn render(&self, pdf_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, RenderError> {
        std::fs::create_dir_all(output_dir)?;
        let dpi = self.dpi.to_string();
        let output = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi])
            .arg(pdf_path)
            .arg(output_dir.join("page"))
            .output();

        match output {
            Ok(o) if o.status.success() => {
                let pages = collect_page_images(output_dir)?;
                if pages.is_empty() {
                    return Err(RenderError::Failed(format!(
                        "no pages rendered from {}",
                        pdf_path.display()
                    )));
                }
                Ok(pages)
            }
            Ok(o) => Err(RenderError::Failed(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&o.stderr).trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RenderError::NotAvailable(PDFTOPPM_NOT_FOUND.to_string()))
            }
            Err(e) => Err(RenderError::Io(e)),
        }
    }
}

/// Page images written by pdftoppm (`page-1.png`, `page-01.png`, ...),
/// ordered by page number.
pub fn collect_page_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let number = stem.strip_prefix("page-")?.parse::<u32>().ok()?;
            let is_png = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png"));
            is_png.then_some((number, path))
        })
        .collect();
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_orders_numerically() {
        let temp = TempDir::new().unwrap();
        for name in ["page-10.png", "page-02.png", "page-01.png", "notes.txt", "page-03.jpg"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        let pages = collect_page_images(temp.path()).unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["page-01.png", "page-02.png", "page-10.png"]);
    }
}
