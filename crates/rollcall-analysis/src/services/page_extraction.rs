//! Page Extraction Stage: documents in, labelled pages out.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use rollcall::config::{BatchSettings, ClassificationSettings};
use rollcall::error::{DocumentError, MemoryPressureError};
use rollcall::llm::{AiGateway, InlineImage};
use rollcall::models::{Document, DocumentKind, Page, PageLabel};
use rollcall::pipeline::{EventSink, PipelineEvent, ResourceGuard, Stage};

use super::page_cache::{file_sha256, PageCache};
use crate::classify::HeuristicPageClassifier;
use crate::render::PageRenderer;

/// Pages produced by the stage, plus why intake stopped early, if it did.
#[derive(Debug, Default)]
pub struct PageExtractionOutput {
    /// Every page of every successful document, ordered by document and index.
    pub pages: Vec<Page>,
    pub halted: Option<MemoryPressureError>,
    /// The deadline passed before every document was extracted.
    pub timed_out: bool,
}

impl PageExtractionOutput {
    pub fn signin_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|p| p.is_signin())
    }
}

struct DocumentPages {
    pages: Vec<Page>,
    from_cache: bool,
}

pub struct PageExtractionStage {
    renderer: Arc<dyn PageRenderer>,
    classifier: Arc<HeuristicPageClassifier>,
    gateway: Option<AiGateway>,
    cache: PageCache,
    guard: ResourceGuard,
    ai_fallback: bool,
    classification_batch_size: usize,
    documents_per_batch: usize,
    document_workers: usize,
}

impl PageExtractionStage {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        classifier: Arc<HeuristicPageClassifier>,
        cache: PageCache,
        guard: ResourceGuard,
        classification: &ClassificationSettings,
        batch: &BatchSettings,
    ) -> Self {
        Self {
            renderer,
            classifier,
            gateway: None,
            cache,
            guard,
            ai_fallback: classification.ai_fallback,
            classification_batch_size: classification.batch_size.max(1),
            documents_per_batch: batch.documents_per_batch.max(1),
            document_workers: batch.document_workers.max(1),
        }
    }

    /// Gateway used when a document has no heuristic signin page.
    pub fn with_gateway(mut self, gateway: AiGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Extract every document. With a deadline, intake stops once it passes;
    /// pages of documents finished by then are kept.
    pub async fn run(
        &self,
        documents: &[Document],
        events: &EventSink,
        deadline: Option<Instant>,
    ) -> PageExtractionOutput {
        events
            .emit(PipelineEvent::StageStarted {
                stage: Stage::PageExtraction,
                total_items: documents.len() as u64,
            })
            .await;

        let mut output = PageExtractionOutput::default();
        let (mut succeeded, mut failed, mut skipped) = (0usize, 0usize, 0usize);

        for (batch_no, group) in documents.chunks(self.documents_per_batch).enumerate() {
            let remaining = documents.len() - batch_no * self.documents_per_batch;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                skipped = remaining;
                output.timed_out = true;
                tracing::warn!(remaining, "Job deadline reached, stopping document intake");
                break;
            }
            if let Err(e) = self.guard.wait_for_capacity().await {
                skipped = remaining;
                tracing::error!(remaining = skipped, "Stopping document intake: {}", e);
                events
                    .emit(PipelineEvent::JobHalted {
                        reason: e.to_string(),
                    })
                    .await;
                output.halted = Some(e);
                break;
            }

            tracing::debug!(batch = batch_no + 1, documents = group.len(), "Starting document batch");
            let mut results = stream::iter(group)
                .map(|doc| self.process_document(doc, events))
                .buffer_unordered(self.document_workers);

            let mut finished = 0usize;
            loop {
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, results.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            output.timed_out = true;
                            break;
                        }
                    },
                    None => results.next().await,
                };
                let Some(result) = next else { break };
                finished += 1;
                match result {
                    Some(pages) => {
                        succeeded += 1;
                        output.pages.extend(pages);
                    }
                    None => failed += 1,
                }
            }

            if output.timed_out {
                skipped = remaining - finished;
                tracing::warn!(remaining = skipped, "Job deadline reached during document extraction");
                break;
            }
        }

        output
            .pages
            .sort_by(|a, b| (a.document_id(), a.index()).cmp(&(b.document_id(), b.index())));

        events
            .emit(PipelineEvent::StageCompleted {
                stage: Stage::PageExtraction,
                succeeded,
                failed,
                skipped,
            })
            .await;
        output
    }

    /// Extract one document, reporting the outcome. `None` if it failed.
    async fn process_document(&self, document: &Document, events: &EventSink) -> Option<Vec<Page>> {
        events
            .emit(PipelineEvent::DocumentStarted {
                document_id: document.id.clone(),
            })
            .await;

        match self.extract_document(document, events).await {
            Ok(extracted) => {
                let signin = extracted.pages.iter().filter(|p| p.is_signin()).count();
                tracing::info!(
                    document = %document.id,
                    pages = extracted.pages.len(),
                    signin_pages = signin,
                    cached = extracted.from_cache,
                    "Document pages ready"
                );
                events
                    .emit(PipelineEvent::DocumentCompleted {
                        document_id: document.id.clone(),
                        pages: extracted.pages.len() as u32,
                        signin_pages: signin as u32,
                        from_cache: extracted.from_cache,
                    })
                    .await;
                Some(extracted.pages)
            }
            Err(e) => {
                tracing::warn!(document = %document.id, "Skipping document: {}", e);
                events
                    .emit(PipelineEvent::DocumentFailed {
                        document_id: document.id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                None
            }
        }
    }

    async fn extract_document(
        &self,
        document: &Document,
        events: &EventSink,
    ) -> Result<DocumentPages, DocumentError> {
        // A scanned image is a single signin page as-is.
        if document.kind == DocumentKind::Image {
            return Ok(DocumentPages {
                pages: vec![Page::new(
                    document.id.clone(),
                    document.case_id.clone(),
                    1,
                    PageLabel::Signin,
                    document.path.clone(),
                )],
                from_cache: false,
            });
        }

        let path = document.path.clone();
        let hash = run_blocking(document, move || {
            file_sha256(&path).map_err(|source| DocumentError::Io { path, source })
        })
        .await?;

        let (rasters, labels, from_cache) = match self.cache.load(document, &hash) {
            Some(cached) if !cached.fallback_pending => {
                tracing::debug!(document = %document.id, "Using cached pages");
                return Ok(DocumentPages {
                    pages: cached.pages,
                    from_cache: true,
                });
            }
            Some(cached) => {
                tracing::debug!(document = %document.id, "Reusing cached rasters, labels still pending");
                let rasters: Vec<PathBuf> =
                    cached.pages.iter().map(|p| p.raster().to_path_buf()).collect();
                let labels: Vec<PageLabel> = cached.pages.iter().map(Page::label).collect();
                (rasters, labels, true)
            }
            None => {
                let rasters = self.render(document).await?;
                let classifier = self.classifier.clone();
                let to_classify = rasters.clone();
                let labels = run_blocking(document, move || {
                    Ok(to_classify.iter().map(|p| classifier.classify(p)).collect::<Vec<_>>())
                })
                .await?;
                (rasters, labels, false)
            }
        };

        let (labels, fallback_pending) = if !from_cache && labels.contains(&PageLabel::Signin) {
            (labels, false)
        } else {
            self.fallback_labels(document, &rasters, labels, events).await
        };

        let pages: Vec<Page> = rasters
            .into_iter()
            .zip(labels)
            .enumerate()
            .map(|(i, (raster, label))| {
                Page::new(
                    document.id.clone(),
                    document.case_id.clone(),
                    i as u32 + 1,
                    label,
                    raster,
                )
            })
            .collect();

        if let Err(e) = self.cache.store(document, &hash, &pages, fallback_pending) {
            tracing::warn!(document = %document.id, "Pages not cached: {}", e);
        }

        Ok(DocumentPages { pages, from_cache })
    }

    /// Render into a clean cache directory.
    async fn render(&self, document: &Document) -> Result<Vec<PathBuf>, DocumentError> {
        let renderer = self.renderer.clone();
        let source = document.path.clone();
        let dir = self.cache.document_dir(document);
        let id = document.id.clone();

        run_blocking(document, move || {
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(|source| DocumentError::Io {
                    path: dir.clone(),
                    source,
                })?;
            }
            let rasters = renderer
                .render(&source, &dir)
                .map_err(|e| DocumentError::Render {
                    document: id.clone(),
                    message: e.to_string(),
                })?;
            if rasters.is_empty() {
                return Err(DocumentError::Render {
                    document: id,
                    message: "document has no pages".to_string(),
                });
            }
            Ok(rasters)
        })
        .await
    }

    /// Ask the gateway to label pages the heuristic found no signin page in.
    ///
    /// Batches that fail keep their heuristic labels. The flag is set when
    /// any page went without an AI verdict.
    async fn fallback_labels(
        &self,
        document: &Document,
        rasters: &[PathBuf],
        mut labels: Vec<PageLabel>,
        events: &EventSink,
    ) -> (Vec<PageLabel>, bool) {
        let gateway = match &self.gateway {
            Some(gateway) if self.ai_fallback => gateway,
            _ => return (labels, true),
        };
        if !gateway.is_configured() {
            tracing::warn!(
                document = %document.id,
                endpoint = gateway.endpoint_name(),
                "No signin page found and AI fallback is not configured"
            );
            return (labels, true);
        }

        tracing::info!(document = %document.id, pages = rasters.len(), "No signin page found, asking AI");
        let size = self.classification_batch_size;
        let mut pending = false;
        for (i, (paths, batch_labels)) in rasters.chunks(size).zip(labels.chunks_mut(size)).enumerate() {
            let first = i * size + 1;
            let context = format!("{} pages {}-{}", document.id, first, first + paths.len() - 1);

            let verdicts = match load_images(paths).await {
                Ok(images) => gateway
                    .classify_pages(images, &context)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(format!("failed to read page image: {}", e)),
            };

            match verdicts {
                Ok(verdicts) => {
                    for (label, verdict) in batch_labels.iter_mut().zip(verdicts) {
                        *label = verdict;
                    }
                }
                Err(error) => {
                    pending = true;
                    tracing::warn!(%context, "Classification batch failed, keeping heuristic labels: {}", error);
                    events
                        .emit(PipelineEvent::ClassificationBatchFailed {
                            document_id: document.id.clone(),
                            batch: i + 1,
                            error,
                        })
                        .await;
                }
            }
        }
        (labels, pending)
    }
}

async fn load_images(paths: &[PathBuf]) -> std::io::Result<Vec<InlineImage>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(InlineImage::from_path(path).await?);
    }
    Ok(images)
}

/// Run blocking document work off the async runtime.
async fn run_blocking<T, F>(document: &Document, f: F) -> Result<T, DocumentError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DocumentError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocumentError::Render {
            document: document.id.clone(),
            message: format!("worker task failed: {}", e),
        })?
}
