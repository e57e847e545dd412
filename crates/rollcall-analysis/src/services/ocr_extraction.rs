//! OCR Extraction Stage: signin pages in, classified records out.
//!
//! A fixed pool of workers pulls pages from a shared queue. Each page moves
//! through preprocessing, extraction and credential classification on its
//! own; a failure stops that page only.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tokio::time::Instant;

use rollcall::config::Settings;
use rollcall::credentials::{CredentialResolver, FuzzyCredentialClassifier};
use rollcall::error::PageError;
use rollcall::llm::prompts::extraction_prompt;
use rollcall::llm::{AiGateway, InlineImage};
use rollcall::models::{ClassifiedRecord, CredentialEntry, OrganizationId, Page, PageRef};
use rollcall::pipeline::{EventSink, PageRun, PageState, PipelineEvent, Stage};
use rollcall::repository::ReferenceStore;

use crate::preprocess::Preprocessor;

/// Result of running the stage.
#[derive(Debug, Default)]
pub struct OcrExtractionOutput {
    pub records: Vec<ClassifiedRecord>,
    pub pages_done: usize,
    pub pages_failed: usize,
    /// The deadline passed before every page finished.
    pub timed_out: bool,
}

#[derive(Default)]
struct Progress {
    records: Vec<ClassifiedRecord>,
    finished: HashSet<PageRef>,
    done: usize,
    failed: usize,
}

/// Everything a worker needs to take one page to a terminal state.
struct PageProcessor {
    gateway: AiGateway,
    store: Arc<dyn ReferenceStore>,
    preprocessor: Arc<Preprocessor>,
    classifier: FuzzyCredentialClassifier,
    always_valid: Vec<CredentialEntry>,
    default_organization: OrganizationId,
}

pub struct OcrExtractionStage {
    processor: Arc<PageProcessor>,
    workers: usize,
}

impl OcrExtractionStage {
    pub fn new(
        gateway: AiGateway,
        store: Arc<dyn ReferenceStore>,
        preprocessor: Arc<Preprocessor>,
        settings: &Settings,
    ) -> Self {
        Self {
            processor: Arc::new(PageProcessor {
                gateway,
                store,
                preprocessor,
                classifier: FuzzyCredentialClassifier::new(&settings.credentials),
                always_valid: settings.credentials.always_valid.clone(),
                default_organization: settings.extraction.default_organization,
            }),
            workers: settings.effective_ocr_workers(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every signin page among `pages`.
    ///
    /// With a deadline, workers still running when it passes are aborted and
    /// their pages, along with any never started, fail with a timeout.
    pub async fn run(
        &self,
        pages: Vec<Page>,
        events: &EventSink,
        deadline: Option<Instant>,
    ) -> OcrExtractionOutput {
        let pages: Vec<Page> = pages.into_iter().filter(Page::is_signin).collect();
        let all_refs: Vec<PageRef> = pages.iter().map(Page::page_ref).collect();
        events
            .emit(PipelineEvent::StageStarted {
                stage: Stage::OcrExtraction,
                total_items: pages.len() as u64,
            })
            .await;

        let queue = Arc::new(tokio::sync::Mutex::new(VecDeque::from(pages)));
        let progress = Arc::new(Mutex::new(Progress::default()));
        // Pages handed over after the deadline fail without being started.
        let expired = !all_refs.is_empty() && deadline.is_some_and(|d| Instant::now() >= d);
        let workers = if expired || all_refs.is_empty() {
            0
        } else {
            self.workers.min(all_refs.len()).max(1)
        };
        tracing::info!(pages = all_refs.len(), workers, "Starting OCR extraction");

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let queue = queue.clone();
            let progress = progress.clone();
            let processor = self.processor.clone();
            let events = events.clone();
            set.spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(page) = next else { break };
                    processor.process(page, &events, &progress).await;
                }
                tracing::debug!(worker_id, "OCR worker finished");
            });
        }

        let timed_out = expired || {
            let drain = async {
                while let Some(joined) = set.join_next().await {
                    if let Err(e) = joined {
                        tracing::error!("OCR worker stopped: {}", e);
                    }
                }
            };
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, drain).await.is_err(),
                None => {
                    drain.await;
                    false
                }
            }
        };
        if timed_out {
            tracing::warn!("Job deadline reached, aborting OCR workers");
            set.shutdown().await;
        }

        // Pages without a terminal state were never finished by a worker.
        let unfinished: Vec<PageRef> = {
            let progress = lock(&progress);
            all_refs
                .into_iter()
                .filter(|p| !progress.finished.contains(p))
                .collect()
        };
        for page in unfinished {
            let error = if timed_out {
                PageError::Timeout
            } else {
                PageError::Worker("page abandoned by its worker".to_string())
            };
            lock(&progress).failed += 1;
            events
                .emit(PipelineEvent::PageFailed {
                    page,
                    error: error.to_string(),
                })
                .await;
        }

        let progress = std::mem::take(&mut *lock(&progress));
        events
            .emit(PipelineEvent::StageCompleted {
                stage: Stage::OcrExtraction,
                succeeded: progress.done,
                failed: progress.failed,
                skipped: 0,
            })
            .await;

        OcrExtractionOutput {
            records: progress.records,
            pages_done: progress.done,
            pages_failed: progress.failed,
            timed_out,
        }
    }
}

fn lock(progress: &Mutex<Progress>) -> std::sync::MutexGuard<'_, Progress> {
    progress.lock().unwrap_or_else(|e| e.into_inner())
}

impl PageProcessor {
    async fn process(&self, page: Page, events: &EventSink, progress: &Mutex<Progress>) {
        let mut run = PageRun::new(page.page_ref());
        let result = self.drive(&page, &mut run, events).await;
        let page_ref = run.page().clone();

        match result {
            Ok(records) => {
                let count = records.len();
                tracing::info!(page = %page_ref, records = count, "Page done");
                {
                    let mut progress = lock(progress);
                    progress.records.extend(records);
                    progress.finished.insert(page_ref.clone());
                    progress.done += 1;
                }
                events
                    .emit(PipelineEvent::PageCompleted {
                        page: page_ref,
                        records: count,
                    })
                    .await;
            }
            Err(e) => {
                let from = run.state();
                let _ = run.fail(e.to_string());
                tracing::warn!(page = %page_ref, state = %from, "Page failed: {}", e);
                {
                    let mut progress = lock(progress);
                    progress.finished.insert(page_ref.clone());
                    progress.failed += 1;
                }
                events
                    .emit(PipelineEvent::PageFailed {
                        page: page_ref,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn drive(
        &self,
        page: &Page,
        run: &mut PageRun,
        events: &EventSink,
    ) -> Result<Vec<ClassifiedRecord>, PageError> {
        let page_ref = page.page_ref();
        let context_label = page_ref.to_string();

        advance(run, PageState::Preprocessing, events).await?;
        let context = self
            .store
            .case_context(page.case_id())
            .await?
            .unwrap_or_default();

        let preprocessor = self.preprocessor.clone();
        let raster = page.raster().to_path_buf();
        let prepared = tokio::task::spawn_blocking(move || preprocessor.prepare_path(&raster))
            .await
            .map_err(|e| PageError::Worker(e.to_string()))?
            .map_err(|e| PageError::Preprocess(e.to_string()))?;
        if prepared.rotation_skipped {
            tracing::info!(
                page = %page_ref,
                skew = prepared.skew_degrees.unwrap_or_default(),
                "Kept original orientation"
            );
        }

        advance(run, PageState::Extracting, events).await?;
        let names: Vec<String> = context
            .expected_names
            .iter()
            .map(|n| n.trim().to_uppercase())
            .collect();
        let hints: Vec<(String, String)> = context
            .credential_hints
            .iter()
            .map(|(name, credential)| (name.to_uppercase(), credential.clone()))
            .collect();
        let prompt = extraction_prompt(&names, &hints, self.default_organization.0);
        let response = self
            .gateway
            .extract(
                InlineImage::png(prepared.png),
                prompt,
                self.default_organization,
                &context_label,
            )
            .await?;

        advance(run, PageState::Classifying, events).await?;
        let filter = CredentialResolver::new(self.store.clone(), self.always_valid.clone())
            .resolve(response.organization, context.jurisdiction.as_deref())
            .await?;
        let records = self
            .classifier
            .classify(response.records, &filter, page.case_id(), &page_ref);

        advance(run, PageState::Done, events).await?;
        Ok(records)
    }
}

async fn advance(run: &mut PageRun, to: PageState, events: &EventSink) -> Result<(), PageError> {
    run.advance(to)
        .map_err(|e| PageError::Worker(e.to_string()))?;
    events
        .emit(PipelineEvent::PageState {
            page: run.page().clone(),
            state: to,
        })
        .await;
    Ok(())
}
