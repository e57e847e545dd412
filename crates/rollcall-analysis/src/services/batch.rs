//! One batch job over a directory of documents.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use rollcall::aggregate::ResultAggregator;
use rollcall::config::Settings;
use rollcall::export::Exporter;
use rollcall::llm::{AiGateway, InferenceEndpoint, RetryPolicy};
use rollcall::models::{CaseResult, Document};
use rollcall::pipeline::{EventSink, JobStatus, MemoryProbe, PipelineEvent, ResourceGuard};
use rollcall::rate_limit::RateBudget;
use rollcall::repository::ReferenceStore;

use super::{OcrExtractionStage, PageCache, PageExtractionStage};
use crate::classify::HeuristicPageClassifier;
use crate::ocr::TextRecognizer;
use crate::preprocess::{Preprocessor, SkewDetector};
use crate::render::PageRenderer;

/// External dependencies of a job, injected so any of them can be replaced.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn PageRenderer>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub endpoint: Arc<dyn InferenceEndpoint>,
    pub store: Arc<dyn ReferenceStore>,
    pub exporter: Arc<dyn Exporter>,
    pub skew_detector: Arc<dyn SkewDetector>,
    pub memory_probe: Arc<dyn MemoryProbe>,
}

/// Final status and per-case results of a job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    pub results: Vec<CaseResult>,
}

pub struct BatchJob {
    settings: Settings,
    collaborators: Collaborators,
}

impl BatchJob {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run every stage over `documents`. Progress events are forwarded to
    /// `event_tx` when given.
    ///
    /// Per-item failures are counted on the status, never returned; the job
    /// only reports `Failed` when nothing usable came out.
    pub async fn run(
        &self,
        documents: Vec<Document>,
        event_tx: Option<mpsc::Sender<PipelineEvent>>,
    ) -> JobReport {
        let events = EventSink::new(JobStatus::new(), event_tx);
        let settings = &self.settings;
        let c = &self.collaborators;
        let timeout = settings.batch.job_timeout();
        let deadline = timeout.map(|t| Instant::now() + t);

        let gateway = AiGateway::new(
            c.endpoint.clone(),
            Arc::new(RateBudget::per_minute(settings.gateway.requests_per_minute)),
            RetryPolicy::from_settings(&settings.gateway),
        );
        tracing::info!(
            job = %events.snapshot().job_id,
            documents = documents.len(),
            endpoint = gateway.endpoint_name(),
            "Starting batch job"
        );

        let classifier = Arc::new(HeuristicPageClassifier::new(
            &settings.classification,
            c.recognizer.clone(),
        ));
        let page_stage = PageExtractionStage::new(
            c.renderer.clone(),
            classifier,
            PageCache::new(&settings.paths.pages_dir),
            ResourceGuard::new(c.memory_probe.clone(), &settings.batch),
            &settings.classification,
            &settings.batch,
        )
        .with_gateway(gateway.clone());

        let extracted_pages = page_stage.run(&documents, &events, deadline).await;
        if extracted_pages.timed_out {
            tracing::warn!("Job deadline reached during page extraction");
        }

        let preprocessor = Arc::new(Preprocessor::new(
            &settings.extraction,
            c.skew_detector.clone(),
        ));
        let ocr_stage = OcrExtractionStage::new(gateway, c.store.clone(), preprocessor, settings);
        let extracted = ocr_stage.run(extracted_pages.pages, &events, deadline).await;
        if extracted_pages.timed_out || extracted.timed_out {
            events
                .emit(PipelineEvent::JobHalted {
                    reason: timeout_reason(timeout),
                })
                .await;
        }

        let results = ResultAggregator::new(c.exporter.clone())
            .run(extracted.records, &events)
            .await;

        events.with_status(|status| status.finish());
        let status = events.snapshot();
        tracing::info!(
            job = %status.job_id,
            state = ?status.state,
            documents = status.documents_processed,
            pages_done = status.pages_processed,
            pages_failed = status.pages_failed,
            cases = status.cases_exported,
            "Batch job finished"
        );

        JobReport { status, results }
    }
}

fn timeout_reason(timeout: Option<std::time::Duration>) -> String {
    match timeout {
        Some(t) => format!("job timed out after {}s", t.as_secs()),
        None => "job timed out".to_string(),
    }
}
