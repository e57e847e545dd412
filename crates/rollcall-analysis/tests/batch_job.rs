//! Batch Job Tests
//!
//! Runs whole jobs against in-process renderers, recognizers and endpoints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{GrayImage, Rgb, RgbImage};

use rollcall::config::Settings;
use rollcall::export::{ExportError, Exporter};
use rollcall::llm::{EndpointError, InferenceEndpoint, InferencePayload};
use rollcall::models::{
    CaseContext, CaseId, CaseResult, CredentialAlias, CredentialEntry, Document, MatchMethod,
    OrganizationId,
};
use rollcall::pipeline::{JobState, MemoryProbe};
use rollcall::repository::{
    InMemoryReferenceStore, ReferenceData, ReferenceLookupError, ReferenceStore, ScopedCredential,
};
use rollcall_analysis::ocr::{OcrError, TextRecognizer};
use rollcall_analysis::preprocess::SkewDetector;
use rollcall_analysis::render::{PageRenderer, RenderError};
use rollcall_analysis::services::{BatchJob, Collaborators};

const SIGNIN_TEXT: &str = "Printed Name   Signature   Credential";
const DINEIN_TEXT: &str = "Menu  Price  Subtotal  Tax  Total";

/// Renders a fixed number of blank pages per document id; unknown ids fail.
struct FakeRenderer {
    pages: HashMap<String, usize>,
    calls: AtomicUsize,
}

impl PageRenderer for FakeRenderer {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn render(&self, pdf_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = pdf_path.file_stem().unwrap().to_str().unwrap();
        let count = *self
            .pages
            .get(id)
            .ok_or_else(|| RenderError::Failed("corrupt pdf".to_string()))?;

        std::fs::create_dir_all(output_dir)?;
        let mut paths = Vec::new();
        for n in 1..=count {
            let path = output_dir.join(format!("page-{}.png", n));
            RgbImage::from_pixel(40, 30, Rgb([255, 255, 255]))
                .save(&path)
                .map_err(|e| RenderError::Failed(e.to_string()))?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Returns page text by (document id, page number), optionally slowly.
struct FakeRecognizer {
    texts: HashMap<(String, u32), &'static str>,
    delays: HashMap<String, Duration>,
}

impl TextRecognizer for FakeRecognizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn recognize(&self, image_path: &Path) -> Result<String, OcrError> {
        let doc = image_path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let page: u32 = image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("page-"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(1);
        if let Some(delay) = self.delays.get(&doc) {
            std::thread::sleep(*delay);
        }
        Ok(self.texts.get(&(doc, page)).copied().unwrap_or("").to_string())
    }
}

/// Answers classification and extraction prompts from scripts.
struct FakeEndpoint {
    classify_reply: Result<&'static str, ()>,
    extract_reply: &'static str,
    extract_delay: Option<Duration>,
    classify_calls: AtomicUsize,
    extract_calls: AtomicUsize,
}

impl FakeEndpoint {
    fn new(extract_reply: &'static str) -> Self {
        Self {
            classify_reply: Ok("[]"),
            extract_reply,
            extract_delay: None,
            classify_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceEndpoint for FakeEndpoint {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, payload: &InferencePayload) -> Result<String, EndpointError> {
        if payload.prompt.contains("page classifier") {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            return self
                .classify_reply
                .map(str::to_string)
                .map_err(|_| EndpointError::Failed("service unavailable".to_string()));
        }
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.extract_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.extract_reply.to_string())
    }
}

#[derive(Default)]
struct CollectingExporter {
    results: Mutex<Vec<CaseResult>>,
}

#[async_trait]
impl Exporter for CollectingExporter {
    async fn export(&self, result: &CaseResult) -> Result<String, ExportError> {
        self.results.lock().unwrap().push(result.clone());
        Ok(format!("memory:{}", result.case_id))
    }
}

/// Fails case lookups for one case and delegates everything else.
struct FlakyStore {
    inner: InMemoryReferenceStore,
    broken_case: &'static str,
}

#[async_trait]
impl ReferenceStore for FlakyStore {
    async fn valid_credentials(
        &self,
        organization: OrganizationId,
        jurisdiction: Option<&str>,
    ) -> Result<Vec<CredentialEntry>, ReferenceLookupError> {
        self.inner.valid_credentials(organization, jurisdiction).await
    }

    async fn possible_names(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<CredentialAlias>, ReferenceLookupError> {
        self.inner.possible_names(organization).await
    }

    async fn case_context(
        &self,
        case_id: &CaseId,
    ) -> Result<Option<CaseContext>, ReferenceLookupError> {
        if case_id.as_str() == self.broken_case {
            return Err(ReferenceLookupError::Unavailable("connection reset".to_string()));
        }
        self.inner.case_context(case_id).await
    }
}

struct NoSkew;

impl SkewDetector for NoSkew {
    fn detect(&self, _gray: &GrayImage) -> Option<f32> {
        None
    }
}

struct FixedMemory(Option<f32>);

impl MemoryProbe for FixedMemory {
    fn used_percent(&self) -> Option<f32> {
        self.0
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    input: PathBuf,
    settings: Settings,
    renderer: Arc<FakeRenderer>,
    recognizer: Arc<FakeRecognizer>,
    endpoint: Arc<FakeEndpoint>,
    exporter: Arc<CollectingExporter>,
    memory: Option<f32>,
    broken_case: Option<&'static str>,
}

impl Fixture {
    fn new(endpoint: FakeEndpoint) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir_all(&input).unwrap();

        let mut settings = Settings::default();
        settings.paths.pages_dir = dir.path().join("pages");
        settings.gateway.requests_per_minute = 600;
        settings.gateway.base_backoff_ms = 10;
        settings.gateway.max_backoff_ms = 20;

        Self {
            _dir: dir,
            input,
            settings,
            renderer: Arc::new(FakeRenderer {
                pages: HashMap::new(),
                calls: AtomicUsize::new(0),
            }),
            recognizer: Arc::new(FakeRecognizer {
                texts: HashMap::new(),
                delays: HashMap::new(),
            }),
            endpoint: Arc::new(endpoint),
            exporter: Arc::new(CollectingExporter::default()),
            memory: None,
            broken_case: None,
        }
    }

    /// Add a PDF whose pages read as the given texts. `None` makes rendering fail.
    fn pdf(&mut self, id: &str, pages: Option<&[&'static str]>) {
        std::fs::write(self.input.join(format!("{}.pdf", id)), format!("%PDF {}", id)).unwrap();
        if let Some(pages) = pages {
            let renderer = Arc::get_mut(&mut self.renderer).unwrap();
            renderer.pages.insert(id.to_string(), pages.len());
            let recognizer = Arc::get_mut(&mut self.recognizer).unwrap();
            for (i, text) in pages.iter().enumerate() {
                recognizer.texts.insert((id.to_string(), i as u32 + 1), *text);
            }
        }
    }

    fn slow_recognition(&mut self, id: &str, delay: Duration) {
        let recognizer = Arc::get_mut(&mut self.recognizer).unwrap();
        recognizer.delays.insert(id.to_string(), delay);
    }

    fn store(&self) -> Arc<dyn ReferenceStore> {
        let credential = |id, name: &str, category: &str| ScopedCredential {
            organization: OrganizationId(1),
            scope: "federal".to_string(),
            entry: CredentialEntry::new(id, name, category),
        };
        let mut data = ReferenceData {
            credentials: vec![
                credential(1, "MD", "Prescriber"),
                credential(2, "RN", "Nurse"),
            ],
            ..Default::default()
        };
        data.cases.insert(
            "C100".to_string(),
            CaseContext {
                expected_names: vec!["Jane Doe".to_string()],
                ..Default::default()
            },
        );
        let inner = InMemoryReferenceStore::new(data);
        match self.broken_case {
            Some(broken_case) => Arc::new(FlakyStore { inner, broken_case }),
            None => Arc::new(inner),
        }
    }

    fn job(&self) -> BatchJob {
        BatchJob::new(
            self.settings.clone(),
            Collaborators {
                renderer: self.renderer.clone(),
                recognizer: self.recognizer.clone(),
                endpoint: self.endpoint.clone(),
                store: self.store(),
                exporter: self.exporter.clone(),
                skew_detector: Arc::new(NoSkew),
                memory_probe: Arc::new(FixedMemory(self.memory)),
            },
        )
    }

    fn documents(&self) -> Vec<Document> {
        Document::scan_dir(&self.input).unwrap()
    }
}

const TWO_ROWS: &str = "- JANE DOE, M.D.\n- John Roe, RN\nCOMPANY_ID: 1";

#[tokio::test]
async fn test_failed_document_does_not_stop_siblings() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.pdf("0001_Lunch_C100", Some(&[DINEIN_TEXT, SIGNIN_TEXT]));
    fx.pdf("0002_Lunch_C100", None);
    fx.pdf("0003_Dinner_C200", Some(&[SIGNIN_TEXT]));

    let report = fx.job().run(fx.documents(), None).await;
    let status = &report.status;

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.documents_found, 3);
    assert_eq!(status.documents_processed, 2);
    assert_eq!(status.documents_failed, 1);
    assert_eq!(status.pages_found, 3);
    assert_eq!(status.signin_pages, 2);
    assert_eq!(status.pages_processed, 2);
    assert_eq!(status.pages_failed, 0);
    assert_eq!(fx.endpoint.classify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.endpoint.extract_calls.load(Ordering::SeqCst), 2);

    assert_eq!(report.results.len(), 2);
    let c100 = &report.results[0];
    assert_eq!(c100.case_id.as_str(), "C100");
    assert_eq!(c100.records.len(), 2);
    assert_eq!(c100.records[0].standardized_credential, "MD");
    assert_eq!(c100.records[0].classification, "Prescriber");
    assert_eq!(c100.records[0].method, MatchMethod::ExactCredential);
    assert_eq!(fx.exporter.results.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_ai_fallback_runs_only_without_signin_pages() {
    let mut endpoint = FakeEndpoint::new(TWO_ROWS);
    endpoint.classify_reply = Ok(r#"["dinein", "signin"]"#);
    let mut fx = Fixture::new(endpoint);
    fx.pdf("0001_Lunch_C100", Some(&[DINEIN_TEXT, "illegible scan"]));
    fx.pdf("0002_Lunch_C100", Some(&[SIGNIN_TEXT, DINEIN_TEXT]));

    let report = fx.job().run(fx.documents(), None).await;

    // Only the first document had no heuristic signin page.
    assert_eq!(fx.endpoint.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.status.signin_pages, 2);
    assert_eq!(report.status.pages_processed, 2);
    assert_eq!(report.status.classification_batches_failed, 0);
}

#[tokio::test]
async fn test_failed_fallback_batch_keeps_heuristic_labels() {
    let mut endpoint = FakeEndpoint::new(TWO_ROWS);
    endpoint.classify_reply = Err(());
    let mut fx = Fixture::new(endpoint);
    fx.pdf("0001_Lunch_C100", Some(&[DINEIN_TEXT, DINEIN_TEXT]));

    let report = fx.job().run(fx.documents(), None).await;

    assert_eq!(report.status.classification_batches_failed, 1);
    assert_eq!(report.status.documents_processed, 1);
    assert_eq!(report.status.signin_pages, 0);
    assert_eq!(fx.endpoint.extract_calls.load(Ordering::SeqCst), 0);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_failed_fallback_is_retried_on_next_run() {
    let mut endpoint = FakeEndpoint::new(TWO_ROWS);
    endpoint.classify_reply = Err(());
    let mut fx = Fixture::new(endpoint);
    fx.pdf("0001_Lunch_C100", Some(&[DINEIN_TEXT, "illegible scan"]));

    let first = fx.job().run(fx.documents(), None).await;
    assert_eq!(first.status.classification_batches_failed, 1);
    assert_eq!(first.status.signin_pages, 0);

    let mut healthy = FakeEndpoint::new(TWO_ROWS);
    healthy.classify_reply = Ok(r#"["dinein", "signin"]"#);
    fx.endpoint = Arc::new(healthy);
    let second = fx.job().run(fx.documents(), None).await;

    assert_eq!(fx.renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.status.documents_cached, 1);
    assert_eq!(fx.endpoint.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.status.signin_pages, 1);
    assert_eq!(second.status.pages_processed, 1);
    assert_eq!(second.results.len(), 1);

    // Once the AI answered, the labels are final.
    let third = fx.job().run(fx.documents(), None).await;
    assert_eq!(fx.endpoint.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(third.status.signin_pages, 1);
}

#[tokio::test]
async fn test_disabled_fallback_is_not_frozen_in_cache() {
    let mut endpoint = FakeEndpoint::new(TWO_ROWS);
    endpoint.classify_reply = Ok(r#"["signin"]"#);
    let mut fx = Fixture::new(endpoint);
    fx.settings.classification.ai_fallback = false;
    fx.pdf("0001_Lunch_C100", Some(&["illegible scan"]));

    let first = fx.job().run(fx.documents(), None).await;
    assert_eq!(first.status.signin_pages, 0);
    assert_eq!(fx.endpoint.classify_calls.load(Ordering::SeqCst), 0);

    fx.settings.classification.ai_fallback = true;
    let second = fx.job().run(fx.documents(), None).await;

    assert_eq!(fx.renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.endpoint.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.status.signin_pages, 1);
}

#[tokio::test]
async fn test_fallback_batches_follow_batch_size() {
    let mut endpoint = FakeEndpoint::new(TWO_ROWS);
    endpoint.classify_reply = Ok(r#"["dinein", "dinein"]"#);
    let mut fx = Fixture::new(endpoint);
    fx.settings.classification.batch_size = 2;
    fx.pdf("0001_Lunch_C100", Some(&[DINEIN_TEXT; 4]));

    let report = fx.job().run(fx.documents(), None).await;

    assert_eq!(fx.endpoint.classify_calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.status.signin_pages, 0);
}

#[tokio::test]
async fn test_duplicates_across_pages_are_collapsed() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT, SIGNIN_TEXT, SIGNIN_TEXT]));

    let report = fx.job().run(fx.documents(), None).await;

    assert_eq!(report.status.pages_processed, 3);
    assert_eq!(report.status.records, 6);
    assert_eq!(report.results.len(), 1);
    let records = &report.results[0].records;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].page.index, 1);
    assert_eq!(records[1].page.index, 1);
}

#[tokio::test]
async fn test_second_run_uses_page_cache() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT]));

    let first = fx.job().run(fx.documents(), None).await;
    let second = fx.job().run(fx.documents(), None).await;

    assert_eq!(fx.renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.status.documents_cached, 0);
    assert_eq!(second.status.documents_cached, 1);
    assert_eq!(second.status.signin_pages, 1);
    assert_eq!(first.results, second.results);
}

#[tokio::test]
async fn test_image_inputs_are_signin_pages() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    let path = fx.input.join("0001_Scan_C300.png");
    RgbImage::from_pixel(40, 30, Rgb([255, 255, 255])).save(&path).unwrap();

    let report = fx.job().run(fx.documents(), None).await;

    assert_eq!(fx.renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.status.signin_pages, 1);
    assert_eq!(report.results[0].case_id.as_str(), "C300");
}

#[tokio::test]
async fn test_timeout_fails_unfinished_pages() {
    let mut endpoint = FakeEndpoint::new(TWO_ROWS);
    endpoint.extract_delay = Some(Duration::from_secs(3600));
    let mut fx = Fixture::new(endpoint);
    fx.settings.batch.job_timeout_secs = Some(1);
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT, SIGNIN_TEXT]));

    let report = fx.job().run(fx.documents(), None).await;
    let status = &report.status;

    assert_eq!(status.pages_failed, 2);
    assert_eq!(status.pages_processed, 0);
    assert_eq!(status.state, JobState::Failed);
    assert!(status.halted_by.as_deref().unwrap().contains("timed out"));
    assert!(status.recent_errors.iter().all(|e| e.contains("timed out")));
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_memory_pressure_stops_intake() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.settings.batch.memory_pause_secs = 0;
    fx.memory = Some(99.0);
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT]));

    let report = fx.job().run(fx.documents(), None).await;

    assert_eq!(report.status.documents_processed, 0);
    assert!(report.status.halted_by.as_deref().unwrap().contains("memory"));
    assert_eq!(report.status.state, JobState::Failed);
    assert_eq!(fx.renderer.calls.load(Ordering::SeqCst), 0);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_timeout_during_page_extraction_fails_job() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.settings.batch.job_timeout_secs = Some(1);
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT]));
    fx.slow_recognition("0001_Lunch_C100", Duration::from_millis(1500));

    let report = fx.job().run(fx.documents(), None).await;
    let status = &report.status;

    assert_eq!(status.documents_processed, 0);
    assert_eq!(status.pages_processed, 0);
    assert_eq!(status.state, JobState::Failed);
    assert!(status.halted_by.as_deref().unwrap().contains("timed out"));
    assert_eq!(fx.endpoint.extract_calls.load(Ordering::SeqCst), 0);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_timeout_during_page_extraction_accounts_for_finished_documents() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.settings.batch.job_timeout_secs = Some(1);
    fx.settings.batch.documents_per_batch = 1;
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT]));
    fx.pdf("0002_Lunch_C200", Some(&[SIGNIN_TEXT]));
    fx.slow_recognition("0002_Lunch_C200", Duration::from_millis(1500));

    let report = fx.job().run(fx.documents(), None).await;
    let status = &report.status;

    // The first document finished before the deadline; its page is carried
    // into OCR extraction and fails there instead of vanishing.
    assert_eq!(status.documents_processed, 1);
    assert_eq!(status.signin_pages, 1);
    assert_eq!(status.pages_processed + status.pages_failed, status.signin_pages);
    assert_eq!(status.pages_failed, 1);
    assert!(status.recent_errors[0].starts_with("0001_Lunch_C100#1"));
    assert!(status.recent_errors[0].contains("timed out"));
    assert_eq!(status.state, JobState::Failed);
}

#[tokio::test]
async fn test_events_are_forwarded() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT]));
    let (tx, mut rx) = tokio::sync::mpsc::channel(256);

    let report = fx.job().run(fx.documents(), Some(tx)).await;

    let mut completed_pages = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, rollcall::pipeline::PipelineEvent::PageCompleted { .. }) {
            completed_pages += 1;
        }
    }
    assert_eq!(completed_pages, 1);
    assert_eq!(report.status.pages_processed, 1);
}

#[tokio::test]
async fn test_reference_failure_fails_only_that_page() {
    let mut fx = Fixture::new(FakeEndpoint::new(TWO_ROWS));
    fx.broken_case = Some("C666");
    fx.pdf("0001_Lunch_C100", Some(&[SIGNIN_TEXT]));
    fx.pdf("0002_Lunch_C666", Some(&[SIGNIN_TEXT]));

    let report = fx.job().run(fx.documents(), None).await;
    let status = &report.status;

    assert_eq!(status.pages_processed, 1);
    assert_eq!(status.pages_failed, 1);
    assert_eq!(status.state, JobState::Completed);
    assert!(status.recent_errors[0].starts_with("0002_Lunch_C666#1"));
    assert!(status.recent_errors[0].contains("connection reset"));
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].case_id.as_str(), "C100");
}
