//! Batch processing command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use rollcall::config::Settings;
use rollcall::export::JsonExporter;
use rollcall::llm::{GeminiEndpoint, InferenceEndpoint};
use rollcall::models::{Document, DocumentKind};
use rollcall::pipeline::{JobState, JobStatus, PipelineEvent, ProcMeminfo, Stage};
use rollcall_analysis::ocr::{tool_hint, TesseractRecognizer};
use rollcall_analysis::preprocess::ProjectionProfileDetector;
use rollcall_analysis::render::PdftoppmRenderer;
use rollcall_analysis::services::{BatchJob, Collaborators};

use super::helpers::reference_store;

/// Command-line overrides for one run.
pub struct ProcessOptions {
    pub input: Option<PathBuf>,
    pub workers: Option<usize>,
    pub timeout: Option<u64>,
    pub no_ai_fallback: bool,
    pub json: bool,
}

/// Run the full pipeline over the input directory.
pub async fn cmd_process(mut settings: Settings, options: ProcessOptions) -> anyhow::Result<()> {
    if let Some(input) = options.input {
        settings.paths.input_dir = input;
    }
    if let Some(workers) = options.workers {
        settings.extraction.ocr_workers = workers.max(1);
    }
    if let Some(timeout) = options.timeout {
        settings.batch.job_timeout_secs = Some(timeout);
    }
    if options.no_ai_fallback {
        settings.classification.ai_fallback = false;
    }

    let input_dir = settings.paths.input_dir.clone();
    let documents = Document::scan_dir(&input_dir)
        .with_context(|| format!("failed to read input directory {}", input_dir.display()))?;
    if documents.is_empty() {
        println!(
            "{} No PDF or image files in {}",
            style("!").yellow(),
            input_dir.display()
        );
        return Ok(());
    }

    if documents.iter().any(|d| d.kind == DocumentKind::Pdf) {
        if let Some(hint) = tool_hint("pdftoppm") {
            println!("{} {}", style("✗").red(), hint);
            return Err(anyhow::anyhow!(
                "Missing required PDF tools. Run 'rollcall check' for details."
            ));
        }
    }
    if let Some(hint) = tool_hint("tesseract") {
        eprintln!(
            "{} {}; pages will only be classified by the AI fallback",
            style("!").yellow(),
            hint
        );
    }

    let endpoint = GeminiEndpoint::new(&settings.gateway)?;
    if !endpoint.is_configured() {
        return Err(anyhow::anyhow!(
            "GEMINI_API_KEY is not set; signin pages cannot be read without it"
        ));
    }

    let collaborators = Collaborators {
        renderer: Arc::new(PdftoppmRenderer::new(settings.extraction.render_dpi)),
        recognizer: Arc::new(TesseractRecognizer::new(settings.extraction.language.clone())),
        endpoint: Arc::new(endpoint),
        store: reference_store(&settings)?,
        exporter: Arc::new(JsonExporter::new(settings.paths.output_dir.clone())),
        skew_detector: Arc::new(ProjectionProfileDetector::default()),
        memory_probe: Arc::new(ProcMeminfo),
    };

    println!(
        "{} Processing {} documents from {} ({} OCR workers)",
        style("→").cyan(),
        documents.len(),
        input_dir.display(),
        settings.effective_ocr_workers()
    );

    let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>(256);
    let show_progress = !options.json;
    let event_handler = tokio::spawn(display_progress(event_rx, show_progress));

    let output_dir = settings.paths.output_dir.clone();
    let report = BatchJob::new(settings, collaborators)
        .run(documents, Some(event_tx))
        .await;
    let _ = event_handler.await;

    let status = &report.status;
    if options.json {
        println!("{}", serde_json::to_string_pretty(status)?);
    } else {
        print_summary(status, &output_dir);
    }

    if status.state == JobState::Failed {
        return Err(anyhow::anyhow!("Job failed without producing any results"));
    }
    Ok(())
}

fn stage_title(stage: Stage) -> &'static str {
    match stage {
        Stage::PageExtraction => "Extracting pages",
        Stage::OcrExtraction => "Reading signin pages",
        Stage::Aggregation => "Exporting cases",
    }
}

fn stage_bar(total: u64, stage: Stage) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    bar.set_message(stage_title(stage));
    bar
}

/// Print an error line without tearing the progress bar.
fn report_line(bar: Option<&ProgressBar>, line: String) {
    match bar {
        Some(bar) => bar.suspend(|| eprintln!("{}", line)),
        None => eprintln!("{}", line),
    }
}

async fn display_progress(mut event_rx: mpsc::Receiver<PipelineEvent>, show: bool) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = event_rx.recv().await {
        if !show {
            continue;
        }
        match event {
            PipelineEvent::StageStarted { stage, total_items } => {
                if let Some(old) = bar.take() {
                    old.finish_and_clear();
                }
                println!(
                    "{} {}: {}",
                    style("→").cyan(),
                    stage_title(stage),
                    total_items
                );
                bar = Some(stage_bar(total_items, stage));
            }
            PipelineEvent::DocumentCompleted { .. }
            | PipelineEvent::PageCompleted { .. }
            | PipelineEvent::CaseExported { .. } => {
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            PipelineEvent::DocumentFailed { document_id, error } => {
                report_line(
                    bar.as_ref(),
                    format!("  {} Document {} failed: {}", style("✗").red(), document_id, error),
                );
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            PipelineEvent::PageFailed { page, error } => {
                report_line(
                    bar.as_ref(),
                    format!("  {} Page {} failed: {}", style("✗").red(), page, error),
                );
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            PipelineEvent::ExportFailed { case_id, error } => {
                report_line(
                    bar.as_ref(),
                    format!("  {} Case {} not exported: {}", style("✗").red(), case_id, error),
                );
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            PipelineEvent::ClassificationBatchFailed {
                document_id,
                batch,
                error,
            } => {
                report_line(
                    bar.as_ref(),
                    format!(
                        "  {} {} classification batch {} failed, kept heuristic labels: {}",
                        style("!").yellow(),
                        document_id,
                        batch,
                        error
                    ),
                );
            }
            PipelineEvent::JobHalted { reason } => {
                report_line(bar.as_ref(), format!("  {} Halted: {}", style("!").yellow(), reason));
            }
            PipelineEvent::StageCompleted { .. } => {
                if let Some(old) = bar.take() {
                    old.finish_and_clear();
                }
            }
            PipelineEvent::DocumentStarted { .. } | PipelineEvent::PageState { .. } => {}
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn print_summary(status: &JobStatus, output_dir: &std::path::Path) {
    let marker = match status.state {
        JobState::Failed => style("✗").red(),
        _ => style("✓").green(),
    };
    println!("\n{} Job {}", marker, status.job_id);
    println!(
        "  Documents: {} processed, {} failed, {} from cache",
        status.documents_processed, status.documents_failed, status.documents_cached
    );
    println!(
        "  Pages:     {} found, {} signin, {} read, {} failed",
        status.pages_found, status.signin_pages, status.pages_processed, status.pages_failed
    );
    if status.classification_batches_failed > 0 {
        println!(
            "  AI classification batches failed: {}",
            status.classification_batches_failed
        );
    }
    println!(
        "  Records:   {} read, {} cases exported to {}",
        status.records,
        status.cases_exported,
        output_dir.display()
    );
    if status.exports_failed > 0 {
        println!("  Exports failed: {}", status.exports_failed);
    }
    if let Some(reason) = &status.halted_by {
        println!("  {} Halted: {}", style("!").yellow(), reason);
    }
}
