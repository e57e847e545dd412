//! Progress events emitted by stages.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{JobStatus, PageState};
use crate::models::{CaseId, PageRef};

/// Pipeline stage names for progress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PageExtraction,
    OcrExtraction,
    Aggregation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageExtraction => "page_extraction",
            Self::OcrExtraction => "ocr_extraction",
            Self::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress events emitted by stages and folded into the job status.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted {
        stage: Stage,
        total_items: u64,
    },
    DocumentStarted {
        document_id: String,
    },
    DocumentCompleted {
        document_id: String,
        pages: u32,
        signin_pages: u32,
        from_cache: bool,
    },
    DocumentFailed {
        document_id: String,
        error: String,
    },
    /// An AI classification batch failed; its pages kept heuristic labels.
    ClassificationBatchFailed {
        document_id: String,
        batch: usize,
        error: String,
    },
    PageState {
        page: PageRef,
        state: PageState,
    },
    PageCompleted {
        page: PageRef,
        records: usize,
    },
    PageFailed {
        page: PageRef,
        error: String,
    },
    CaseExported {
        case_id: CaseId,
        records: usize,
    },
    ExportFailed {
        case_id: CaseId,
        error: String,
    },
    /// The job stopped taking in or processing work early.
    JobHalted {
        reason: String,
    },
    StageCompleted {
        stage: Stage,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Where stages send events.
///
/// Cheap to clone; all clones update the same status.
#[derive(Clone)]
pub struct EventSink {
    status: Arc<Mutex<JobStatus>>,
    forward: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(status: JobStatus, forward: Option<mpsc::Sender<PipelineEvent>>) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
            forward,
        }
    }

    /// Sink with a fresh status and no listener.
    pub fn detached() -> Self {
        Self::new(JobStatus::new(), None)
    }

    /// Record an event and pass it to the listener, if any.
    pub async fn emit(&self, event: PipelineEvent) {
        self.with_status(|status| status.apply(&event));
        if let Some(tx) = &self.forward {
            // A listener that went away does not stop the job
            let _ = tx.send(event).await;
        }
    }

    pub fn with_status<R>(&self, f: impl FnOnce(&mut JobStatus) -> R) -> R {
        let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Copy of the current status.
    pub fn snapshot(&self) -> JobStatus {
        self.with_status(|status| status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_updates_status_and_forwards() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(JobStatus::new(), Some(tx));
        sink.emit(PipelineEvent::DocumentFailed {
            document_id: "d1".to_string(),
            error: "bad pdf".to_string(),
        })
        .await;

        assert_eq!(sink.snapshot().documents_failed, 1);
        assert!(matches!(
            rx.recv().await,
            Some(PipelineEvent::DocumentFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_listener_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = EventSink::new(JobStatus::new(), Some(tx));
        sink.emit(PipelineEvent::JobHalted {
            reason: "timeout".to_string(),
        })
        .await;
        assert_eq!(sink.snapshot().halted_by.as_deref(), Some("timeout"));
    }
}
