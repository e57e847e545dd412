//! Job status counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PipelineEvent, Stage};

/// Most recent errors kept on the status.
const MAX_RECENT_ERRORS: usize = 50;

/// Overall state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    /// Finished with usable output, possibly with some failures.
    Completed,
    /// Finished without producing any usable output.
    Failed,
}

/// Snapshot of a batch job's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: JobState,
    pub stage: Option<Stage>,
    pub documents_found: u64,
    pub documents_processed: u64,
    pub documents_failed: u64,
    pub documents_cached: u64,
    pub pages_found: u64,
    pub signin_pages: u64,
    pub pages_processed: u64,
    pub pages_failed: u64,
    pub classification_batches_failed: u64,
    pub records: u64,
    pub cases_exported: u64,
    pub exports_failed: u64,
    /// Why the job stopped early, if it did.
    pub halted_by: Option<String>,
    pub recent_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStatus {
    pub fn new() -> Self {
        Self {
            job_id: Uuid::new_v4(),
            state: JobState::Running,
            stage: None,
            documents_found: 0,
            documents_processed: 0,
            documents_failed: 0,
            documents_cached: 0,
            pages_found: 0,
            signin_pages: 0,
            pages_processed: 0,
            pages_failed: 0,
            classification_batches_failed: 0,
            records: 0,
            cases_exported: 0,
            exports_failed: 0,
            halted_by: None,
            recent_errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Total failures of any kind.
    pub fn failures(&self) -> u64 {
        self.documents_failed + self.pages_failed + self.exports_failed
    }

    fn record_error(&mut self, message: String) {
        if self.recent_errors.len() >= MAX_RECENT_ERRORS {
            self.recent_errors.remove(0);
        }
        self.recent_errors.push(message);
    }

    /// Fold one event into the counters.
    pub fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { stage, total_items } => {
                self.stage = Some(*stage);
                if *stage == Stage::PageExtraction {
                    self.documents_found = *total_items;
                }
            }
            PipelineEvent::DocumentStarted { .. } => {}
            PipelineEvent::DocumentCompleted {
                pages,
                signin_pages,
                from_cache,
                ..
            } => {
                self.documents_processed += 1;
                self.pages_found += u64::from(*pages);
                self.signin_pages += u64::from(*signin_pages);
                if *from_cache {
                    self.documents_cached += 1;
                }
            }
            PipelineEvent::DocumentFailed { document_id, error } => {
                self.documents_failed += 1;
                self.record_error(format!("{}: {}", document_id, error));
            }
            PipelineEvent::ClassificationBatchFailed {
                document_id,
                batch,
                error,
            } => {
                self.classification_batches_failed += 1;
                self.record_error(format!("{} batch {}: {}", document_id, batch, error));
            }
            PipelineEvent::PageState { .. } => {}
            PipelineEvent::PageCompleted { records, .. } => {
                self.pages_processed += 1;
                self.records += *records as u64;
            }
            PipelineEvent::PageFailed { page, error } => {
                self.pages_failed += 1;
                self.record_error(format!("{}: {}", page, error));
            }
            PipelineEvent::CaseExported { .. } => {
                self.cases_exported += 1;
            }
            PipelineEvent::ExportFailed { case_id, error } => {
                self.exports_failed += 1;
                self.record_error(format!("case {}: {}", case_id, error));
            }
            PipelineEvent::JobHalted { reason } => {
                if self.halted_by.is_none() {
                    self.halted_by = Some(reason.clone());
                }
            }
            PipelineEvent::StageCompleted { .. } => {}
        }
    }

    /// Set the final state: failed if work failed or the job was halted, and
    /// nothing usable came out.
    pub fn finish(&mut self) {
        let had_failures =
            self.documents_failed + self.pages_failed > 0 || self.halted_by.is_some();
        self.state = if had_failures && self.pages_processed == 0 {
            JobState::Failed
        } else {
            JobState::Completed
        };
        self.stage = None;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageRef;

    fn page(i: u32) -> PageRef {
        PageRef {
            document_id: "d".to_string(),
            index: i,
        }
    }

    #[test]
    fn test_counts_follow_events() {
        let mut status = JobStatus::new();
        status.apply(&PipelineEvent::StageStarted {
            stage: Stage::PageExtraction,
            total_items: 3,
        });
        status.apply(&PipelineEvent::DocumentCompleted {
            document_id: "d".to_string(),
            pages: 4,
            signin_pages: 2,
            from_cache: false,
        });
        status.apply(&PipelineEvent::PageCompleted {
            page: page(1),
            records: 5,
        });
        status.apply(&PipelineEvent::PageFailed {
            page: page(2),
            error: "boom".to_string(),
        });

        assert_eq!(status.documents_found, 3);
        assert_eq!(status.pages_found, 4);
        assert_eq!(status.signin_pages, 2);
        assert_eq!(status.pages_processed, 1);
        assert_eq!(status.pages_failed, 1);
        assert_eq!(status.records, 5);
        assert_eq!(status.recent_errors, vec!["d#2: boom".to_string()]);

        status.finish();
        assert_eq!(status.state, JobState::Completed);
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_no_usable_output_is_failed() {
        let mut status = JobStatus::new();
        status.apply(&PipelineEvent::StageStarted {
            stage: Stage::PageExtraction,
            total_items: 1,
        });
        status.apply(&PipelineEvent::DocumentFailed {
            document_id: "d".to_string(),
            error: "render".to_string(),
        });
        status.finish();
        assert_eq!(status.state, JobState::Failed);
    }

    #[test]
    fn test_empty_job_completes() {
        let mut status = JobStatus::new();
        status.finish();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.failures(), 0);
    }

    #[test]
    fn test_halt_without_output_is_failed() {
        let mut status = JobStatus::new();
        status.apply(&PipelineEvent::JobHalted {
            reason: "memory use 99.0% above 90.0%".to_string(),
        });
        status.finish();
        assert_eq!(status.state, JobState::Failed);
    }

    #[test]
    fn test_halt_after_output_completes() {
        let mut status = JobStatus::new();
        status.apply(&PipelineEvent::PageCompleted {
            page: page(1),
            records: 2,
        });
        status.apply(&PipelineEvent::JobHalted {
            reason: "timeout".to_string(),
        });
        status.finish();
        assert_eq!(status.state, JobState::Completed);
    }

    #[test]
    fn test_first_halt_reason_wins() {
        let mut status = JobStatus::new();
        status.apply(&PipelineEvent::JobHalted {
            reason: "timeout".to_string(),
        });
        status.apply(&PipelineEvent::JobHalted {
            reason: "memory".to_string(),
        });
        assert_eq!(status.halted_by.as_deref(), Some("timeout"));
    }
}
