//! Result Aggregator: groups classified records by case and deduplicates them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::export::Exporter;
use crate::models::{CaseId, CaseResult, ClassifiedRecord};
use crate::pipeline::{EventSink, PipelineEvent, Stage};

/// Group records by case, dropping repeats of (name, standardized credential).
///
/// Records are ordered by source page first, so the record kept for a
/// duplicate is the one from the earliest page. Applying this to its own
/// output changes nothing.
pub fn aggregate(records: impl IntoIterator<Item = ClassifiedRecord>) -> Vec<CaseResult> {
    let mut by_case: BTreeMap<CaseId, Vec<ClassifiedRecord>> = BTreeMap::new();
    for record in records {
        by_case.entry(record.case_id.clone()).or_default().push(record);
    }

    by_case
        .into_iter()
        .map(|(case_id, mut records)| {
            // Stable: keeps sheet order within a page
            records.sort_by(|a, b| a.page.cmp(&b.page));
            let mut seen = HashSet::new();
            records.retain(|r| seen.insert(r.dedup_key()));
            CaseResult { case_id, records }
        })
        .collect()
}

/// Aggregates records and hands each case to an [`Exporter`].
pub struct ResultAggregator {
    exporter: Arc<dyn Exporter>,
}

impl ResultAggregator {
    pub fn new(exporter: Arc<dyn Exporter>) -> Self {
        Self { exporter }
    }

    /// Aggregate and export. Export failures are reported per case and do
    /// not stop the remaining cases.
    pub async fn run(&self, records: Vec<ClassifiedRecord>, events: &EventSink) -> Vec<CaseResult> {
        let results = aggregate(records);
        events
            .emit(PipelineEvent::StageStarted {
                stage: Stage::Aggregation,
                total_items: results.len() as u64,
            })
            .await;

        let mut succeeded = 0;
        let mut failed = 0;
        for result in &results {
            match self.exporter.export(result).await {
                Ok(_) => {
                    succeeded += 1;
                    events
                        .emit(PipelineEvent::CaseExported {
                            case_id: result.case_id.clone(),
                            records: result.records.len(),
                        })
                        .await;
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(case = %result.case_id, "Export failed: {}", e);
                    events
                        .emit(PipelineEvent::ExportFailed {
                            case_id: result.case_id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        events
            .emit(PipelineEvent::StageCompleted {
                stage: Stage::Aggregation,
                succeeded,
                failed,
                skipped: 0,
            })
            .await;
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportError;
    use crate::models::{MatchMethod, OrganizationId, PageRef};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    fn record(case: &str, doc: &str, page: u32, name: &str, cred: &str) -> ClassifiedRecord {
        ClassifiedRecord {
            name: name.to_string(),
            raw_credential: cred.to_string(),
            organization: OrganizationId(1),
            standardized_credential: cred.to_string(),
            classification: "HCP".to_string(),
            match_score: 100,
            method: MatchMethod::ExactCredential,
            case_id: CaseId::new(case),
            page: PageRef {
                document_id: doc.to_string(),
                index: page,
            },
        }
    }

    #[test]
    fn test_dedup_case_insensitive_keeps_earliest_page() {
        let records = vec![
            record("C1", "a", 2, "ada lovelace", "md"),
            record("C1", "a", 1, "ADA LOVELACE", "MD"),
            record("C1", "a", 1, "Grace Hopper", "NP"),
            record("C2", "b", 1, "Ada Lovelace", "MD"),
        ];
        let results = aggregate(records);
        assert_eq!(results.len(), 2);

        let c1 = &results[0];
        assert_eq!(c1.case_id.as_str(), "C1");
        assert_eq!(c1.records.len(), 2);
        assert_eq!(c1.records[0].name, "ADA LOVELACE");
        assert_eq!(c1.records[0].page.index, 1);

        // Same person in another case is kept
        assert_eq!(results[1].records.len(), 1);
    }

    #[test]
    fn test_same_name_different_credential_kept() {
        let results = aggregate(vec![
            record("C1", "a", 1, "Ada", "MD"),
            record("C1", "a", 1, "Ada", "DO"),
        ]);
        assert_eq!(results[0].records.len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let records = vec![
            record("C1", "b", 1, "x", "MD"),
            record("C1", "a", 3, "X", "md"),
            record("C2", "c", 1, "y", "NP"),
            record("C1", "a", 3, "z", "RN"),
        ];
        let once = aggregate(records);
        let twice = aggregate(once.iter().flat_map(|c| c.records.clone()));
        assert_eq!(once, twice);
    }

    struct Collecting(Mutex<Vec<String>>);

    #[async_trait]
    impl Exporter for Collecting {
        async fn export(&self, result: &CaseResult) -> Result<String, ExportError> {
            if result.case_id.as_str() == "bad" {
                return Err(ExportError::Io {
                    path: "bad".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.0.lock().await.push(result.case_id.to_string());
            Ok(result.case_id.to_string())
        }
    }

    #[tokio::test]
    async fn test_run_exports_each_case_and_counts_failures() {
        let exporter = Arc::new(Collecting(Mutex::new(Vec::new())));
        let events = EventSink::detached();
        let results = ResultAggregator::new(exporter.clone())
            .run(
                vec![record("ok", "a", 1, "x", "MD"), record("bad", "b", 1, "y", "MD")],
                &events,
            )
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(*exporter.0.lock().await, vec!["ok".to_string()]);
        let status = events.snapshot();
        assert_eq!(status.cases_exported, 1);
        assert_eq!(status.exports_failed, 1);
    }
}
