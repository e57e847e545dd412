//! Batch pipeline services.
//!
//! [`PageExtractionStage`] turns documents into labelled pages,
//! [`OcrExtractionStage`] turns signin pages into classified records and
//! [`BatchJob`] runs both, then aggregates and exports.

mod batch;
mod ocr_extraction;
mod page_cache;
mod page_extraction;

pub use batch::{BatchJob, Collaborators, JobReport};
pub use ocr_extraction::{OcrExtractionOutput, OcrExtractionStage};
pub use page_cache::{file_sha256, CachedPages, PageCache};
pub use page_extraction::{PageExtractionOutput, PageExtractionStage};
