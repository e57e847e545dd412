//! Data models for documents, pages and extracted attendee records.

mod document;
mod page;
mod record;

pub use document::{CaseId, Document, DocumentKind};
pub use page::{Page, PageLabel};
pub use record::{
    CaseContext, CaseResult, ClassifiedRecord, CredentialAlias, CredentialEntry, ExtractionRecord,
    MatchMethod, OrganizationId, PageRef,
};
