//! Shared pipeline types: progress events, page states, job status and the
//! memory guard.
//!
//! Stages report progress through an [`EventSink`]; the sink folds every
//! event into the job's [`JobStatus`] and forwards it to an optional
//! listener (the CLI progress display).

mod events;
mod guard;
mod state;
mod status;

pub use events::{EventSink, PipelineEvent, Stage};
pub use guard::{parse_meminfo, MemoryProbe, ProcMeminfo, ResourceGuard};
pub use state::{InvalidTransition, PageRun, PageState};
pub use status::{JobState, JobStatus};
