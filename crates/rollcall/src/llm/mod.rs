//! AI Gateway: rate-limited, retrying access to the vision model.
//!
//! The gateway owns the process-wide [`RateBudget`](crate::rate_limit::RateBudget)
//! and wraps every endpoint call in the retry policy. Nothing else about a
//! call survives it.

mod endpoint;
mod gateway;
mod gemini;
pub mod parse;
pub mod prompts;
mod retry;

pub use endpoint::{EndpointError, InferenceEndpoint, InferencePayload, InlineImage};
pub use gateway::{AiGateway, CallKind, ExtractionResponse};
pub use gemini::GeminiEndpoint;
pub use retry::{with_retry, RetryPolicy};
