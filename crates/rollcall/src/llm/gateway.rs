//! The AI Gateway: one entry point for every model call.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::endpoint::{InferenceEndpoint, InferencePayload, InlineImage};
use super::parse::{parse_extraction, parse_page_labels};
use super::prompts::classification_prompt;
use super::retry::{with_retry, RetryPolicy};
use crate::error::ExternalServiceError;
use crate::models::{ExtractionRecord, OrganizationId, PageLabel};
use crate::rate_limit::RateBudget;

/// What a call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Classify,
    Extract,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Extract => "extract",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records and sponsor read from one signin page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResponse {
    pub records: Vec<ExtractionRecord>,
    pub organization: OrganizationId,
    /// False when the reply named no sponsor and the default was used.
    pub organization_found: bool,
}

/// Rate-limited, retrying access to an [`InferenceEndpoint`].
///
/// Cheap to clone; clones share the endpoint and the rate budget.
#[derive(Clone)]
pub struct AiGateway {
    endpoint: Arc<dyn InferenceEndpoint>,
    budget: Arc<RateBudget>,
    policy: RetryPolicy,
}

impl AiGateway {
    pub fn new(
        endpoint: Arc<dyn InferenceEndpoint>,
        budget: Arc<RateBudget>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            endpoint,
            budget,
            policy,
        }
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.name()
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    /// Send a payload and return the raw reply text.
    ///
    /// Every attempt, including retries, draws from the shared rate budget.
    pub async fn invoke(
        &self,
        payload: &InferencePayload,
        kind: CallKind,
        context: &str,
    ) -> Result<String, ExternalServiceError> {
        let started = Instant::now();
        let result = with_retry(&self.policy, kind.as_str(), context, || async {
            self.budget.acquire().await;
            self.endpoint.generate(payload).await
        })
        .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok((text, attempts)) => {
                tracing::info!(
                    kind = kind.as_str(),
                    context,
                    endpoint = self.endpoint.name(),
                    latency_ms,
                    attempts,
                    outcome = "ok",
                    "AI call completed"
                );
                Ok(text)
            }
            Err(err) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    context,
                    endpoint = self.endpoint.name(),
                    latency_ms,
                    attempts = err.attempts,
                    outcome = "failed",
                    "AI call failed: {}",
                    err.message
                );
                Err(err)
            }
        }
    }

    /// Classify a batch of page images in one call, in order.
    pub async fn classify_pages(
        &self,
        images: Vec<InlineImage>,
        context: &str,
    ) -> Result<Vec<PageLabel>, ExternalServiceError> {
        let count = images.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        let payload = InferencePayload::new(classification_prompt(count), images);
        let text = self.invoke(&payload, CallKind::Classify, context).await?;

        parse_page_labels(&text, count).map_err(|message| ExternalServiceError {
            kind: CallKind::Classify.as_str(),
            context: context.to_string(),
            attempts: 1,
            message: format!("unusable reply: {}", message),
        })
    }

    /// Read name/credential rows from one preprocessed signin page.
    pub async fn extract(
        &self,
        image: InlineImage,
        prompt: String,
        default_organization: OrganizationId,
        context: &str,
    ) -> Result<ExtractionResponse, ExternalServiceError> {
        let payload = InferencePayload::new(prompt, vec![image]);
        let text = self.invoke(&payload, CallKind::Extract, context).await?;

        let parsed = parse_extraction(&text);
        let organization = parsed.organization.unwrap_or(default_organization);
        if parsed.organization.is_none() {
            tracing::debug!(context, default = %default_organization, "No sponsor in reply, using default");
        }

        Ok(ExtractionResponse {
            records: parsed
                .rows
                .into_iter()
                .map(|(name, raw_credential)| ExtractionRecord {
                    name,
                    raw_credential,
                    organization,
                })
                .collect(),
            organization,
            organization_found: parsed.organization.is_some(),
        })
    }
}
