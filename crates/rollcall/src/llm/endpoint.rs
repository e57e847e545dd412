//! Endpoint abstraction for the remote vision model.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a single endpoint request.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("endpoint not configured: {0}")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    Failed(String),
}

/// Image sent inline with a request.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            data,
        }
    }

    /// Read an image file, guessing the mime type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let mime_type = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            _ => "image/png",
        };
        Ok(Self {
            mime_type: mime_type.to_string(),
            data,
        })
    }
}

/// Prompt plus images for one request.
#[derive(Debug, Clone)]
pub struct InferencePayload {
    pub prompt: String,
    pub images: Vec<InlineImage>,
}

impl InferencePayload {
    pub fn new(prompt: impl Into<String>, images: Vec<InlineImage>) -> Self {
        Self {
            prompt: prompt.into(),
            images,
        }
    }
}

/// A remote model that turns a payload into text.
#[async_trait]
pub trait InferenceEndpoint: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether the endpoint has what it needs (e.g. an API key).
    fn is_configured(&self) -> bool {
        true
    }

    /// Send one request. No retries happen here.
    async fn generate(&self, payload: &InferencePayload) -> Result<String, EndpointError>;
}
