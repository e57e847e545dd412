//! Retry middleware around endpoint calls.

use std::future::Future;
use std::time::Duration;

use super::endpoint::EndpointError;
use crate::config::GatewaySettings;
use crate::error::ExternalServiceError;
use crate::rate_limit::backoff_delay;

/// How often and how long to retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts allowed while the endpoint keeps signalling rate limits.
    pub max_rate_limit_attempts: u32,
    /// Retries allowed for any other failure.
    pub max_failure_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            max_rate_limit_attempts: settings.max_rate_limit_attempts,
            max_failure_retries: 1,
            base_delay_ms: settings.base_backoff_ms,
            max_delay_ms: settings.max_backoff_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&GatewaySettings::default())
    }
}

/// Run `call` under `policy`.
///
/// Rate-limit signals back off exponentially (or for the server's
/// Retry-After) until `max_rate_limit_attempts` is used up. Other failures
/// are retried `max_failure_retries` times. On success returns the value and
/// the number of attempts made.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    kind: &'static str,
    context: &str,
    mut call: F,
) -> Result<(T, u32), ExternalServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EndpointError>>,
{
    let mut attempts = 0u32;
    let mut rate_limited = 0u32;
    let mut failures = 0u32;

    loop {
        attempts += 1;
        let err = match call().await {
            Ok(value) => return Ok((value, attempts)),
            Err(err) => err,
        };

        let wait = match &err {
            EndpointError::RateLimited { retry_after } => {
                rate_limited += 1;
                if rate_limited >= policy.max_rate_limit_attempts {
                    return Err(give_up(kind, context, attempts, &err));
                }
                retry_after.unwrap_or_else(|| {
                    backoff_delay(rate_limited - 1, policy.base_delay_ms, policy.max_delay_ms)
                })
            }
            EndpointError::NotConfigured(_) => {
                return Err(give_up(kind, context, attempts, &err));
            }
            EndpointError::Failed(_) => {
                failures += 1;
                if failures > policy.max_failure_retries {
                    return Err(give_up(kind, context, attempts, &err));
                }
                Duration::from_millis(policy.base_delay_ms.min(policy.max_delay_ms))
            }
        };

        tracing::warn!(
            kind,
            context,
            attempt = attempts,
            wait_ms = wait.as_millis() as u64,
            "AI call failed ({}), retrying",
            err
        );
        tokio::time::sleep(wait).await;
    }
}

fn give_up(kind: &'static str, context: &str, attempts: u32, err: &EndpointError) -> ExternalServiceError {
    ExternalServiceError {
        kind,
        context: context.to_string(),
        attempts,
        message: err.to_string(),
    }
}
