//! Memory guard for document intake.

use std::sync::Arc;
use std::time::Duration;

use crate::config::BatchSettings;
use crate::error::MemoryPressureError;

/// Source of the current memory use.
pub trait MemoryProbe: Send + Sync {
    /// Percent of memory in use, or `None` if it cannot be measured.
    fn used_percent(&self) -> Option<f32>;
}

/// Reads `/proc/meminfo`. Reports nothing on systems without it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMeminfo;

impl MemoryProbe for ProcMeminfo {
    fn used_percent(&self) -> Option<f32> {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&text)
    }
}

/// Percent used from `/proc/meminfo` contents (MemTotal vs MemAvailable).
pub fn parse_meminfo(text: &str) -> Option<f32> {
    let field = |name: &str| -> Option<u64> {
        text.lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some(100.0 * total.saturating_sub(available) as f32 / total as f32)
}

/// Pauses intake while memory use is above the limit.
#[derive(Clone)]
pub struct ResourceGuard {
    probe: Arc<dyn MemoryProbe>,
    limit_percent: f32,
    max_pause: Duration,
    poll: Duration,
}

impl ResourceGuard {
    pub fn new(probe: Arc<dyn MemoryProbe>, settings: &BatchSettings) -> Self {
        Self {
            probe,
            limit_percent: settings.max_memory_percent,
            max_pause: Duration::from_secs(settings.memory_pause_secs),
            poll: Duration::from_secs(settings.memory_poll_secs.max(1)),
        }
    }

    pub fn from_settings(settings: &BatchSettings) -> Self {
        Self::new(Arc::new(ProcMeminfo), settings)
    }

    /// Return once memory is under the limit, or fail after the pause window.
    pub async fn wait_for_capacity(&self) -> Result<(), MemoryPressureError> {
        let mut waited = Duration::ZERO;
        loop {
            let used = match self.probe.used_percent() {
                Some(used) => used,
                None => return Ok(()),
            };
            if used <= self.limit_percent {
                if waited > Duration::ZERO {
                    tracing::info!(used_percent = used, waited_secs = waited.as_secs(), "Memory recovered, resuming intake");
                }
                return Ok(());
            }
            if waited >= self.max_pause {
                return Err(MemoryPressureError {
                    used_percent: used,
                    limit_percent: self.limit_percent,
                    waited,
                });
            }
            tracing::warn!(
                used_percent = used,
                limit_percent = self.limit_percent,
                "Memory above limit, pausing intake"
            );
            tokio::time::sleep(self.poll).await;
            waited += self.poll;
        }
    }
}
