//! Sliding-window request budget.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Caps how many requests start within any window of `window` length.
///
/// Callers over budget sleep until the oldest request leaves the window.
#[derive(Debug)]
pub struct RateBudget {
    capacity: usize,
    window: Duration,
    started: Mutex<VecDeque<Instant>>,
}

impl RateBudget {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            started: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests as usize, Duration::from_secs(60))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until a request may start, then record it.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let begin = Instant::now();
        loop {
            let wait = {
                let mut started = self.started.lock().await;
                let now = Instant::now();
                while started
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    started.pop_front();
                }

                if started.len() < self.capacity {
                    started.push_back(now);
                    let waited = now.duration_since(begin);
                    if waited > Duration::ZERO {
                        tracing::debug!(waited_ms = waited.as_millis() as u64, "Rate budget wait over");
                    }
                    return waited;
                }

                match started.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests currently counted against the window.
    pub async fn in_window(&self) -> usize {
        let started = self.started.lock().await;
        let now = Instant::now();
        started
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_under_budget_does_not_wait() {
        let budget = RateBudget::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(budget.acquire().await, Duration::ZERO);
        }
        assert_eq!(budget.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_budget_waits_for_window() {
        let budget = RateBudget::new(2, Duration::from_secs(60));
        budget.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        budget.acquire().await;

        let waited = budget.acquire().await;
        assert!(waited >= Duration::from_secs(50));
        assert!(waited < Duration::from_secs(51));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_capacity() {
        let budget = Arc::new(RateBudget::new(4, Duration::from_secs(60)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let budget = budget.clone();
            handles.push(tokio::spawn(async move {
                budget.acquire().await;
                Instant::now().duration_since(start)
            }));
        }

        let mut offsets = Vec::new();
        for handle in handles {
            offsets.push(handle.await.unwrap());
        }
        offsets.sort();

        for (i, offset) in offsets.iter().enumerate() {
            let in_window = offsets
                .iter()
                .filter(|o| **o >= *offset && **o < *offset + Duration::from_secs(60))
                .count();
            assert!(in_window <= 4, "window starting at call {} has {} calls", i, in_window);
        }
        assert!(offsets[9] >= Duration::from_secs(120));
    }
}
