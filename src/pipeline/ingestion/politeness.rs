use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::common::error::{Result, ScraperError};
use crate::domain::EventSource;
use crate::observability::metrics;

/// Inclusive millisecond range a delay is drawn from on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    pub fn with_floor(self, floor_ms: u64) -> Self {
        let min_ms = self.min_ms.max(floor_ms);
        Self {
            min_ms,
            max_ms: self.max_ms.max(min_ms),
        }
    }
}

/// Pacing rules for one source. Lives in `[sources.<name>.politeness]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// Gap between the end of one fetch and the start of the next.
    pub request_delay: DelayRange,
    /// After every `batch_size` fetches the next one waits `batch_pause` instead.
    pub batch_size: Option<usize>,
    pub batch_pause: DelayRange,
    /// Token-bucket budget, refilled continuously over a minute.
    pub requests_per_min: Option<u64>,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            request_delay: DelayRange::new(800, 2000),
            batch_size: Some(10),
            batch_pause: DelayRange::new(4000, 8000),
            requests_per_min: Some(30),
        }
    }
}

impl PolitenessConfig {
    pub fn unthrottled() -> Self {
        Self {
            request_delay: DelayRange::ZERO,
            batch_size: None,
            batch_pause: DelayRange::ZERO,
            requests_per_min: None,
        }
    }

    /// Raise the per-request delay so consecutive fetches are never closer than `floor`.
    pub fn with_delay_floor(mut self, floor: Duration) -> Self {
        self.request_delay = self.request_delay.with_floor(floor.as_millis() as u64);
        self
    }
}

#[derive(Debug)]
struct PaceState {
    last_fetch: Option<Instant>,
    fetches: u64,
    tokens: f64,
    refilled_at: Instant,
}

/// Serializes and paces every network call made against one source.
///
/// The state mutex is held for the whole fetch, so at most one request per source is
/// ever in flight. Retries are the caller's business.
#[derive(Debug)]
pub struct PolitenessController {
    source: EventSource,
    config: PolitenessConfig,
    state: Mutex<PaceState>,
    completed: AtomicU64,
    cancel: CancellationToken,
}

impl PolitenessController {
    pub fn new(source: EventSource, config: PolitenessConfig, cancel: CancellationToken) -> Self {
        let capacity = config.requests_per_min.unwrap_or(0) as f64;
        Self {
            source,
            config,
            state: Mutex::new(PaceState {
                last_fetch: None,
                fetches: 0,
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
            completed: AtomicU64::new(0),
            cancel,
        }
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    pub fn config(&self) -> &PolitenessConfig {
        &self.config
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetches completed through this controller so far.
    pub fn fetch_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Run one unit of network work once pacing allows it.
    ///
    /// Returns `ScraperError::Cancelled` without running `work` if the run is cancelled
    /// before or while waiting. Work that has started is never interrupted.
    pub async fn run<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ScraperError::Cancelled);
        }

        let mut state = self.state.lock().await;

        let wait = self.next_wait(&state);
        if !wait.is_zero() {
            debug!(source = %self.source, wait_ms = wait.as_millis() as u64, "Politeness wait");
            metrics::sources::politeness_wait(self.source, wait.as_secs_f64());
            self.sleep_or_cancel(wait).await?;
        }
        self.take_request_token(&mut state).await?;

        if self.cancel.is_cancelled() {
            return Err(ScraperError::Cancelled);
        }

        let result = work().await;

        state.last_fetch = Some(Instant::now());
        state.fetches += 1;
        self.completed.fetch_add(1, Ordering::Relaxed);
        result
    }

    fn next_wait(&self, state: &PaceState) -> Duration {
        let Some(last) = state.last_fetch else {
            return Duration::ZERO;
        };
        let batch_done = matches!(
            self.config.batch_size,
            Some(n) if n > 0 && state.fetches % n as u64 == 0
        );
        let target = if batch_done {
            debug!(source = %self.source, fetches = state.fetches, "Batch complete, pausing");
            self.config
                .batch_pause
                .sample()
                .max(self.config.request_delay.sample())
        } else {
            self.config.request_delay.sample()
        };
        target.saturating_sub(last.elapsed())
    }

    async fn take_request_token(&self, state: &mut PaceState) -> Result<()> {
        let Some(rpm) = self.config.requests_per_min.filter(|r| *r > 0) else {
            return Ok(());
        };
        let capacity = rpm as f64;
        let refill_per_sec = capacity / 60.0;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
            state.tokens = (state.tokens + elapsed * refill_per_sec).min(capacity);
            state.refilled_at = now;
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return Ok(());
            }
            let need = (1.0 - state.tokens) / refill_per_sec;
            self.sleep_or_cancel(Duration::from_secs_f64(need.max(0.001)))
                .await?;
        }
    }

    async fn sleep_or_cancel(&self, wait: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(wait) => Ok(()),
            _ = self.cancel.cancelled() => Err(ScraperError::Cancelled),
        }
    }
}
