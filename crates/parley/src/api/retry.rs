//! Retry with exponential backoff, an upper delay bound, and cancellation.
//!
//! [`with_retry`] re-runs any async operation until it succeeds or
//! `max_attempts` attempts have failed, waiting `d, 2d, 4d, …` between
//! attempts. The last error is returned exactly as the operation produced
//! it. Waits go through a [`Sleeper`] so tests can observe the schedule
//! without real time passing.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first (0 is treated as 1).
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 doubles the wait after every failure).
    pub multiplier: f64,
    /// Scale each wait into `[0.5, 1.0] × delay` to spread concurrent retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of attempts. Uses sensible defaults.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// No retries: a single attempt.
    pub fn none() -> Self {
        Self::with_attempts(1)
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Effective attempt budget.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculate the wait after failed attempt `attempt` (0-indexed).
    ///
    /// Never panics: negative growth clamps to zero and waits too large for a
    /// `Duration` fall back to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);

        let secs = if self.jitter {
            // Deterministic per-attempt factor; keeps the crate free of an RNG.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            capped * jitter_factor
        } else {
            capped
        };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

// ── Sleeping ───────────────────────────────────────────────────────

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Source of delays for retry and reconnect loops.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Real delays on the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Fake clock that records every requested delay and returns immediately.
///
/// Clones share the same record, so a test can keep one handle and give
/// another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        Box::pin(tokio::task::yield_now())
    }
}

// ── Retry loops ────────────────────────────────────────────────────

/// Retry `operation` on every failure.
///
/// Returns the first success, or the error from the final attempt
/// unchanged. Cancelling `cancel` stops the loop during a wait and returns
/// the most recent error.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_using(config, &TokioSleeper, cancel, |_| true, operation).await
}

/// Like [`with_retry`], but stops as soon as `should_retry` rejects an error.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    should_retry: P,
    operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    with_retry_using(config, &TokioSleeper, cancel, should_retry, operation).await
}

/// The general retry loop, with an explicit [`Sleeper`].
pub async fn with_retry_using<T, E, F, Fut, P>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = config.attempts();
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= attempts || !should_retry(&e) || cancel.is_cancelled() {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                warn!("Attempt {attempt}/{attempts} failed: {e}. Retrying in {delay:?}...");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Retry cancelled after {attempt} attempt(s)");
                        return Err(e);
                    }
                    _ = sleeper.sleep(delay) => {}
                }
            }
        }
    }
}
