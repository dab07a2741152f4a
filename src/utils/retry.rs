use std::future::Future;
use std::time::Duration;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// Used by the subscription registrar: probe the broker until it serves,
// then (re)subscribe until the broker accepts the stream. Both loops are
// unbounded and are cut short from outside by a timeout or a context.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// `None` retries until the caller drops the future
    pub max_attempts: Option<u32>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn unbounded(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier: 2.0,
        }
    }

    /// Sleep schedule between attempts, capped at `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_delay), move |previous| {
            let grown = previous.mul_f64(self.multiplier);
            Some(grown.min(self.max_delay))
        })
    }

    fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Last error once `max_attempts` ran out
    Failed(E),
}

/// Runs `operation` (given the 1-based attempt number) until it succeeds or
/// the attempt budget is spent.
pub async fn retry_with_backoff<F, Fut, T, E>(config: RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delays = config.delays();
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "✅ Succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) => error,
        };

        if !config.allows(attempt) {
            tracing::error!(attempt, error = %error, "❌ Giving up after all attempts");
            return RetryResult::Failed(error);
        }

        let delay = delays.next().unwrap_or(config.max_delay);
        tracing::warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "Retrying after delay");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
