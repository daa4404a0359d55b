use crate::metrics_defs::RECOGNIZE_RETRIES;
use crate::recognizer::RecognizeError;
use shared::counter;
use std::future::Future;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl Backoff {
    /// Delay before the retry following `attempt` (0-indexed). Doubles per
    /// attempt up to `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1 << attempt.min(16))
            .min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails with an error that is not transient, or
/// runs out of attempts. The last error is returned.
pub async fn retry<T, F, Fut>(backoff: &Backoff, mut op: F) -> Result<T, RecognizeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RecognizeError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt + 1 < backoff.max_attempts => {
                let delay = backoff.delay_after(attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying recognition"
                );
                counter!(RECOGNIZE_RETRIES).increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
