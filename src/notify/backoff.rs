use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("Maximum retry attempts exceeded")]
pub struct MaxRetriesExceeded;

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    /// Delay for the next attempt, `None` once retries are exhausted.
    ///
    /// A server-provided `hint` (e.g. `retry_after`) raises the delay but never
    /// beyond `max_delay`.
    pub fn next_delay(&self, hint: Option<Duration>) -> Option<Duration> {
        if self.current_attempt >= self.max_retries {
            return None;
        }

        let exp = self
            .initial_delay
            .saturating_mul(2_u32.saturating_pow(self.current_attempt));
        let base = hint.map_or(exp, |h| h.max(exp));
        Some(base.min(self.max_delay))
    }

    pub async fn sleep(&mut self, hint: Option<Duration>) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay(hint).ok_or(MaxRetriesExceeded)?;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=50));

        log::warn!(
            "⏳ Retry attempt {} of {} in {:?}",
            self.current_attempt + 1,
            self.max_retries,
            delay
        );

        sleep(delay + jitter).await;
        self.current_attempt += 1;
        Ok(())
    }
}
