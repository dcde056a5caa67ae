use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempt-indexed backoff: the n-th retry waits `delays[n]`, and once the
/// list is exhausted the last error is returned.
///
/// # Examples
///
/// ```
/// use gaugemon_common::retry::RetrySchedule;
/// use std::time::Duration;
///
/// let schedule = RetrySchedule::default();
/// assert_eq!(schedule.max_retries(), 3);
/// assert_eq!(schedule.delay_for(1), Some(Duration::from_secs(3)));
/// assert_eq!(schedule.delay_for(3), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(5),
        ])
    }
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: usize) -> Option<Duration> {
        self.delays.get(retry).copied()
    }

    /// Runs `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the schedule runs out.
    ///
    /// `op` receives the 0-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0usize;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !is_retryable(&err) {
                return Err(err);
            }
            let Some(delay) = self.delay_for(attempt) else {
                return Err(err);
            };
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
