use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Failures that may succeed when the same call is repeated.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff: wait `initial_delay`, then double it after every retry.
///
/// The delay has no ceiling, keep `max_retries` small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Overall budget measured from the first attempt. A retry whose wait
    /// would cross it is not attempted.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of retries. The last error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let started = Instant::now();
    let mut delay = policy.initial_delay;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operacion completada en el intento {attempt}");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let retries_used = attempt - 1;
        if retries_used >= policy.max_retries {
            warn!("Reintentos agotados tras {attempt} intento(s): {error}");
            return Err(error);
        }
        if !error.is_retryable() {
            debug!("Error no reintentable en el intento {attempt}: {error}");
            return Err(error);
        }
        if let Some(deadline) = policy.deadline
            && started.elapsed() + delay > deadline
        {
            warn!("El siguiente reintento excede el plazo de {deadline:?}: {error}");
            return Err(error);
        }

        warn!(
            "Error transitorio en el intento {attempt}, reintentando en {} ms: {error}",
            delay.as_millis()
        );
        sleep(delay).await;
        delay = delay.saturating_mul(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    };

    #[derive(Debug)]
    struct HttpFailure(u16);

    impl Display for HttpFailure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "HTTP {}", self.0)
        }
    }

    impl Retryable for HttpFailure {
        fn is_retryable(&self) -> bool {
            self.0 == 429 || !(400..500).contains(&self.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_with_doubling_waits() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        let result = with_retry(RetryPolicy::default(), || {
            let attempts = Arc::clone(&attempts);
            async move {
                let mut attempts = attempts.lock().unwrap();
                attempts.push(started.elapsed());
                if attempts.len() < 3 {
                    Err(HttpFailure(503))
                } else {
                    Ok("listo")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "listo");
        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 3);
        assert!(attempts[1] - attempts[0] >= Duration::from_millis(1000));
        assert!(attempts[2] - attempts[1] >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_propagate_without_retry() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = with_retry(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HttpFailure(404)) }
        })
        .await;

        assert_eq!(result.unwrap_err().0, 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_calls_are_retried() {
        let calls = AtomicU32::new(0);

        let result = with_retry(RetryPolicy::new(3, Duration::from_millis(10)), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(HttpFailure(429))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries_with_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(RetryPolicy::new(2, Duration::from_millis(5)), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(HttpFailure(500 + call as u16)) }
        })
        .await;

        assert_eq!(result.unwrap_err().0, 502);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_retries_early() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1000)).with_deadline(Duration::from_millis(2500));

        let result: Result<(), _> = with_retry(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HttpFailure(503)) }
        })
        .await;

        assert!(result.is_err());
        // 0ms, then 1000ms; the 2000ms wait would end at 3000ms.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
