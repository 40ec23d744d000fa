//! Throttling retry wrapper for remote calls.

use std::future::Future;
use std::time::Duration;

use funcdeploy_protocol::RemoteError;
use tracing::warn;

use crate::log::CallLog;

/// Backoff configuration for rate-limited calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based), with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }
}

/// Runs `op`, retrying the identical call while the platform throttles it.
///
/// `call` is the `service.method` name logged on every attempt. Throttling
/// errors are retried up to `policy.max_attempts` in total and the last one
/// is returned unchanged; every other error is returned on first occurrence.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    log: &dyn CallLog,
    call: &str,
    mut op: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let (service, method) = call.split_once('.').unwrap_or((call, ""));
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        log.log_api_call(service, method);

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_throttling() && attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                log.log_retry(call, attempt, delay);
                warn!(
                    call,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate-limited by the platform, waiting before retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if err.is_throttling() {
                    warn!(call, attempts = attempt, "still rate-limited, giving up");
                }
                return Err(err);
            }
        }
    }
}
