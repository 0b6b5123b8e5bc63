//! Readiness polling with exponential backoff
//!
//! Cloud operations finish asynchronously. Dependents of a resource must not
//! start until the resource reports ready, so the provider polls it here.

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff settings for readiness polling
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Maximum number of probes
    pub max_attempts: u32,

    /// Delay after the first unsuccessful probe
    pub initial_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl WaitConfig {
    /// Delay before probe number `attempt + 1`
    ///
    /// Clamped to `max_delay` before converting back, since the raw
    /// exponential overflows `Duration` after enough attempts.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }

    /// Settings for tests and fakes: many quick probes
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        }
    }
}

impl Default for WaitConfig {
    /// Memorystore instances take several minutes to provision, so the
    /// default budget is roughly half an hour.
    fn default() -> Self {
        Self {
            max_attempts: 90,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.5,
        }
    }
}

/// Poll `probe` until it yields a value
///
/// `probe` returns `Ok(None)` while the target is not ready yet. Errors from
/// the probe abort the wait immediately.
pub async fn wait_until<T, F, Fut>(what: &str, config: &WaitConfig, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 0..config.max_attempts {
        if let Some(value) = probe().await? {
            if attempt > 0 {
                tracing::debug!(target_resource = what, attempts = attempt + 1, "Ready");
            }
            return Ok(value);
        }

        if attempt + 1 < config.max_attempts {
            let delay = config.delay_for_attempt(attempt);
            tracing::debug!(
                target_resource = what,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Not ready yet, waiting"
            );
            sleep(delay).await;
        }
    }

    Err(CloudError::Timeout(format!(
        "{} was not ready after {} attempts",
        what, config.max_attempts
    )))
}
