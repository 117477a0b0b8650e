//! Bounded retry-until-timeout polling for DOM queries.
//!
//! The page object never sleeps blindly: every lookup goes through
//! [`poll_until`], which re-runs a check at `poll_interval` until it reports
//! [`Check::Ready`] or the operation timeout elapses. A check that itself
//! hangs is cut off by the same deadline and surfaces as
//! [`E2eError::Timeout`].

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::trace;

use crate::error::{E2eError, E2eResult};

/// Default per-operation timeout, matching the usual 4s command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);

/// Default poll interval between checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Maximum time one page operation may take.
    pub timeout: Duration,

    /// Delay between two checks.
    pub poll_interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T, P> {
    /// Condition satisfied.
    Ready(T),
    /// Not yet; carries the last observation so callers can build a precise
    /// error if the deadline passes.
    Pending(P),
}

/// Re-run `check` until it is ready or `config.timeout` elapses.
///
/// Returns the last `Pending` observation on expiry instead of an error, so
/// each caller maps expiry to its own error kind (missing element, index out
/// of range, empty collection). Driver errors are returned immediately.
pub async fn poll_until<T, P, F, Fut>(
    config: WaitConfig,
    operation: &str,
    mut check: F,
) -> E2eResult<Check<T, P>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Check<T, P>>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(config.poll_interval);

        let outcome = timeout(budget, check()).await.map_err(|_| E2eError::Timeout {
            operation: operation.to_string(),
            timeout: config.timeout,
        })??;

        match outcome {
            Check::Ready(value) => return Ok(Check::Ready(value)),
            pending @ Check::Pending(_) => {
                if Instant::now() >= deadline {
                    trace!("{} still pending after {} attempt(s)", operation, attempts);
                    return Ok(pending);
                }
            }
        }

        sleep(config.poll_interval).await;
    }
}
