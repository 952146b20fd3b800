use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            delay,
        }
    }
}

/// Calls `f` until it succeeds or `policy.max_attempts` calls have failed,
/// sleeping `policy.delay` between attempts. Returns the last error.
///
/// At least one attempt is always made, even when `max_attempts` is zero.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                debug!("attempt {}/{} failed: {}, retrying", attempt, attempts, e);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
