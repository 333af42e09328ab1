//! Bounded retry for calls to external collaborators.

use docent_core::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Run `op` until it succeeds or the policy runs out of attempts.
///
/// Sleeps `base_delay * 2^(attempt-1)` between failures and returns the
/// last error once attempts are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.allows_retry_after(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    op_name, attempt, policy.max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("{} failed after {} attempts: {}", op_name, attempt, e);
                return Err(e);
            }
        }
    }
}
