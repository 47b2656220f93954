//! Fixed-attempt retry with linear backoff
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `op` up to `attempts` times. After failed attempt `n` (1-based) the
/// call sleeps `n * base_delay`. Errors rejected by `is_retryable` and the
/// last error are returned as is.
pub async fn retry_linear<T, E, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                let delay = base_delay * attempt;
                warn!("Attempt {}/{} failed: {}; retrying in {:?}", attempt, attempts, e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
