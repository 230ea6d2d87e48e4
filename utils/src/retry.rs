//! Fixed-backoff retry.

use std::future::Future;
use std::time::Duration;

/// Run `action` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the first success, or the error of the last attempt. An
/// `attempts` of zero is treated as one.
pub async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut action: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result: Result<u32, &str> = retry(4, Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 3 { Err("down") } else { Ok(n) } }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry(4, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;
        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_attempts_runs_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), &str> = retry(0, Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
