//! Bounded re-sending of idempotent collaborator reads.
//!
//! A read is sent again only when it never produced a response: the
//! connection failed or the request timed out. Any response, whatever its
//! status, goes back to the caller untouched. Writes (transfers, metadata,
//! generation, announcements) never come through here, since a resend could
//! repeat a side effect the first attempt already caused.

use std::time::Duration;

/// Re-sends allowed after the first attempt.
const READ_RETRIES: u32 = 3;

/// Pause before the first re-send; doubled before each further one.
const FIRST_PAUSE: Duration = Duration::from_millis(200);

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Send a read to `endpoint`, re-sending on transient transport failures.
pub(crate) async fn retry_send<F, Fut>(endpoint: &str, send: F) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let started = tokio::time::Instant::now();
    let mut pause = FIRST_PAUSE;
    let mut attempt = 1;
    loop {
        match send().await {
            Ok(resp) => {
                if attempt > 1 {
                    tracing::info!(endpoint, attempt, elapsed = ?started.elapsed(), "read answered after re-send");
                }
                return Ok(resp);
            }
            Err(e) if is_transient(&e) && attempt <= READ_RETRIES => {
                tracing::warn!(
                    endpoint,
                    attempt,
                    remaining = READ_RETRIES + 1 - attempt,
                    ?pause,
                    error = %e,
                    "read got no response, re-sending"
                );
                tokio::time::sleep(pause).await;
                pause *= 2;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(
                    endpoint,
                    attempts = attempt,
                    elapsed = ?started.elapsed(),
                    transient = is_transient(&e),
                    error = %e,
                    "read failed"
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unreachable_collaborator_uses_the_whole_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = counting_client();

        let result = retry_send("GET /closed", || {
            calls.fetch_add(1, Ordering::SeqCst);
            // Nothing listens on port 1: connection refused.
            client.get("http://127.0.0.1:1/").send()
        })
        .await;

        assert!(result.unwrap_err().is_connect());
        assert_eq!(calls.load(Ordering::SeqCst), READ_RETRIES + 1);
    }

    #[tokio::test]
    async fn malformed_request_is_not_resent() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = counting_client();

        let result = retry_send("GET /bad", || {
            calls.fetch_add(1, Ordering::SeqCst);
            client.get("not a url").send()
        })
        .await;

        assert!(result.unwrap_err().is_builder());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
