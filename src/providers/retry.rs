use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const RATE_LIMIT_MAX_RETRIES: usize = 5;
pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(2);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(60);

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let code = status.as_u16();
    if code == 529 || code == 503 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// Sleeps for the larger of `delay` and the server's retry-after hint and
/// returns the delay to use next time.
pub(crate) async fn wait_with_backoff(
    provider: &str,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let wait = retry_after.map_or(delay, |hint| hint.max(delay));
    warn!(
        "{} rate limited; retrying in {:.1}s (attempt {}/{})",
        provider,
        wait.as_secs_f32(),
        attempt,
        RATE_LIMIT_MAX_RETRIES
    );
    sleep(wait).await;
    next_delay(delay)
}

pub(crate) fn next_delay(current: Duration) -> Duration {
    current
        .saturating_mul(2)
        .clamp(RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn detects_rate_limits_by_status_and_body() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_rate_limited(StatusCode::SERVICE_UNAVAILABLE, ""));
        assert!(is_rate_limited(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"type":"rate_limit_error"}}"#
        ));
        assert!(!is_rate_limited(StatusCode::BAD_REQUEST, "model_not_found"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_delay(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(next_delay(Duration::from_secs(0)), RATE_LIMIT_BASE_DELAY);
        assert_eq!(next_delay(Duration::from_secs(45)), RATE_LIMIT_MAX_DELAY);
    }

    #[test]
    fn reads_numeric_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static(" 7 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
    }
}
