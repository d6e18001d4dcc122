use std::time::Duration;

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Exponential backoff capped at 30s; `Retry-After` wins when larger than the base.
pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(30_000))
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Extracts the `message` field of a GitHub error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    use super::{error_message, is_retryable_status, parse_retry_after, retry_delay};

    #[test]
    fn unit_parse_retry_after_reads_whole_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn unit_retry_delay_backs_off_and_caps() {
        assert_eq!(retry_delay(100, 1, None), Duration::from_millis(100));
        assert_eq!(retry_delay(100, 4, None), Duration::from_millis(800));
        assert_eq!(retry_delay(5_000, 9, None), Duration::from_millis(30_000));
        assert_eq!(
            retry_delay(500, 2, Some(Duration::from_millis(10))),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn unit_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(502));
        assert!(!is_retryable_status(405));
    }

    #[test]
    fn unit_error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"message":"Base branch was modified. Review and try the merge again."}"#),
            "Base branch was modified. Review and try the merge again."
        );
        assert_eq!(error_message(" plain text "), "plain text");
    }
}
