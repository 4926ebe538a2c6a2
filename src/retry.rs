//! Response classification and retry decisions.
//!
//! Every HTTP attempt produces a [`ResponseEnvelope`]; [`classify`] maps it
//! to a [`RetryDecision`] that names the typed error (if any), whether the
//! attempt is worth repeating, and how long to wait first. The decision is a
//! pure function of the envelope and the attempt number, so the policy table
//! can be tested without a server.

use crate::error::{ApiMessage, Error, ServerError, UsageError};
use http::{HeaderMap, StatusCode};
use std::time::{Duration, SystemTime};

/// Transport-level failure observed while executing an attempt, before any
/// HTTP status was available.
#[derive(Debug, Clone)]
pub(crate) enum TransportError {
    /// The attempt timed out waiting for the response.
    ReadTimeout(String),
    /// The host could not be reached.
    Connection(String),
}

impl TransportError {
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        eprintln!("DBG from_reqwest: is_timeout={} is_connect={} err={:?}", err.is_timeout(), err.is_connect(), err);
        if err.is_timeout() {
            TransportError::ReadTimeout(err.to_string())
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

/// Everything one HTTP attempt produced. Consumed by [`classify`] and
/// discarded.
#[derive(Debug)]
pub(crate) struct ResponseEnvelope {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: String,
    pub transport: Option<TransportError>,
}

impl ResponseEnvelope {
    pub(crate) fn from_transport(transport: TransportError) -> Self {
        ResponseEnvelope {
            status: None,
            headers: HeaderMap::new(),
            body: String::new(),
            transport: Some(transport),
        }
    }
}

/// The classifier's verdict for one attempt.
#[derive(Debug)]
pub(crate) struct RetryDecision {
    /// The typed error, or `None` when the attempt succeeded.
    pub error: Option<Error>,
    pub should_retry: bool,
    /// How long to wait before the next attempt, when retrying.
    pub wait: Option<Duration>,
}

impl RetryDecision {
    fn ok() -> Self {
        RetryDecision {
            error: None,
            should_retry: false,
            wait: None,
        }
    }

    fn terminal(error: Error) -> Self {
        RetryDecision {
            error: Some(error),
            should_retry: false,
            wait: None,
        }
    }

    fn retry(error: Error, wait: Duration) -> Self {
        RetryDecision {
            error: Some(error),
            should_retry: true,
            wait: Some(wait),
        }
    }
}

/// Maps one attempt's outcome to (error, should-retry, wait).
///
/// `attempt` is 1-based: the first attempt's failure waits 1 s on the
/// quadratic schedule, the second 4 s, and so on.
pub(crate) fn classify(envelope: &ResponseEnvelope, attempt: usize) -> RetryDecision {
    if let Some(transport) = &envelope.transport {
        return match transport {
            TransportError::ReadTimeout(msg) => RetryDecision::retry(
                Error::ReadTimeout(msg.clone()),
                quadratic_backoff(attempt),
            ),
            // An unreachable host is not worth hammering within one call.
            TransportError::Connection(msg) => {
                RetryDecision::terminal(Error::Connection(msg.clone()))
            }
        };
    }

    let status = match envelope.status {
        Some(status) => status,
        None => return RetryDecision::terminal(Error::Connection("no response received".into())),
    };

    if status == StatusCode::OK {
        return RetryDecision::ok();
    }

    let message = ApiMessage::from_body(&envelope.body);
    match status.as_u16() {
        400 => RetryDecision::terminal(UsageError::BadRequest(message).into()),
        401 => {
            // A stale cached token earns exactly one retry; a second 401
            // means the credential itself is bad.
            let error = UsageError::Unauthorized(message).into();
            if attempt < 2 {
                RetryDecision::retry(error, Duration::ZERO)
            } else {
                RetryDecision::terminal(error)
            }
        }
        403 => RetryDecision::terminal(UsageError::Forbidden(message).into()),
        404 => RetryDecision::terminal(UsageError::NotFound(message).into()),
        409 => RetryDecision::terminal(UsageError::Conflict(message).into()),
        429 => {
            let error = UsageError::TooManyRequests(message).into();
            match retry_after(&envelope.headers) {
                Some(wait) => RetryDecision::retry(error, wait),
                None => RetryDecision::terminal(error),
            }
        }
        500 => RetryDecision::retry(
            ServerError::InternalServerError(message).into(),
            quadratic_backoff(attempt),
        ),
        503 => RetryDecision::retry(
            ServerError::ServiceUnavailable(message).into(),
            quadratic_backoff(attempt),
        ),
        // Gateway timeouts tend to need more recovery time than plain 5xx.
        504 => RetryDecision::retry(
            ServerError::GatewayTimeout(message).into(),
            quadratic_backoff(attempt) + Duration::from_secs(9),
        ),
        other => RetryDecision::terminal(Error::Unexpected {
            status: other,
            message,
        }),
    }
}

/// Quadratic backoff: 1 s, 4 s, 9 s, 16 s, ...
fn quadratic_backoff(attempt: usize) -> Duration {
    let attempt = attempt as u64;
    Duration::from_secs(attempt.saturating_mul(attempt))
}

/// Exponential backoff for stream reconnects: 1 s, 2 s, 4 s, 8 s, ...
///
/// Growth is uncapped; the caller bounds the retry count instead.
pub(crate) fn exponential_backoff(nth_retry: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(nth_retry))
}

/// Parses the Retry-After header.
///
/// Supports both delta-seconds and HTTP-date formats.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = httpdate::parse_http_date(header) {
        if let Ok(until) = date.duration_since(SystemTime::now()) {
            return Some(until);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn envelope(status: u16, body: &str) -> ResponseEnvelope {
        ResponseEnvelope {
            status: Some(StatusCode::from_u16(status).unwrap()),
            headers: HeaderMap::new(),
            body: body.to_string(),
            transport: None,
        }
    }

    #[test]
    fn ok_is_not_an_error() {
        let decision = classify(&envelope(200, "{}"), 1);
        assert!(decision.error.is_none());
        assert!(!decision.should_retry);
    }

    #[test]
    fn quadratic_backoff_schedule() {
        for (attempt, expected) in [(1, 1), (2, 4), (3, 9), (4, 16)] {
            let decision = classify(&envelope(500, ""), attempt);
            assert!(decision.should_retry);
            assert_eq!(decision.wait, Some(Duration::from_secs(expected)));
        }
    }

    #[test]
    fn gateway_timeout_waits_longer() {
        let decision = classify(&envelope(504, ""), 1);
        assert!(decision.should_retry);
        assert_eq!(decision.wait, Some(Duration::from_secs(10)));
        assert!(matches!(
            decision.error,
            Some(Error::Server(ServerError::GatewayTimeout(_)))
        ));
    }

    #[test]
    fn unauthorized_retries_exactly_once() {
        let first = classify(&envelope(401, ""), 1);
        assert!(first.should_retry);
        assert_eq!(first.wait, Some(Duration::ZERO));

        let second = classify(&envelope(401, ""), 2);
        assert!(!second.should_retry);
        assert!(matches!(
            second.error,
            Some(Error::Usage(UsageError::Unauthorized(_)))
        ));
    }

    #[test]
    fn rate_limit_requires_retry_after() {
        let mut limited = envelope(429, "");
        limited
            .headers
            .insert("retry-after", HeaderValue::from_static("7"));
        let decision = classify(&limited, 1);
        assert!(decision.should_retry);
        assert_eq!(decision.wait, Some(Duration::from_secs(7)));

        let decision = classify(&envelope(429, ""), 1);
        assert!(!decision.should_retry);
        assert!(matches!(
            decision.error,
            Some(Error::Usage(UsageError::TooManyRequests(_)))
        ));
    }

    #[test]
    fn client_errors_are_terminal() {
        for status in [400u16, 403, 404, 409] {
            let decision = classify(&envelope(status, ""), 1);
            assert!(!decision.should_retry, "status {status} must not retry");
            assert!(decision.error.is_some());
        }
    }

    #[test]
    fn unknown_status_is_terminal() {
        let decision = classify(&envelope(418, "{\"error\": \"teapot\"}"), 1);
        assert!(!decision.should_retry);
        match decision.error {
            Some(Error::Unexpected { status, message }) => {
                assert_eq!(status, 418);
                assert_eq!(message.message.as_deref(), Some("teapot"));
            }
            other => panic!("expected Unexpected, got {other:?}"),
        }
    }

    #[test]
    fn read_timeout_retries_connection_failure_does_not() {
        let timeout = ResponseEnvelope::from_transport(TransportError::ReadTimeout(
            "deadline exceeded".into(),
        ));
        let decision = classify(&timeout, 2);
        assert!(decision.should_retry);
        assert_eq!(decision.wait, Some(Duration::from_secs(4)));

        let refused =
            ResponseEnvelope::from_transport(TransportError::Connection("refused".into()));
        let decision = classify(&refused, 1);
        assert!(!decision.should_retry);
        assert!(matches!(decision.error, Some(Error::Connection(_))));
    }

    #[test]
    fn exponential_backoff_doubles() {
        assert_eq!(exponential_backoff(0), Duration::from_secs(1));
        assert_eq!(exponential_backoff(1), Duration::from_secs(2));
        assert_eq!(exponential_backoff(5), Duration::from_secs(32));
    }

    #[test]
    fn retry_after_parses_http_date() {
        let future = SystemTime::now() + Duration::from_secs(60);
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_str(&httpdate::fmt_http_date(future)).unwrap(),
        );
        let wait = retry_after(&headers).unwrap();
        assert!(wait <= Duration::from_secs(60));
        assert!(wait >= Duration::from_secs(55));
    }
}
