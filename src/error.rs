//! Error types for SensorGrid API calls.
//!
//! The taxonomy distinguishes client-side configuration mistakes, requests
//! the server rejected ([`UsageError`]), server-side failures that are safe
//! to retry ([`ServerError`]), and transport-level problems. Errors carry
//! the structured payload the API returned so callers can display it.

use http::StatusCode;
use serde::Deserialize;

/// Structured error payload returned by the SensorGrid API.
///
/// Error responses carry a body of the form
/// `{"code": 404, "error": "...", "help": "https://..."}`. The message and
/// help link are surfaced verbatim in the raised error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    /// Numeric status code echoed by the server, when present.
    #[serde(default)]
    pub code: Option<u16>,
    /// Human-readable description of what the server rejected.
    #[serde(default, rename = "error")]
    pub message: Option<String>,
    /// Link to relevant documentation, when the server provides one.
    #[serde(default)]
    pub help: Option<String>,
}

impl ApiMessage {
    /// Parses an error body, falling back to the raw text when the body is
    /// not the structured `{code, error, help}` shape.
    pub(crate) fn from_body(raw: &str) -> Self {
        match serde_json::from_str::<ApiMessage>(raw) {
            Ok(message) => message,
            Err(_) => ApiMessage {
                code: None,
                message: if raw.is_empty() {
                    None
                } else {
                    Some(raw.to_string())
                },
                help: None,
            },
        }
    }
}

impl std::fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.message, &self.help) {
            (Some(message), Some(help)) => write!(f, "{message} (help: {help})"),
            (Some(message), None) => write!(f, "{message}"),
            (None, _) => write!(f, "no error details provided"),
        }
    }
}

/// A request the server rejected as invalid, unauthorized, or conflicting.
///
/// These are never retried automatically, with two exceptions: a single
/// `Unauthorized` response earns one retry on the assumption of a stale
/// cached token, and `TooManyRequests` is retried when the server names a
/// `Retry-After` wait.
#[derive(thiserror::Error, Debug)]
pub enum UsageError {
    /// 400: the request body or parameters were malformed.
    #[error("bad request: {0}")]
    BadRequest(ApiMessage),

    /// 401: the request lacked valid authentication.
    #[error("unauthorized: {0}")]
    Unauthorized(ApiMessage),

    /// 403: the credential is not allowed to perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(ApiMessage),

    /// 404: the named resource does not exist.
    #[error("not found: {0}")]
    NotFound(ApiMessage),

    /// 409: the request conflicts with the resource's current state.
    #[error("conflict: {0}")]
    Conflict(ApiMessage),

    /// 429: the project or organization is over its request quota.
    #[error("too many requests: {0}")]
    TooManyRequests(ApiMessage),
}

impl UsageError {
    /// The structured payload the server returned with the rejection.
    pub fn message(&self) -> &ApiMessage {
        match self {
            UsageError::BadRequest(m)
            | UsageError::Unauthorized(m)
            | UsageError::Forbidden(m)
            | UsageError::NotFound(m)
            | UsageError::Conflict(m)
            | UsageError::TooManyRequests(m) => m,
        }
    }

    /// The HTTP status this rejection corresponds to.
    pub fn status(&self) -> StatusCode {
        match self {
            UsageError::BadRequest(_) => StatusCode::BAD_REQUEST,
            UsageError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            UsageError::Forbidden(_) => StatusCode::FORBIDDEN,
            UsageError::NotFound(_) => StatusCode::NOT_FOUND,
            UsageError::Conflict(_) => StatusCode::CONFLICT,
            UsageError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// The server failed to handle an otherwise valid request.
///
/// All variants are automatically retried with quadratic backoff until the
/// attempt bound is reached.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    /// 500: the server hit an unexpected condition.
    #[error("internal server error: {0}")]
    InternalServerError(ApiMessage),

    /// 503: the service is temporarily overloaded or down for maintenance.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(ApiMessage),

    /// 504: an upstream gateway did not answer in time.
    #[error("gateway timeout: {0}")]
    GatewayTimeout(ApiMessage),
}

impl ServerError {
    /// The structured payload the server returned with the failure.
    pub fn message(&self) -> &ApiMessage {
        match self {
            ServerError::InternalServerError(m)
            | ServerError::ServiceUnavailable(m)
            | ServerError::GatewayTimeout(m) => m,
        }
    }
}

/// The main error type for SensorGrid API calls.
///
/// # Examples
///
/// ```no_run
/// use sensorgrid::{Client, Error, UsageError};
/// use sensorgrid::resources::Device;
///
/// # async fn example() -> Result<(), Error> {
/// # let client = Client::builder().build()?;
/// match client.get::<Device>("/projects/p1/devices/d1").await {
///     Ok(device) => println!("{}", device.name),
///     Err(Error::Usage(UsageError::NotFound(message))) => {
///         eprintln!("no such device: {message}");
///     }
///     Err(e) => eprintln!("request failed: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid client-side parameters. Never sent over the wire.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The server rejected the request (4xx).
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The server failed to handle the request (5xx).
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The request timed out waiting for a response or for stream data.
    #[error("read timeout: {0}")]
    ReadTimeout(String),

    /// The host could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The response body could not be parsed as the expected type.
    #[error("failed to parse response: {serde_error}")]
    Format {
        /// The raw body that failed to parse.
        raw_response: String,
        /// The parser's error message.
        serde_error: String,
    },

    /// The server answered with a status this client does not recognize.
    #[error("unexpected status {status}: {message}")]
    Unexpected {
        /// The HTTP status code received.
        status: u16,
        /// Whatever payload accompanied it.
        message: ApiMessage,
    },
}

impl Error {
    /// The HTTP status code behind this error, if it came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Usage(usage) => Some(usage.status()),
            Error::Server(ServerError::InternalServerError(_)) => {
                Some(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::Server(ServerError::ServiceUnavailable(_)) => {
                Some(StatusCode::SERVICE_UNAVAILABLE)
            }
            Error::Server(ServerError::GatewayTimeout(_)) => Some(StatusCode::GATEWAY_TIMEOUT),
            Error::Unexpected { status, .. } => StatusCode::from_u16(*status).ok(),
            _ => None,
        }
    }

    /// The structured API payload behind this error, if the server sent one.
    pub fn api_message(&self) -> Option<&ApiMessage> {
        match self {
            Error::Usage(usage) => Some(usage.message()),
            Error::Server(server) => Some(server.message()),
            Error::Unexpected { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// A specialized `Result` type for SensorGrid API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_error_body() {
        let message =
            ApiMessage::from_body(r#"{"code": 404, "error": "device not found", "help": "x"}"#);
        assert_eq!(message.code, Some(404));
        assert_eq!(message.message.as_deref(), Some("device not found"));
        assert_eq!(message.help.as_deref(), Some("x"));
    }

    #[test]
    fn falls_back_to_raw_text() {
        let message = ApiMessage::from_body("upstream exploded");
        assert_eq!(message.code, None);
        assert_eq!(message.message.as_deref(), Some("upstream exploded"));
    }

    #[test]
    fn empty_body_displays_placeholder() {
        let message = ApiMessage::from_body("");
        assert_eq!(message.to_string(), "no error details provided");
    }

    #[test]
    fn display_includes_help_link() {
        let message = ApiMessage {
            code: Some(400),
            message: Some("bad field".into()),
            help: Some("https://developer.sensorgrid.io/errors".into()),
        };
        let err = Error::from(UsageError::BadRequest(message));
        assert_eq!(
            err.to_string(),
            "bad request: bad field (help: https://developer.sensorgrid.io/errors)"
        );
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn server_error_exposes_status() {
        let err = Error::from(ServerError::GatewayTimeout(ApiMessage::default()));
        assert_eq!(err.status(), Some(StatusCode::GATEWAY_TIMEOUT));
    }
}
