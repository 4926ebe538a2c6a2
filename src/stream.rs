//! Long-lived event streaming with automatic reconnection.
//!
//! [`EventStream`] holds one chunked GET open and yields events as
//! newline-delimited JSON frames arrive. Heartbeat pings prove the
//! connection is alive and are filtered out; a missed heartbeat surfaces as
//! a read timeout, which (like any other transport failure) triggers a
//! reconnect with exponential backoff and a freshly fetched token. The
//! stream only ever ends with an error once the reconnect bound is
//! exhausted.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::retry::{self, TransportError};
use serde_json::Value;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

/// Default server-side heartbeat cadence.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Slack on top of the ping interval before an idle read times out. An idle
/// connection that misses its heartbeat fails the read instead of hanging.
const PING_JITTER: Duration = Duration::from_secs(2);

impl Client {
    /// Opens a lazy stream of events from the given endpoint, e.g.
    /// `/projects/<project>/devices:stream`.
    ///
    /// Nothing happens until the first [`EventStream::next`] call. The
    /// stream is infinite: it reconnects through transient failures and only
    /// yields an error once its retry bound is exhausted. It is not
    /// resumable: events sent while disconnected are not replayed; call
    /// this again for a fresh stream.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensorgrid::Client;
    ///
    /// # async fn example() -> Result<(), sensorgrid::Error> {
    /// # let client = Client::builder().build()?;
    /// let mut stream = client
    ///     .event_stream("/projects/your-project/devices:stream")
    ///     .query("eventTypes", "temperature");
    ///
    /// while let Some(event) = stream.next().await {
    ///     let event = event?;
    ///     println!("{} from {}", event.data.event_type(), event.target_name);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn event_stream(&self, path: &str) -> EventStream {
        EventStream {
            client: self.clone(),
            path: path.to_string(),
            query: Vec::new(),
            ping_interval: DEFAULT_PING_INTERVAL,
            max_attempts: self.default_attempts(),
            cancel: CancellationToken::new(),
            retry_count: 0,
            connection: None,
            terminated: false,
        }
    }
}

/// A resilient, lazily connected stream of device events.
///
/// Produced by [`Client::event_stream`]. Strictly sequential: one frame is
/// read, parsed, and yielded at a time, in arrival order. Dropping the
/// stream (or cancelling its token) closes the underlying connection; no
/// background task survives abandonment.
pub struct EventStream {
    client: Client,
    path: String,
    query: Vec<(String, String)>,
    ping_interval: Duration,
    max_attempts: usize,
    cancel: CancellationToken,
    retry_count: u32,
    connection: Option<Connection>,
    terminated: bool,
}

struct Connection {
    response: reqwest::Response,
    buffer: String,
}

enum Frame {
    Event(Event),
    Ping,
    /// The server ended the stream, or sent a frame without a result.
    End,
}

impl EventStream {
    /// Adds a query parameter. Repeat the key for list-valued filters.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Requested heartbeat cadence. The read timeout follows it, so shorter
    /// intervals detect dead connections faster at the cost of chatter.
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Number of reconnect attempts tolerated before the stream yields the
    /// transport error. Each successful heartbeat resets the count.
    #[must_use]
    pub fn request_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Cancels the stream when `token` is cancelled, including mid-read.
    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Yields the next event, reconnecting through transient failures.
    ///
    /// Returns `None` when the stream ends cleanly (server close or
    /// cancellation) and `Some(Err(_))` exactly once, when the reconnect
    /// bound is exhausted. After either, all further calls return `None`.
    pub async fn next(&mut self) -> Option<Result<Event>> {
        if self.terminated {
            return None;
        }

        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            () = cancel.cancelled() => None,
            item = self.advance() => Some(item),
        };

        match outcome {
            Some(item) => item,
            None => {
                tracing::debug!("Event stream cancelled");
                self.close();
                None
            }
        }
    }

    async fn advance(&mut self) -> Option<Result<Event>> {
        loop {
            if self.connection.is_none() {
                match self.connect().await {
                    Ok(connection) => self.connection = Some(connection),
                    // Client-side misconfiguration cannot be retried away.
                    Err(err @ Error::Configuration(_)) => {
                        self.close();
                        return Some(Err(err));
                    }
                    Err(err) => {
                        if let Some(fatal) = self.backoff(err).await {
                            self.close();
                            return Some(Err(fatal));
                        }
                        continue;
                    }
                }
            }

            let Some(connection) = self.connection.as_mut() else {
                continue;
            };

            match read_frame(connection).await {
                Ok(Frame::Event(event)) => return Some(Ok(event)),
                Ok(Frame::Ping) => {
                    tracing::debug!("Ping received.");
                    self.retry_count = 0;
                }
                Ok(Frame::End) => {
                    tracing::debug!("Event stream ended");
                    self.close();
                    return None;
                }
                Err(err) => {
                    self.connection = None;
                    if let Some(fatal) = self.backoff(err).await {
                        self.close();
                        return Some(Err(fatal));
                    }
                }
            }
        }
    }

    /// Opens a fresh connection. The token is fetched anew each time since
    /// credentials may have rotated while disconnected.
    async fn connect(&mut self) -> Result<Connection> {
        let token = self.client.auth().get_token().await?;

        let mut url = self.client.api_url(&self.path, false);
        for (key, value) in &self.query {
            url.query_pairs_mut().append_pair(key, value);
        }
        url.query_pairs_mut()
            .append_pair("ping_interval", &format!("{}s", self.ping_interval.as_secs()));

        tracing::debug!(url = %url, retry = self.retry_count, "Opening event stream");

        let http = reqwest::Client::builder()
            .read_timeout(self.ping_interval + PING_JITTER)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        let mut request = http
            .get(url)
            .header(http::header::USER_AGENT, self.client.user_agent());
        if !token.is_empty() {
            request = request.header(http::header::AUTHORIZATION, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_to_error(TransportError::from_reqwest(&e)))?;

        let status = response.status();
        if status != http::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let envelope = crate::retry::ResponseEnvelope {
                status: Some(status),
                headers: http::HeaderMap::new(),
                body,
                transport: None,
            };
            let decision = retry::classify(&envelope, 1);
            return Err(decision
                .error
                .unwrap_or_else(|| Error::Connection(format!("stream rejected with {status}"))));
        }

        Ok(Connection {
            response,
            buffer: String::new(),
        })
    }

    /// Sleeps the exponential backoff for this reconnect, or returns the
    /// error once the retry bound is exhausted.
    async fn backoff(&mut self, err: Error) -> Option<Error> {
        if (self.retry_count as usize) >= self.max_attempts {
            tracing::error!(
                error = %err,
                attempts = self.max_attempts,
                "Event stream retries exhausted"
            );
            return Some(err);
        }

        let wait = retry::exponential_backoff(self.retry_count);
        tracing::warn!(
            error = %err,
            wait_secs = wait.as_secs(),
            "Reconnecting event stream"
        );
        tokio::time::sleep(wait).await;
        self.retry_count += 1;
        None
    }

    fn close(&mut self) {
        self.connection = None;
        self.terminated = true;
    }
}

/// Reads chunks until one complete line is buffered, then parses it.
async fn read_frame(connection: &mut Connection) -> Result<Frame> {
    loop {
        if let Some(newline) = connection.buffer.find('\n') {
            let line: String = connection.buffer.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return parse_frame(line);
        }

        match connection.response.chunk().await {
            Ok(Some(chunk)) => connection
                .buffer
                .push_str(&String::from_utf8_lossy(&chunk)),
            Ok(None) => return Ok(Frame::End),
            Err(e) => return Err(transport_to_error(TransportError::from_reqwest(&e))),
        }
    }
}

/// One frame is `{"result": {"event": {...}}}`. A frame without a result
/// signals end of stream; a ping event is a heartbeat with no payload.
fn parse_frame(line: &str) -> Result<Frame> {
    let value: Value = serde_json::from_str(line).unwrap_or(Value::Null);

    let event = match value.get("result").and_then(|result| result.get("event")) {
        Some(event) => event,
        None => return Ok(Frame::End),
    };

    if event.get("eventType").and_then(Value::as_str) == Some("ping") {
        return Ok(Frame::Ping);
    }

    Event::from_raw(event.clone()).map(Frame::Event)
}

fn transport_to_error(transport: TransportError) -> Error {
    match transport {
        TransportError::ReadTimeout(msg) => Error::ReadTimeout(msg),
        TransportError::Connection(msg) => Error::Connection(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_frames_are_recognized() {
        let line = r#"{"result": {"event": {"eventType": "ping"}}}"#;
        assert!(matches!(parse_frame(line), Ok(Frame::Ping)));
    }

    #[test]
    fn frame_without_result_ends_the_stream() {
        assert!(matches!(parse_frame(r#"{"done": true}"#), Ok(Frame::End)));
        assert!(matches!(parse_frame("not json"), Ok(Frame::End)));
    }

    #[test]
    fn event_frames_are_parsed() {
        let line = r#"{"result": {"event": {
            "eventId": "e1",
            "targetName": "projects/p1/devices/d1",
            "eventType": "touch",
            "data": {"touch": {"updateTime": "2026-08-05T09:00:00Z"}},
            "timestamp": "2026-08-05T09:00:00Z"
        }}}"#;
        match parse_frame(line) {
            Ok(Frame::Event(event)) => {
                assert_eq!(event.event_id, "e1");
                assert_eq!(event.data.event_type(), "touch");
            }
            other => panic!("expected event frame, got {:?}", other.map(|_| ())),
        }
    }
}
