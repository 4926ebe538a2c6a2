//! HTTP client with bounded retries and typed error classification.
//!
//! [`Client`] is the main entry point. Every call runs through one explicit
//! retry loop: execute an attempt, classify the outcome
//! ([`crate::retry::classify`]), then either return the parsed body, sleep
//! and retry, or surface the typed error. The loop performs at most
//! `request_attempts` HTTP attempts in total.

use crate::auth::{Auth, TokenProvider};
use crate::error::{Error, Result};
use crate::retry::{self, ResponseEnvelope, TransportError};
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default REST API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.sensorgrid.io/v2";

/// Default emulator API base URL.
pub const DEFAULT_EMULATOR_URL: &str = "https://emulator.sensorgrid.io/v2";

/// Default identity endpoint for service-account token exchange.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://identity.sensorgrid.io/oauth2/token";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_REQUEST_ATTEMPTS: usize = 3;

/// Default number of items requested per pagination page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A client for the SensorGrid REST API.
///
/// The client is cheap to clone and designed to be reused: it holds the
/// connection pool, the credential, and the default retry/timeout knobs for
/// every request issued through it.
///
/// # Examples
///
/// ```no_run
/// use sensorgrid::{Auth, Client};
/// use sensorgrid::resources::Device;
///
/// # async fn example() -> Result<(), sensorgrid::Error> {
/// let client = Client::builder()
///     .auth(Auth::basic("key-id", "secret")?)
///     .build()?;
///
/// let device: Device = client
///     .get("/projects/your-project/devices/your-device")
///     .await?;
/// println!("{} is a {}", device.name, device.device_type);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    emulator_url: Url,
    auth: Arc<dyn TokenProvider>,
    request_timeout: Duration,
    request_attempts: usize,
    user_agent: String,
}

/// Everything needed to issue one logical request. Constructed fresh per
/// call and never mutated once the retry loop starts.
#[derive(Debug, Clone)]
pub(crate) struct RequestSpec {
    pub method: Method,
    pub path: String,
    /// Ordered multi-map; list-valued filters repeat the key.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub attempts: Option<i64>,
    pub emulator: bool,
}

impl RequestSpec {
    pub(crate) fn new(method: Method, path: impl Into<String>) -> Self {
        RequestSpec {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
            attempts: None,
            emulator: false,
        }
    }

    pub(crate) fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub(crate) fn query_pairs(
        mut self,
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.query.extend(pairs);
        self
    }

    pub(crate) fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn emulator(mut self) -> Self {
        self.emulator = true;
        self
    }

    pub(crate) fn options(mut self, options: &RequestOptions) -> Self {
        self.timeout = options.request_timeout;
        self.attempts = options.request_attempts;
        self
    }
}

/// Per-call overrides for the retry and timeout knobs.
///
/// # Examples
///
/// ```no_run
/// use sensorgrid::{Client, RequestOptions};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), sensorgrid::Error> {
/// # let client = Client::builder().build()?;
/// let options = RequestOptions::new()
///     .request_attempts(5)
///     .request_timeout(Duration::from_secs(10));
/// let body: serde_json::Value = client
///     .get_with("/projects", &[("query", "lab")], &options)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) request_attempts: Option<i64>,
    pub(crate) request_timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        RequestOptions::default()
    }

    /// Total number of HTTP attempts allowed for this call, initial attempt
    /// included. Negative values are rejected with
    /// [`Error::Configuration`] when the call is issued.
    #[must_use]
    pub fn request_attempts(mut self, attempts: i64) -> Self {
        self.request_attempts = Some(attempts);
        self
    }

    /// Per-attempt timeout for this call. Must be greater than zero.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Makes a GET request and deserializes the JSON response.
    pub async fn get<Res>(&self, path: &str) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        self.request_typed(RequestSpec::new(Method::GET, path)).await
    }

    /// GET with query parameters and per-call options.
    pub async fn get_with<Res>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        options: &RequestOptions,
    ) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        let spec = RequestSpec::new(Method::GET, path)
            .query_pairs(
                query
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
            )
            .options(options);
        self.request_typed(spec).await
    }

    /// Makes a POST request with a JSON body.
    pub async fn post<Req, Res>(&self, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.post_with(path, body, &RequestOptions::default()).await
    }

    /// POST with per-call options.
    pub async fn post_with<Req, Res>(
        &self,
        path: &str,
        body: &Req,
        options: &RequestOptions,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = to_json_body(body)?;
        self.request_typed(RequestSpec::new(Method::POST, path).body(body).options(options))
            .await
    }

    /// Makes a PATCH request with a JSON body.
    pub async fn patch<Req, Res>(&self, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = to_json_body(body)?;
        self.request_typed(RequestSpec::new(Method::PATCH, path).body(body))
            .await
    }

    /// Makes a DELETE request, discarding the (empty) response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request_raw(RequestSpec::new(Method::DELETE, path))
            .await?;
        Ok(())
    }

    /// Collects every page of a paginated list endpoint into one vector.
    ///
    /// The endpoint is called repeatedly with a fixed `pageSize` and the
    /// `pageToken` taken from the previous response's `nextPageToken`; an
    /// empty token terminates. Items are concatenated in response order.
    pub async fn paginated_get<T>(
        &self,
        path: &str,
        pagination_key: &str,
        query: Vec<(String, String)>,
        page_size: usize,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut pages = self.pages(path, pagination_key, query, page_size);
        let mut items = Vec::new();
        while let Some(page) = pages.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    /// Page-at-a-time variant of [`Client::paginated_get`], for incremental
    /// consumption of large result sets.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensorgrid::Client;
    /// use sensorgrid::resources::Device;
    ///
    /// # async fn example() -> Result<(), sensorgrid::Error> {
    /// # let client = Client::builder().build()?;
    /// let mut pages = client.pages::<Device>(
    ///     "/projects/your-project/devices",
    ///     "devices",
    ///     Vec::new(),
    ///     100,
    /// );
    /// while let Some(page) = pages.next_page().await? {
    ///     println!("got {} devices", page.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn pages<T>(
        &self,
        path: &str,
        pagination_key: &str,
        query: Vec<(String, String)>,
        page_size: usize,
    ) -> Pages<T>
    where
        T: DeserializeOwned,
    {
        Pages {
            client: self.clone(),
            path: path.to_string(),
            pagination_key: pagination_key.to_string(),
            query,
            page_size,
            next_token: None,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Runs the retry loop and returns the successful raw body.
    pub(crate) async fn request_raw(&self, spec: RequestSpec) -> Result<String> {
        let max_attempts = match spec.attempts {
            Some(n) if n < 0 => {
                return Err(Error::Configuration(
                    "request_attempts must be at least 0".into(),
                ))
            }
            Some(n) => n as usize,
            None => self.inner.request_attempts,
        };
        let timeout = match spec.timeout {
            Some(t) if t.is_zero() => {
                return Err(Error::Configuration(
                    "request_timeout must be greater than zero".into(),
                ))
            }
            Some(t) => t,
            None => self.inner.request_timeout,
        };
        let url = self.build_url(&spec);

        let mut attempt = 0usize;
        loop {
            attempt += 1;

            let envelope = self.execute(&spec, &url, timeout, attempt).await?;
            let decision = retry::classify(&envelope, attempt);

            let error = match decision.error {
                None => return Ok(envelope.body),
                Some(error) => error,
            };

            if decision.should_retry && attempt < max_attempts {
                let wait = decision.wait.unwrap_or(Duration::ZERO);
                tracing::warn!(
                    error = %error,
                    wait_secs = wait.as_secs(),
                    remaining_attempts = max_attempts - attempt,
                    "Retrying request"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            tracing::error!(error = %error, attempts = attempt, "Request failed");
            return Err(error);
        }
    }

    pub(crate) async fn request_typed<T>(&self, spec: RequestSpec) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let raw = self.request_raw(spec).await?;
        match serde_json::from_str(&raw) {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(Error::Format {
                serde_error: e.to_string(),
                raw_response: raw,
            }),
        }
    }

    pub(crate) async fn request_value(&self, spec: RequestSpec) -> Result<Value> {
        let raw = self.request_raw(spec).await?;
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str(&raw) {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(Error::Format {
                serde_error: e.to_string(),
                raw_response: raw,
            }),
        }
    }

    /// Executes a single attempt, converting transport failures into the
    /// envelope rather than an early return so the classifier sees them.
    async fn execute(
        &self,
        spec: &RequestSpec,
        url: &Url,
        timeout: Duration,
        attempt: usize,
    ) -> Result<ResponseEnvelope> {
        tracing::debug!(
            method = %spec.method,
            url = %url,
            attempt,
            "Executing HTTP request"
        );

        let mut request = self
            .inner
            .http
            .request(spec.method.clone(), url.clone())
            .timeout(timeout)
            .header(http::header::USER_AGENT, self.inner.user_agent.as_str());

        let token = self.inner.auth.get_token().await?;
        if !token.is_empty() {
            request = request.header(http::header::AUTHORIZATION, token);
        }

        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(ResponseEnvelope::from_transport(
                    TransportError::from_reqwest(&e),
                ))
            }
        };

        let status = response.status();
        eprintln!("DBG execute got response status={}", status);
        let headers = response.headers().clone();
        match response.text().await {
            Ok(body) => {
                tracing::debug!(status = status.as_u16(), "Received HTTP response");
                Ok(ResponseEnvelope {
                    status: Some(status),
                    headers,
                    body,
                    transport: None,
                })
            }
            // The body read can time out independently of the initial send.
            Err(e) => Ok(ResponseEnvelope::from_transport(
                TransportError::from_reqwest(&e),
            )),
        }
    }

    fn build_url(&self, spec: &RequestSpec) -> Url {
        let mut url = self.api_url(&spec.path, spec.emulator);
        for (key, value) in &spec.query {
            url.query_pairs_mut().append_pair(key, value);
        }
        url
    }

    /// Joins a path onto the API (or emulator) base URL, preserving the
    /// base's version prefix.
    pub(crate) fn api_url(&self, path: &str, emulator: bool) -> Url {
        let base = if emulator {
            &self.inner.emulator_url
        } else {
            &self.inner.base_url
        };
        let mut url = base.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    pub(crate) fn auth(&self) -> Arc<dyn TokenProvider> {
        Arc::clone(&self.inner.auth)
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.inner.user_agent
    }

    pub(crate) fn default_attempts(&self) -> usize {
        self.inner.request_attempts
    }
}

fn to_json_body<Req: Serialize>(body: &Req) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| Error::Configuration(format!("failed to serialize request body: {e}")))
}

/// Lazy page-at-a-time pagination over a list endpoint.
///
/// Produced by [`Client::pages`]; each [`Pages::next_page`] call issues one
/// request and yields that page's items, or `None` once the server returns
/// an empty `nextPageToken`.
pub struct Pages<T> {
    client: Client,
    path: String,
    pagination_key: String,
    query: Vec<(String, String)>,
    page_size: usize,
    next_token: Option<String>,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Pages<T>
where
    T: DeserializeOwned,
{
    /// Fetches the next page, or `None` when pagination is complete.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.done {
            return Ok(None);
        }

        let mut spec = RequestSpec::new(Method::GET, self.path.as_str())
            .query_pairs(self.query.iter().cloned())
            .query("pageSize", self.page_size.to_string());
        if let Some(token) = &self.next_token {
            spec = spec.query("pageToken", token.clone());
        }

        let body = self.client.request_value(spec).await?;

        let next = body
            .get("nextPageToken")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if next.is_empty() {
            self.done = true;
        } else {
            self.next_token = Some(next);
        }

        let items = match body.get(&self.pagination_key) {
            Some(Value::Array(raw)) => {
                let mut items = Vec::with_capacity(raw.len());
                for item in raw {
                    let parsed =
                        serde_json::from_value(item.clone()).map_err(|e| Error::Format {
                            raw_response: item.to_string(),
                            serde_error: e.to_string(),
                        })?;
                    items.push(parsed);
                }
                items
            }
            _ => Vec::new(),
        };

        Ok(Some(items))
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use sensorgrid::{Auth, ClientBuilder};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), sensorgrid::Error> {
/// let client = ClientBuilder::new()
///     .auth(Auth::basic("key-id", "secret")?)
///     .request_timeout(Duration::from_secs(10))
///     .request_attempts(5)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    emulator_url: Option<Url>,
    auth: Option<Arc<dyn TokenProvider>>,
    request_timeout: Duration,
    request_attempts: usize,
}

impl ClientBuilder {
    /// Creates a builder with the production base URLs and default knobs.
    pub fn new() -> Self {
        ClientBuilder {
            base_url: None,
            emulator_url: None,
            auth: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }

    /// Overrides the REST API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(parse_url(url.as_ref())?);
        Ok(self)
    }

    /// Overrides the emulator API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn emulator_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.emulator_url = Some(parse_url(url.as_ref())?);
        Ok(self)
    }

    /// Sets the credential used for every request. Defaults to
    /// [`Auth::unauthenticated`].
    #[must_use]
    pub fn auth(mut self, auth: impl TokenProvider + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Default per-attempt timeout. Must be greater than zero.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Default total number of HTTP attempts per call.
    #[must_use]
    pub fn request_attempts(mut self, attempts: usize) -> Self {
        self.request_attempts = attempts;
        self
    }

    /// Builds the configured [`Client`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when a knob is out of range or the
    /// underlying HTTP client cannot be constructed.
    pub fn build(self) -> Result<Client> {
        if self.request_timeout.is_zero() {
            return Err(Error::Configuration(
                "request_timeout must be greater than zero".into(),
            ));
        }

        let base_url = match self.base_url {
            Some(url) => url,
            None => parse_url(DEFAULT_BASE_URL)?,
        };
        let emulator_url = match self.emulator_url {
            Some(url) => url,
            None => parse_url(DEFAULT_EMULATOR_URL)?,
        };

        let http = reqwest::Client::builder().build().map_err(|e| {
            Error::Configuration(format!("failed to build HTTP client: {e}"))
        })?;

        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(Auth::unauthenticated()));

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                emulator_url,
                auth,
                request_timeout: self.request_timeout,
                request_attempts: self.request_attempts,
                user_agent: format!("sensorgrid-rust/{}", env!("CARGO_PKG_VERSION")),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::Configuration(format!("invalid URL {url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_preserves_version_prefix() {
        let client = Client::builder().build().unwrap();
        let url = client.api_url("/projects/p1/devices", false);
        assert_eq!(
            url.as_str(),
            "https://api.sensorgrid.io/v2/projects/p1/devices"
        );
    }

    #[test]
    fn emulator_requests_use_the_emulator_base() {
        let client = Client::builder().build().unwrap();
        let url = client.api_url("/projects/p1/devices", true);
        assert_eq!(
            url.as_str(),
            "https://emulator.sensorgrid.io/v2/projects/p1/devices"
        );
    }

    #[test]
    fn zero_timeout_is_rejected_at_build() {
        let result = Client::builder()
            .request_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn query_pairs_keep_insertion_order() {
        let spec = RequestSpec::new(Method::GET, "/devices")
            .query("eventTypes", "touch")
            .query("eventTypes", "temperature")
            .query("pageSize", "10");
        assert_eq!(
            spec.query,
            vec![
                ("eventTypes".to_string(), "touch".to_string()),
                ("eventTypes".to_string(), "temperature".to_string()),
                ("pageSize".to_string(), "10".to_string()),
            ]
        );
    }
}
