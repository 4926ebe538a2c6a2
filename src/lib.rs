//! # sensorgrid: a client for the SensorGrid cloud IoT platform
//!
//! A type-safe client for the SensorGrid REST and streaming API, built on
//! `reqwest`. It authenticates with basic key-pairs or service accounts,
//! retries transient failures with status-specific backoff, paginates list
//! endpoints, and keeps a long-lived event stream alive through idle
//! timeouts and reconnects.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sensorgrid::{Auth, Client};
//! use sensorgrid::resources::ListDevices;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sensorgrid::Error> {
//!     let auth = Auth::service_account(
//!         "your-key-id",
//!         "your-secret",
//!         "your-key-id@your-project.serviceaccount.sensorgrid.io",
//!     )?;
//!     let client = Client::builder().auth(auth).build()?;
//!
//!     // List every temperature sensor in a project.
//!     let filters = ListDevices {
//!         device_types: vec!["temperature".to_string()],
//!         ..Default::default()
//!     };
//!     for device in client.list_devices("your-project", &filters).await? {
//!         println!("{}", device.name);
//!     }
//!
//!     // Follow events as they arrive.
//!     let mut stream = client.event_stream("/projects/your-project/devices:stream");
//!     while let Some(event) = stream.next().await {
//!         let event = event?;
//!         println!("{}: {}", event.target_name, event.data.event_type());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Retries
//!
//! Every call runs at most `request_attempts` HTTP attempts (default 3).
//! Read timeouts and 5xx responses back off quadratically, a 429 waits out
//! its `Retry-After`, and a single 401 earns one immediate retry in case a
//! cached token went stale. Connection failures and other 4xx responses
//! fail fast. The event stream reconnects independently, with exponential
//! backoff and a fresh token per connection.
//!
//! ## Errors
//!
//! Failures surface as [`Error`]: configuration mistakes, grouped usage
//! errors ([`UsageError`]) and server errors ([`ServerError`]) carrying the
//! API's structured `{code, error, help}` payload, and transport-level
//! timeouts and connection failures.

mod auth;
mod client;
mod error;
pub mod events;
pub mod resources;
mod retry;
mod stream;

pub use auth::{Auth, TokenProvider};
pub use client::{
    Client, ClientBuilder, Pages, RequestOptions, DEFAULT_BASE_URL, DEFAULT_EMULATOR_URL,
    DEFAULT_PAGE_SIZE, DEFAULT_TOKEN_ENDPOINT,
};
pub use error::{ApiMessage, Error, Result, ServerError, UsageError};
pub use events::{Event, EventData};
pub use stream::{CancellationToken, EventStream, DEFAULT_PING_INTERVAL};
