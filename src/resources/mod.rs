//! Typed wrappers over the versioned resource endpoints.
//!
//! These are thin parameter-to-JSON mappers; all retry, authorization, and
//! pagination behavior lives in [`crate::Client`].

mod data_connector;
mod device;
mod project;

pub use data_connector::{DataConnector, HttpConfig, NewDataConnector};
pub use device::{Device, ListDevices};
pub use project::Project;
