//! Data connectors: webhook-style forwarding targets for device events.

use crate::client::{Client, DEFAULT_PAGE_SIZE};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// A configured forwarding target for a project's events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConnector {
    /// Resource name: `projects/<project>/dataconnectors/<connector>`.
    pub name: String,
    #[serde(rename = "type")]
    pub connector_type: String,
    /// `ACTIVE`, `USER_DISABLED`, or `SYSTEM_DISABLED`.
    pub status: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub http_config: Option<HttpConfig>,
}

/// Endpoint configuration for an HTTP push connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature_secret: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Parameters for [`Client::create_data_connector`].
#[derive(Debug, Clone, Default)]
pub struct NewDataConnector {
    pub display_name: String,
    /// Event types to forward; empty forwards everything.
    pub events: Vec<String>,
    pub http_config: HttpConfig,
}

impl Client {
    /// Fetches a single data connector.
    pub async fn get_data_connector(
        &self,
        project_id: &str,
        connector_id: &str,
    ) -> Result<DataConnector> {
        self.get(&format!(
            "/projects/{project_id}/dataconnectors/{connector_id}"
        ))
        .await
    }

    /// Lists every data connector in a project.
    pub async fn list_data_connectors(&self, project_id: &str) -> Result<Vec<DataConnector>> {
        self.paginated_get(
            &format!("/projects/{project_id}/dataconnectors"),
            "dataConnectors",
            Vec::new(),
            DEFAULT_PAGE_SIZE,
        )
        .await
    }

    /// Creates an HTTP push data connector.
    pub async fn create_data_connector(
        &self,
        project_id: &str,
        connector: &NewDataConnector,
    ) -> Result<DataConnector> {
        self.post(
            &format!("/projects/{project_id}/dataconnectors"),
            &json!({
                "type": "HTTP_PUSH",
                "displayName": connector.display_name,
                "events": connector.events,
                "httpConfig": connector.http_config,
            }),
        )
        .await
    }

    /// Updates a data connector's display name and forwarded event types.
    pub async fn update_data_connector(
        &self,
        project_id: &str,
        connector_id: &str,
        display_name: Option<&str>,
        events: Option<&[String]>,
    ) -> Result<DataConnector> {
        let mut body = serde_json::Map::new();
        if let Some(display_name) = display_name {
            body.insert("displayName".into(), json!(display_name));
        }
        if let Some(events) = events {
            body.insert("events".into(), json!(events));
        }
        self.patch(
            &format!("/projects/{project_id}/dataconnectors/{connector_id}"),
            &serde_json::Value::Object(body),
        )
        .await
    }

    /// Deletes a data connector.
    pub async fn delete_data_connector(&self, project_id: &str, connector_id: &str) -> Result<()> {
        self.delete(&format!(
            "/projects/{project_id}/dataconnectors/{connector_id}"
        ))
        .await
    }
}
