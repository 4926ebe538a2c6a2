//! Devices and their event history, including the emulator surface.

use crate::client::{Client, Pages, RequestSpec, DEFAULT_PAGE_SIZE};
use crate::error::Result;
use crate::events::{Event, EventData};
use http::Method;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// A sensor or cloud connector registered in a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Resource name: `projects/<project>/devices/<device>`.
    pub name: String,
    /// Device type, e.g. `temperature`, `touch`, or `ccon`.
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub product_number: Option<String>,
}

impl Device {
    /// The bare device identifier (the last segment of the resource name).
    pub fn device_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Filters for [`Client::list_devices`]. List-valued filters are sent as
/// repeated query keys; label filters as `key=value` strings.
#[derive(Debug, Clone, Default)]
pub struct ListDevices {
    pub device_ids: Vec<String>,
    pub device_types: Vec<String>,
    pub label_filters: Vec<String>,
    /// Items per page; defaults to [`DEFAULT_PAGE_SIZE`] when zero.
    pub page_size: usize,
}

impl ListDevices {
    pub(crate) fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        for id in &self.device_ids {
            query.push(("device_ids".to_string(), id.clone()));
        }
        for device_type in &self.device_types {
            query.push(("device_types".to_string(), device_type.clone()));
        }
        for filter in &self.label_filters {
            query.push(("label_filters".to_string(), filter.clone()));
        }
        query
    }

    fn page_size(&self) -> usize {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        }
    }
}

impl Client {
    /// Fetches a single device.
    pub async fn get_device(&self, project_id: &str, device_id: &str) -> Result<Device> {
        self.get(&format!("/projects/{project_id}/devices/{device_id}"))
            .await
    }

    /// Lists devices in a project, following pagination to the end.
    pub async fn list_devices(
        &self,
        project_id: &str,
        filters: &ListDevices,
    ) -> Result<Vec<Device>> {
        self.paginated_get(
            &format!("/projects/{project_id}/devices"),
            "devices",
            filters.to_query(),
            filters.page_size(),
        )
        .await
    }

    /// Page-at-a-time variant of [`Client::list_devices`].
    pub fn device_pages(&self, project_id: &str, filters: &ListDevices) -> Pages<Device> {
        self.pages(
            &format!("/projects/{project_id}/devices"),
            "devices",
            filters.to_query(),
            filters.page_size(),
        )
    }

    /// Historical events for one device, optionally narrowed to the given
    /// event types, newest page first as served by the API.
    pub async fn list_events(
        &self,
        project_id: &str,
        device_id: &str,
        event_types: &[&str],
    ) -> Result<Vec<Event>> {
        let query = event_types
            .iter()
            .map(|event_type| ("eventTypes".to_string(), (*event_type).to_string()))
            .collect();
        self.paginated_get(
            &format!("/projects/{project_id}/devices/{device_id}/events"),
            "events",
            query,
            DEFAULT_PAGE_SIZE,
        )
        .await
    }

    /// Creates a device in the emulator.
    pub async fn create_emulated_device(
        &self,
        project_id: &str,
        device_type: &str,
        labels: &HashMap<String, String>,
    ) -> Result<Device> {
        let spec = RequestSpec::new(Method::POST, format!("/projects/{project_id}/devices"))
            .body(json!({ "type": device_type, "labels": labels }))
            .emulator();
        self.request_typed(spec).await
    }

    /// Deletes an emulated device.
    pub async fn delete_emulated_device(&self, project_id: &str, device_id: &str) -> Result<()> {
        let spec = RequestSpec::new(
            Method::DELETE,
            format!("/projects/{project_id}/devices/{device_id}"),
        )
        .emulator();
        self.request_raw(spec).await?;
        Ok(())
    }

    /// Publishes a synthetic event from an emulated device.
    pub async fn publish_emulated_event(
        &self,
        project_id: &str,
        device_id: &str,
        data: &EventData,
    ) -> Result<()> {
        let spec = RequestSpec::new(
            Method::POST,
            format!("/projects/{project_id}/devices/{device_id}:publish"),
        )
        .body(json!({ "data": { (data.event_type().to_string()): data.to_raw() } }))
        .emulator();
        self.request_raw(spec).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_the_last_segment() {
        let device = Device {
            name: "projects/p1/devices/emuc0cnp9qvmtuc7".into(),
            device_type: "temperature".into(),
            labels: HashMap::new(),
            product_number: None,
        };
        assert_eq!(device.device_id(), "emuc0cnp9qvmtuc7");
    }

    #[test]
    fn list_filters_repeat_keys_in_order() {
        let filters = ListDevices {
            device_ids: vec!["d1".into(), "d2".into()],
            device_types: vec!["touch".into()],
            label_filters: vec!["floor=2".into()],
            page_size: 0,
        };
        assert_eq!(
            filters.to_query(),
            vec![
                ("device_ids".to_string(), "d1".to_string()),
                ("device_ids".to_string(), "d2".to_string()),
                ("device_types".to_string(), "touch".to_string()),
                ("label_filters".to_string(), "floor=2".to_string()),
            ]
        );
        assert_eq!(filters.page_size(), DEFAULT_PAGE_SIZE);
    }
}
