//! Projects: the grouping every device and data connector lives under.

use crate::client::{Client, DEFAULT_PAGE_SIZE};
use crate::error::Result;
use serde::Deserialize;
use serde_json::json;

/// A project within an organization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Resource name: `projects/<project>`.
    pub name: String,
    pub display_name: String,
    /// Resource name of the owning organization.
    pub organization: String,
    #[serde(default)]
    pub sensor_count: u64,
    #[serde(default)]
    pub cloud_connector_count: u64,
    /// Whether this is the organization's inventory project.
    #[serde(default)]
    pub inventory: bool,
}

impl Client {
    /// Fetches a single project.
    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.get(&format!("/projects/{project_id}")).await
    }

    /// Lists projects visible to the credential, optionally scoped to an
    /// organization or narrowed by a display-name query.
    pub async fn list_projects(
        &self,
        organization_id: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<Project>> {
        let mut params = Vec::new();
        if let Some(organization_id) = organization_id {
            params.push((
                "organization".to_string(),
                format!("organizations/{organization_id}"),
            ));
        }
        if let Some(query) = query {
            params.push(("query".to_string(), query.to_string()));
        }
        self.paginated_get("/projects", "projects", params, DEFAULT_PAGE_SIZE)
            .await
    }

    /// Creates a project under the given organization.
    pub async fn create_project(
        &self,
        organization_id: &str,
        display_name: &str,
    ) -> Result<Project> {
        self.post(
            "/projects",
            &json!({
                "organization": format!("organizations/{organization_id}"),
                "displayName": display_name,
            }),
        )
        .await
    }

    /// Renames a project.
    pub async fn update_project(&self, project_id: &str, display_name: &str) -> Result<Project> {
        self.patch(
            &format!("/projects/{project_id}"),
            &json!({ "displayName": display_name }),
        )
        .await
    }

    /// Deletes a project. Fails with a conflict while devices remain in it.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.delete(&format!("/projects/{project_id}")).await
    }
}
