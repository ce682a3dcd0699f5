//! Control plane backed by direct API server calls

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use dashprobe_common::{WorkspaceRef, WorkspaceStatus, WorkspaceSummary};

use super::resource::{started_patch, DevWorkspace, DevWorkspaceList, API_GROUP, API_VERSION, PLURAL};
use super::ControlPlane;
use crate::error::{E2eError, E2eResult};

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Talks to the Kubernetes API server over HTTPS
pub struct RestControlPlane {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl RestControlPlane {
    pub fn new(
        api_url: &str,
        token: Option<String>,
        insecure_tls: bool,
        request_timeout: Duration,
    ) -> E2eResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn collection_url(&self, namespace: &str) -> String {
        format!(
            "{}/apis/{}/{}/namespaces/{}/{}",
            self.api_url, API_GROUP, API_VERSION, namespace, PLURAL
        )
    }

    fn resource_url(&self, workspace: &WorkspaceRef) -> String {
        format!("{}/{}", self.collection_url(&workspace.namespace), workspace.name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map a response of a side-effecting call
    async fn acknowledge(workspace: &WorkspaceRef, response: reqwest::Response) -> E2eResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(E2eError::NotFound(workspace.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(E2eError::Transport(format!("{}: {}", status, body.trim())))
    }
}

#[async_trait]
impl ControlPlane for RestControlPlane {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn get_status(&self, workspace: &WorkspaceRef) -> E2eResult<Option<WorkspaceStatus>> {
        let url = self.resource_url(workspace);
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let resource: DevWorkspace = response.json().await?;
                Ok(Some(resource.workspace_status()))
            }
            status => Err(E2eError::Transport(format!("GET {} returned {}", url, status))),
        }
    }

    async fn request_start(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        let url = self.resource_url(workspace);
        debug!("PATCH {} started=true", url);

        let response = self
            .authorize(self.client.patch(&url))
            .header(header::CONTENT_TYPE, MERGE_PATCH)
            .body(started_patch(true).to_string())
            .send()
            .await?;
        Self::acknowledge(workspace, response).await
    }

    async fn request_stop(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        let url = self.resource_url(workspace);
        debug!("PATCH {} started=false", url);

        let response = self
            .authorize(self.client.patch(&url))
            .header(header::CONTENT_TYPE, MERGE_PATCH)
            .body(started_patch(false).to_string())
            .send()
            .await?;
        Self::acknowledge(workspace, response).await
    }

    async fn request_delete(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        let url = self.resource_url(workspace);
        debug!("DELETE {}", url);

        let response = self.authorize(self.client.delete(&url)).send().await?;
        Self::acknowledge(workspace, response).await
    }

    async fn list_workspaces(&self, namespace: &str) -> E2eResult<Vec<WorkspaceSummary>> {
        let url = self.collection_url(namespace);
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(E2eError::Transport(format!("GET {} returned {}", url, status)));
        }
        let list: DevWorkspaceList = response.json().await?;
        Ok(list.summaries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_urls() {
        let cp = RestControlPlane::new(
            "https://api.cluster.example:6443/",
            Some("sha256~token".to_string()),
            true,
            Duration::from_secs(10),
        )
        .unwrap();

        let ws = WorkspaceRef::new("admin-devspaces", "nodejs-web-app");
        assert_eq!(
            cp.resource_url(&ws),
            "https://api.cluster.example:6443/apis/workspace.devfile.io/v1alpha2/namespaces/admin-devspaces/devworkspaces/nodejs-web-app"
        );
        assert!(cp.collection_url("qa").ends_with("/namespaces/qa/devworkspaces"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let cp = RestControlPlane::new("http://127.0.0.1:1", None, false, Duration::from_secs(2))
            .unwrap();
        let err = cp.list_workspaces("qa").await.unwrap_err();
        assert!(err.is_transport());
    }
}
