//! Control-plane clients
//!
//! The orchestrator only needs four calls from the cluster: read a status,
//! request start/stop, request delete, and list a namespace. Each backend
//! implements [`ControlPlane`]; the orchestrator holds it as
//! `Arc<dyn ControlPlane>` so one client is shared by concurrent operations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashprobe_common::config::{BackendKind, ControlPlaneConfig};
use dashprobe_common::{WorkspaceRef, WorkspaceStatus, WorkspaceSummary};

use crate::error::{E2eError, E2eResult};

pub mod kubectl;
pub mod mock;
pub mod resource;
pub mod rest;

pub use kubectl::KubectlControlPlane;
pub use mock::MockControlPlane;
pub use rest::RestControlPlane;

/// Narrow view of the cluster API consumed by the orchestrator
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Current status, or `None` when the workspace does not exist
    async fn get_status(&self, workspace: &WorkspaceRef) -> E2eResult<Option<WorkspaceStatus>>;

    /// Ask the control plane to start the workspace
    async fn request_start(&self, workspace: &WorkspaceRef) -> E2eResult<()>;

    /// Ask the control plane to stop the workspace
    async fn request_stop(&self, workspace: &WorkspaceRef) -> E2eResult<()>;

    /// Ask the control plane to delete the workspace
    async fn request_delete(&self, workspace: &WorkspaceRef) -> E2eResult<()>;

    /// Every workspace in the namespace with its status
    async fn list_workspaces(&self, namespace: &str) -> E2eResult<Vec<WorkspaceSummary>>;
}

/// Build the configured backend
pub fn connect(config: &ControlPlaneConfig) -> E2eResult<Arc<dyn ControlPlane>> {
    let request_timeout = Duration::from_millis(config.request_timeout_ms);
    match config.backend {
        BackendKind::Kubectl => Ok(Arc::new(KubectlControlPlane::new(
            config.kubectl_binary.clone(),
            request_timeout,
        ))),
        BackendKind::Rest => {
            let api_url = config.api_url.as_deref().ok_or_else(|| {
                E2eError::Config(dashprobe_common::Error::InvalidConfig(
                    "control_plane.api_url is required for the rest backend".to_string(),
                ))
            })?;
            Ok(Arc::new(RestControlPlane::new(
                api_url,
                config.token.clone(),
                config.insecure_tls,
                request_timeout,
            )?))
        }
    }
}
