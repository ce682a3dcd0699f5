//! DevWorkspace custom resource as returned by the API server

use serde::Deserialize;

use dashprobe_common::{WorkspaceStatus, WorkspaceSummary};

pub const API_GROUP: &str = "workspace.devfile.io";
pub const API_VERSION: &str = "v1alpha2";
pub const PLURAL: &str = "devworkspaces";

/// Only the fields the harness reads
#[derive(Debug, Clone, Deserialize)]
pub struct DevWorkspace {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<DevWorkspaceStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevWorkspaceStatus {
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevWorkspaceList {
    #[serde(default)]
    pub items: Vec<DevWorkspace>,
}

impl DevWorkspace {
    /// A resource without a phase has not been picked up by the operator yet
    pub fn workspace_status(&self) -> WorkspaceStatus {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(WorkspaceStatus::from_phase)
            .unwrap_or(WorkspaceStatus::Unknown)
    }

    pub fn summary(&self) -> WorkspaceSummary {
        WorkspaceSummary::new(self.metadata.name.clone(), self.workspace_status())
    }
}

impl DevWorkspaceList {
    pub fn summaries(&self) -> Vec<WorkspaceSummary> {
        self.items.iter().map(DevWorkspace::summary).collect()
    }
}

/// Merge patch toggling `spec.started`
pub fn started_patch(started: bool) -> serde_json::Value {
    serde_json::json!({ "spec": { "started": started } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_resource() {
        let json = r#"{
            "apiVersion": "workspace.devfile.io/v1alpha2",
            "kind": "DevWorkspace",
            "metadata": { "name": "empty-ws", "namespace": "admin-devspaces" },
            "spec": { "started": true },
            "status": { "phase": "Running", "mainUrl": "https://example/ws" }
        }"#;
        let ws: DevWorkspace = serde_json::from_str(json).unwrap();
        assert_eq!(ws.summary(), WorkspaceSummary::new("empty-ws", WorkspaceStatus::Running));
    }

    #[test]
    fn test_missing_status_is_unknown() {
        let json = r#"{ "metadata": { "name": "fresh" } }"#;
        let ws: DevWorkspace = serde_json::from_str(json).unwrap();
        assert_eq!(ws.workspace_status(), WorkspaceStatus::Unknown);
    }

    #[test]
    fn test_parse_list() {
        let json = r#"{
            "kind": "DevWorkspaceList",
            "items": [
                { "metadata": { "name": "a" }, "status": { "phase": "Stopped" } },
                { "metadata": { "name": "b" }, "status": { "phase": "Failing" } },
                { "metadata": { "name": "c" }, "status": { "phase": "Terminating" } }
            ]
        }"#;
        let list: DevWorkspaceList = serde_json::from_str(json).unwrap();
        let statuses: Vec<_> = list.summaries().into_iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![WorkspaceStatus::Stopped, WorkspaceStatus::Failed, WorkspaceStatus::Unknown]
        );
    }

    #[test]
    fn test_started_patch() {
        assert_eq!(
            started_patch(false).to_string(),
            r#"{"spec":{"started":false}}"#
        );
    }
}
