//! Control plane backed by the `kubectl` / `oc` command line

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use dashprobe_common::{WorkspaceRef, WorkspaceStatus, WorkspaceSummary};

use super::resource::{started_patch, DevWorkspace, DevWorkspaceList, PLURAL};
use super::ControlPlane;
use crate::error::{E2eError, E2eResult};

/// Outcome of one CLI invocation
#[derive(Debug)]
enum Reply {
    Success(String),
    NotFound(String),
    Failed(String),
}

/// Shells out to a kubectl-compatible binary
pub struct KubectlControlPlane {
    binary: String,
    request_timeout: Duration,
}

impl KubectlControlPlane {
    pub fn new(binary: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            request_timeout,
        }
    }

    async fn run(&self, args: &[String]) -> E2eResult<Reply> {
        debug!("{} {}", self.binary, args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.request_timeout, cmd.output())
            .await
            .map_err(|_| {
                E2eError::Transport(format!(
                    "{} {} timed out after {:?}",
                    self.binary,
                    args.first().map(String::as_str).unwrap_or_default(),
                    self.request_timeout
                ))
            })?
            .map_err(|e| E2eError::Transport(format!("failed to run {}: {}", self.binary, e)))?;

        if output.status.success() {
            return Ok(Reply::Success(
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_not_found(&stderr) {
            Ok(Reply::NotFound(stderr))
        } else {
            Ok(Reply::Failed(stderr))
        }
    }

    /// Run a side-effecting command against one workspace
    async fn command(&self, workspace: &WorkspaceRef, args: Vec<String>) -> E2eResult<()> {
        match self.run(&args).await? {
            Reply::Success(_) => Ok(()),
            Reply::NotFound(_) => Err(E2eError::NotFound(workspace.to_string())),
            Reply::Failed(stderr) => Err(E2eError::Transport(stderr)),
        }
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains("not found")
}

fn get_args(workspace: &WorkspaceRef) -> Vec<String> {
    vec![
        "get".to_string(),
        PLURAL.to_string(),
        workspace.name.clone(),
        "-n".to_string(),
        workspace.namespace.clone(),
        "-o".to_string(),
        "json".to_string(),
    ]
}

fn patch_args(workspace: &WorkspaceRef, started: bool) -> Vec<String> {
    vec![
        "patch".to_string(),
        PLURAL.to_string(),
        workspace.name.clone(),
        "-n".to_string(),
        workspace.namespace.clone(),
        "--type=merge".to_string(),
        "-p".to_string(),
        started_patch(started).to_string(),
    ]
}

fn delete_args(workspace: &WorkspaceRef) -> Vec<String> {
    vec![
        "delete".to_string(),
        PLURAL.to_string(),
        workspace.name.clone(),
        "-n".to_string(),
        workspace.namespace.clone(),
        "--wait=false".to_string(),
    ]
}

fn list_args(namespace: &str) -> Vec<String> {
    vec![
        "get".to_string(),
        PLURAL.to_string(),
        "-n".to_string(),
        namespace.to_string(),
        "-o".to_string(),
        "json".to_string(),
    ]
}

#[async_trait]
impl ControlPlane for KubectlControlPlane {
    fn name(&self) -> &'static str {
        "kubectl"
    }

    async fn get_status(&self, workspace: &WorkspaceRef) -> E2eResult<Option<WorkspaceStatus>> {
        match self.run(&get_args(workspace)).await? {
            Reply::Success(stdout) => {
                let resource: DevWorkspace = serde_json::from_str(&stdout)?;
                Ok(Some(resource.workspace_status()))
            }
            Reply::NotFound(_) => Ok(None),
            Reply::Failed(stderr) => Err(E2eError::Transport(stderr)),
        }
    }

    async fn request_start(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        self.command(workspace, patch_args(workspace, true)).await
    }

    async fn request_stop(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        self.command(workspace, patch_args(workspace, false)).await
    }

    async fn request_delete(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        self.command(workspace, delete_args(workspace)).await
    }

    async fn list_workspaces(&self, namespace: &str) -> E2eResult<Vec<WorkspaceSummary>> {
        match self.run(&list_args(namespace)).await? {
            Reply::Success(stdout) => {
                let list: DevWorkspaceList = serde_json::from_str(&stdout)?;
                Ok(list.summaries())
            }
            Reply::NotFound(stderr) | Reply::Failed(stderr) => Err(E2eError::Transport(stderr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(r#"Error from server (NotFound): devworkspaces.workspace.devfile.io "ws" not found"#, true)]
    #[test_case(r#"error: the server doesn't have a resource type "devworkspaces""#, false)]
    #[test_case("error: You must be logged in to the server (Unauthorized)", false)]
    #[test_case(r#"Error from server (NotFound): namespaces "qa" not found"#, true)]
    fn test_not_found_detection(stderr: &str, expected: bool) {
        assert_eq!(is_not_found(stderr), expected);
    }

    #[test]
    fn test_patch_args() {
        let ws = WorkspaceRef::new("user-ns", "python-ws");
        let args = patch_args(&ws, false);
        assert_eq!(args[0], "patch");
        assert_eq!(args[2], "python-ws");
        assert_eq!(args[4], "user-ns");
        assert_eq!(args.last().unwrap(), r#"{"spec":{"started":false}}"#);
    }

    #[test]
    fn test_delete_does_not_wait() {
        let ws = WorkspaceRef::new("user-ns", "python-ws");
        assert!(delete_args(&ws).contains(&"--wait=false".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport_error() {
        let cp = KubectlControlPlane::new("dashprobe-no-such-binary", Duration::from_secs(5));
        let err = cp
            .get_status(&WorkspaceRef::new("ns", "ws"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
