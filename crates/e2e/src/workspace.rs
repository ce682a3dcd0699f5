//! Workspace lifecycle orchestration
//!
//! Drives workspaces through stop/start/delete by issuing requests to the
//! control plane and polling their status with the poll-wait engine. The
//! orchestrator never changes state itself and caches nothing between polls.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use dashprobe_common::{
    poll_until_deadline, HarnessConfig, PollOutcome, PollPolicy, WorkspaceRef, WorkspaceStatus,
    WorkspaceSummary,
};

use crate::control_plane::ControlPlane;
use crate::error::{AggregateError, E2eError, E2eResult};

/// Budgets used by the orchestrator's operations
#[derive(Debug, Clone)]
pub struct LifecyclePolicies {
    /// Default budget for `wait_workspace_status` callers
    pub status: PollPolicy,
    /// Wait for `Stopped` after a stop request
    pub stop: PollPolicy,
    /// Wait for `Running` after a start request
    pub start: PollPolicy,
    /// Per-workspace operations in flight during bulk calls
    pub concurrency: usize,
    /// Consecutive failed status reads tolerated during one wait
    pub max_transport_failures: u32,
}

impl LifecyclePolicies {
    pub fn from_config(config: &HarnessConfig) -> E2eResult<Self> {
        Ok(Self {
            status: config.timeouts.status_policy()?,
            stop: config.timeouts.stop_policy()?,
            start: config.timeouts.start_policy()?,
            concurrency: config.bulk.concurrency.max(1),
            max_transport_failures: config.control_plane.max_transport_failures.max(1),
        })
    }
}

/// Successful outcome of a bulk operation
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub operation: String,
    pub succeeded: Vec<String>,
}

/// Side-effecting control-plane calls
#[derive(Debug, Clone, Copy)]
enum Request {
    Start,
    Stop,
    Delete,
}

impl Request {
    fn as_str(&self) -> &'static str {
        match self {
            Request::Start => "start",
            Request::Stop => "stop",
            Request::Delete => "delete",
        }
    }

    async fn send(self, control_plane: &dyn ControlPlane, workspace: &WorkspaceRef) -> E2eResult<()> {
        match self {
            Request::Start => control_plane.request_start(workspace).await,
            Request::Stop => control_plane.request_stop(workspace).await,
            Request::Delete => control_plane.request_delete(workspace).await,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last thing a status wait saw
#[derive(Debug)]
enum LastSeen {
    Status(WorkspaceStatus),
    NotFound,
    Transport(E2eError),
}

/// Cause of a failed read without the `Transport` prefix
fn transport_detail(error: &E2eError) -> String {
    match error {
        E2eError::Transport(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Drives workspaces in one namespace
pub struct WorkspaceOrchestrator {
    control_plane: Arc<dyn ControlPlane>,
    namespace: String,
    policies: LifecyclePolicies,
}

impl WorkspaceOrchestrator {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        namespace: impl Into<String>,
        policies: LifecyclePolicies,
    ) -> Self {
        Self {
            control_plane,
            namespace: namespace.into(),
            policies,
        }
    }

    /// Wire an orchestrator from the harness configuration
    pub fn from_config(control_plane: Arc<dyn ControlPlane>, config: &HarnessConfig) -> E2eResult<Self> {
        config.validate()?;
        Ok(Self::new(
            control_plane,
            config.namespace.clone(),
            LifecyclePolicies::from_config(config)?,
        ))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn policies(&self) -> &LifecyclePolicies {
        &self.policies
    }

    /// Reference to a workspace in this orchestrator's namespace
    pub fn workspace(&self, name: &str) -> WorkspaceRef {
        WorkspaceRef::new(self.namespace.clone(), name)
    }

    /// Single status read
    pub async fn get_workspace_status(&self, workspace: &WorkspaceRef) -> E2eResult<WorkspaceStatus> {
        self.control_plane
            .get_status(workspace)
            .await?
            .ok_or_else(|| E2eError::NotFound(workspace.to_string()))
    }

    /// Every workspace in the namespace
    pub async fn list_workspaces(&self) -> E2eResult<Vec<WorkspaceSummary>> {
        self.control_plane.list_workspaces(&self.namespace).await
    }

    /// Poll until the workspace reports `expected`
    pub async fn wait_workspace_status(
        &self,
        workspace: &WorkspaceRef,
        expected: WorkspaceStatus,
        policy: &PollPolicy,
    ) -> E2eResult<()> {
        info!("Waiting for workspace {} to reach '{}'", workspace, expected);
        self.wait_for(workspace, expected, policy, policy.deadline_from(Instant::now()))
            .await
    }

    /// Request a start and wait for `Running`. Already running is success.
    pub async fn start_workspace_by_name(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        info!("Starting workspace {}", workspace);
        let policy = self.policies.start;
        let deadline = policy.deadline_from(Instant::now());

        match self.read_status(workspace, deadline).await? {
            None => return Err(E2eError::NotFound(workspace.to_string())),
            Some(WorkspaceStatus::Running) => {
                info!("Workspace {} is already running", workspace);
                return Ok(());
            }
            Some(_) => {}
        }

        self.send_request(workspace, Request::Start, deadline).await?;
        self.wait_for(workspace, WorkspaceStatus::Running, &policy, deadline)
            .await
    }

    /// Request a stop and wait for `Stopped`. Already stopped is success.
    pub async fn stop_workspace_by_name(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        let deadline = self.policies.stop.deadline_from(Instant::now());
        self.stop_until(workspace, deadline).await
    }

    async fn stop_until(&self, workspace: &WorkspaceRef, deadline: Option<Instant>) -> E2eResult<()> {
        info!("Stopping workspace {}", workspace);
        let policy = self.policies.stop;

        match self.read_status(workspace, deadline).await? {
            None => return Err(E2eError::NotFound(workspace.to_string())),
            Some(WorkspaceStatus::Stopped) => {
                info!("Workspace {} is already stopped", workspace);
                return Ok(());
            }
            Some(_) => {}
        }

        self.send_request(workspace, Request::Stop, deadline).await?;
        self.wait_for(workspace, WorkspaceStatus::Stopped, &policy, deadline)
            .await
    }

    /// Delete without stopping first. Returns once the request is acknowledged.
    pub async fn delete_workspace_by_name(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        info!("Deleting workspace {}", workspace);
        self.send_request(workspace, Request::Delete, None).await
    }

    /// Stop with status confirmation, then delete.
    ///
    /// The delete runs even when the stop fails; the stop failure is what
    /// gets reported. Both steps share the stop policy's deadline.
    pub async fn stop_and_delete_workspace_by_name(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        let deadline = self.policies.stop.deadline_from(Instant::now());
        let stopped = self.stop_until(workspace, deadline).await;
        if let Err(e) = &stopped {
            warn!("Stopping {} failed, deleting anyway: {}", workspace, e);
        }

        // Past the deadline the delete is still sent, just not awaited
        info!("Deleting workspace {}", workspace);
        let deleted = self.send_request(workspace, Request::Delete, deadline).await;
        match (stopped, deleted) {
            (Err(stop_error), Err(delete_error)) => {
                warn!("Deleting {} failed as well: {}", workspace, delete_error);
                Err(stop_error)
            }
            (Err(stop_error), Ok(())) => Err(stop_error),
            (Ok(()), deleted) => deleted,
        }
    }

    /// Stop every workspace that is not already stopped
    pub async fn stop_all_running_workspaces(&self) -> E2eResult<BulkReport> {
        let targets = self.non_stopped_workspaces().await?;
        self.fan_out("stop all running workspaces", targets, |workspace| async move {
            self.stop_workspace_by_name(&workspace).await
        })
        .await
    }

    /// Stop then delete every workspace that is not already stopped
    pub async fn stop_and_delete_all_running_workspaces(&self) -> E2eResult<BulkReport> {
        let targets = self.non_stopped_workspaces().await?;
        self.fan_out("stop and delete all running workspaces", targets, |workspace| async move {
            self.stop_and_delete_workspace_by_name(&workspace).await
        })
        .await
    }

    /// Force-delete every workspace regardless of status
    pub async fn delete_all_workspaces(&self) -> E2eResult<BulkReport> {
        let targets: Vec<String> = self
            .list_workspaces()
            .await?
            .into_iter()
            .map(|summary| summary.name)
            .collect();
        self.fan_out("delete all workspaces", targets, |workspace| async move {
            self.delete_workspace_by_name(&workspace).await
        })
        .await
    }

    async fn non_stopped_workspaces(&self) -> E2eResult<Vec<String>> {
        Ok(self
            .list_workspaces()
            .await?
            .into_iter()
            .filter(|summary| summary.status != WorkspaceStatus::Stopped)
            .map(|summary| summary.name)
            .collect())
    }

    /// Run `op` for each workspace with bounded concurrency and collect failures
    async fn fan_out<F, Fut>(&self, operation: &str, names: Vec<String>, op: F) -> E2eResult<BulkReport>
    where
        F: Fn(WorkspaceRef) -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        info!(
            "{}: {} workspace(s) in {} (concurrency {})",
            operation,
            names.len(),
            self.namespace,
            self.policies.concurrency
        );

        let results: Vec<(String, E2eResult<()>)> = stream::iter(names)
            .map(|name| {
                let pending = op(self.workspace(&name));
                async move { (name, pending.await) }
            })
            .buffer_unordered(self.policies.concurrency.max(1))
            .collect()
            .await;

        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(()) => succeeded.push(name),
                Err(e) => {
                    warn!("{}: {} failed: {}", operation, name, e);
                    failures.push((name, e));
                }
            }
        }
        succeeded.sort();
        failures.sort_by(|a, b| a.0.cmp(&b.0));

        if failures.is_empty() {
            info!("{}: {} workspace(s) done", operation, succeeded.len());
            Ok(BulkReport {
                operation: operation.to_string(),
                succeeded,
            })
        } else {
            Err(AggregateError {
                operation: operation.to_string(),
                succeeded,
                failures,
            }
            .into())
        }
    }

    /// One status read bounded by the operation deadline
    async fn read_status(
        &self,
        workspace: &WorkspaceRef,
        deadline: Option<Instant>,
    ) -> E2eResult<Option<WorkspaceStatus>> {
        let read = self.control_plane.get_status(workspace);
        match deadline {
            Some(deadline) => timeout_at(deadline, read).await.map_err(|_| E2eError::RequestTimeout {
                workspace: workspace.to_string(),
                request: "status",
            })?,
            None => read.await,
        }
    }

    /// Issue a request. Under a deadline the request runs as its own task so
    /// it can finish after the caller has given up on it.
    async fn send_request(
        &self,
        workspace: &WorkspaceRef,
        request: Request,
        deadline: Option<Instant>,
    ) -> E2eResult<()> {
        debug!("Sending {} request for {} via {}", request, workspace, self.control_plane.name());

        let Some(deadline) = deadline else {
            return request.send(self.control_plane.as_ref(), workspace).await;
        };

        let control_plane = Arc::clone(&self.control_plane);
        let target = workspace.clone();
        let task = tokio::spawn(async move { request.send(control_plane.as_ref(), &target).await });

        match timeout_at(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(E2eError::Transport(format!(
                "{} request for {} did not complete: {}",
                request, workspace, join_error
            ))),
            Err(_) => {
                warn!("{} request for {} still in flight at the deadline", request, workspace);
                Err(E2eError::RequestTimeout {
                    workspace: workspace.to_string(),
                    request: request.as_str(),
                })
            }
        }
    }

    /// Status wait shared by every operation
    async fn wait_for(
        &self,
        workspace: &WorkspaceRef,
        expected: WorkspaceStatus,
        policy: &PollPolicy,
        deadline: Option<Instant>,
    ) -> E2eResult<()> {
        let last_seen = Mutex::new(LastSeen::Status(WorkspaceStatus::Unknown));
        let consecutive_failures = AtomicU32::new(0);
        let threshold = self.policies.max_transport_failures.max(1);

        let outcome = poll_until_deadline(policy, deadline, || {
            let last_seen = &last_seen;
            let consecutive_failures = &consecutive_failures;
            async move {
                match self.control_plane.get_status(workspace).await {
                    Ok(Some(status)) => {
                        consecutive_failures.store(0, Ordering::Relaxed);
                        *last_seen.lock() = LastSeen::Status(status);
                        debug!("Workspace {} is '{}', expecting '{}'", workspace, status, expected);

                        if status == expected {
                            Ok(Some(()))
                        } else if status == WorkspaceStatus::Failed
                            && matches!(expected, WorkspaceStatus::Running | WorkspaceStatus::Starting)
                        {
                            Err(E2eError::WorkspaceFailed(workspace.to_string()))
                        } else {
                            Ok(None)
                        }
                    }
                    Ok(None) => {
                        consecutive_failures.store(0, Ordering::Relaxed);
                        *last_seen.lock() = LastSeen::NotFound;
                        debug!("Workspace {} not found yet", workspace);
                        Ok((expected == WorkspaceStatus::Unknown).then_some(()))
                    }
                    Err(e) if e.is_transport() => {
                        let failures = consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(
                            "Status read for {} failed ({}/{}): {}",
                            workspace, failures, threshold, e
                        );
                        if failures >= threshold {
                            Err(E2eError::Transport(format!(
                                "{} consecutive status reads failed for {}: {}",
                                failures,
                                workspace,
                                transport_detail(&e)
                            )))
                        } else {
                            *last_seen.lock() = LastSeen::Transport(e);
                            Ok(None)
                        }
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .await;

        let attempts = match outcome {
            PollOutcome::Satisfied(()) => {
                info!("Workspace {} reached '{}'", workspace, expected);
                return Ok(());
            }
            PollOutcome::PredicateError(e) => return Err(e),
            PollOutcome::Exhausted { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => attempts,
        };

        Err(match last_seen.into_inner() {
            LastSeen::NotFound => E2eError::NotFound(workspace.to_string()),
            LastSeen::Transport(e) => e,
            LastSeen::Status(last_seen) => E2eError::Timeout {
                workspace: workspace.to_string(),
                expected,
                last_seen,
                attempts,
            },
        })
    }
}
