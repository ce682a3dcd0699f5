//! In-memory control plane for tests
//!
//! Each workspace replays a queue of scripted observations on `get_status`;
//! once the queue is drained the last observation sticks. Failures can be
//! injected per workspace and per call.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dashprobe_common::{WorkspaceRef, WorkspaceStatus, WorkspaceSummary};

use super::ControlPlane;
use crate::error::{E2eError, E2eResult};

/// What a single status read returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Status(WorkspaceStatus),
    NotFound,
    TransportError(String),
}

impl From<WorkspaceStatus> for Observation {
    fn from(status: WorkspaceStatus) -> Self {
        Observation::Status(status)
    }
}

/// Per-workspace call counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub get_status: u32,
    pub start: u32,
    pub stop: u32,
    pub delete: u32,
}

#[derive(Debug)]
struct MockWorkspace {
    script: VecDeque<Observation>,
    current: Observation,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    fail_delete: Option<String>,
}

impl MockWorkspace {
    fn new(status: WorkspaceStatus) -> Self {
        Self {
            script: VecDeque::new(),
            current: Observation::Status(status),
            fail_start: None,
            fail_stop: None,
            fail_delete: None,
        }
    }

    fn listed_status(&self) -> WorkspaceStatus {
        match self.current {
            Observation::Status(status) => status,
            _ => WorkspaceStatus::Unknown,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    workspaces: HashMap<WorkspaceRef, MockWorkspace>,
    calls: HashMap<WorkspaceRef, CallCounts>,
    list_calls: u32,
    fail_list: Option<String>,
}

/// Scripted control plane
#[derive(Debug, Default)]
pub struct MockControlPlane {
    state: Mutex<MockState>,
    auto_transitions: bool,
    request_latency: Option<Duration>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop requests script `Stopping, Stopped`; start requests script `Starting, Running`
    pub fn with_auto_transitions(mut self) -> Self {
        self.auto_transitions = true;
        self
    }

    /// Delay every start/stop/delete request
    pub fn with_request_latency(mut self, latency: Duration) -> Self {
        self.request_latency = Some(latency);
        self
    }

    pub fn add_workspace(&self, namespace: &str, name: &str, status: WorkspaceStatus) -> WorkspaceRef {
        let workspace = WorkspaceRef::new(namespace, name);
        self.state
            .lock()
            .workspaces
            .insert(workspace.clone(), MockWorkspace::new(status));
        workspace
    }

    /// Queue observations returned by subsequent status reads
    pub fn script<I, O>(&self, workspace: &WorkspaceRef, observations: I)
    where
        I: IntoIterator<Item = O>,
        O: Into<Observation>,
    {
        let mut state = self.state.lock();
        if let Some(ws) = state.workspaces.get_mut(workspace) {
            ws.script.extend(observations.into_iter().map(Into::into));
        }
    }

    pub fn fail_start(&self, workspace: &WorkspaceRef, message: &str) {
        self.with_workspace(workspace, |ws| ws.fail_start = Some(message.to_string()));
    }

    pub fn fail_stop(&self, workspace: &WorkspaceRef, message: &str) {
        self.with_workspace(workspace, |ws| ws.fail_stop = Some(message.to_string()));
    }

    pub fn fail_delete(&self, workspace: &WorkspaceRef, message: &str) {
        self.with_workspace(workspace, |ws| ws.fail_delete = Some(message.to_string()));
    }

    pub fn fail_list(&self, message: &str) {
        self.state.lock().fail_list = Some(message.to_string());
    }

    pub fn calls(&self, workspace: &WorkspaceRef) -> CallCounts {
        self.state
            .lock()
            .calls
            .get(workspace)
            .copied()
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().list_calls
    }

    /// Status a listing would report right now, without consuming the script
    pub fn current_status(&self, workspace: &WorkspaceRef) -> Option<WorkspaceStatus> {
        self.state
            .lock()
            .workspaces
            .get(workspace)
            .map(MockWorkspace::listed_status)
    }

    pub fn exists(&self, workspace: &WorkspaceRef) -> bool {
        self.state.lock().workspaces.contains_key(workspace)
    }

    fn with_workspace<F: FnOnce(&mut MockWorkspace)>(&self, workspace: &WorkspaceRef, f: F) {
        if let Some(ws) = self.state.lock().workspaces.get_mut(workspace) {
            f(ws);
        }
    }

    fn count<F: FnOnce(&mut CallCounts)>(state: &mut MockState, workspace: &WorkspaceRef, f: F) {
        f(state.calls.entry(workspace.clone()).or_default());
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.request_latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Shared path of start and stop requests
    fn toggle(
        &self,
        workspace: &WorkspaceRef,
        start: bool,
    ) -> E2eResult<()> {
        let mut state = self.state.lock();
        Self::count(&mut state, workspace, |c| {
            if start {
                c.start += 1
            } else {
                c.stop += 1
            }
        });

        let auto = self.auto_transitions;
        let ws = state
            .workspaces
            .get_mut(workspace)
            .ok_or_else(|| E2eError::NotFound(workspace.to_string()))?;

        let failure = if start { &ws.fail_start } else { &ws.fail_stop };
        if let Some(message) = failure {
            return Err(E2eError::Transport(message.clone()));
        }

        if auto {
            ws.script.clear();
            if start {
                ws.script.extend([
                    Observation::Status(WorkspaceStatus::Starting),
                    Observation::Status(WorkspaceStatus::Running),
                ]);
            } else {
                ws.script.extend([
                    Observation::Status(WorkspaceStatus::Stopping),
                    Observation::Status(WorkspaceStatus::Stopped),
                ]);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_status(&self, workspace: &WorkspaceRef) -> E2eResult<Option<WorkspaceStatus>> {
        let mut state = self.state.lock();
        Self::count(&mut state, workspace, |c| c.get_status += 1);

        let Some(ws) = state.workspaces.get_mut(workspace) else {
            return Ok(None);
        };
        if let Some(next) = ws.script.pop_front() {
            ws.current = next;
        }
        match &ws.current {
            Observation::Status(status) => Ok(Some(*status)),
            Observation::NotFound => Ok(None),
            Observation::TransportError(message) => Err(E2eError::Transport(message.clone())),
        }
    }

    async fn request_start(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        self.simulate_latency().await;
        self.toggle(workspace, true)
    }

    async fn request_stop(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        self.simulate_latency().await;
        self.toggle(workspace, false)
    }

    async fn request_delete(&self, workspace: &WorkspaceRef) -> E2eResult<()> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        Self::count(&mut state, workspace, |c| c.delete += 1);

        let ws = state
            .workspaces
            .get(workspace)
            .ok_or_else(|| E2eError::NotFound(workspace.to_string()))?;
        if let Some(message) = &ws.fail_delete {
            return Err(E2eError::Transport(message.clone()));
        }
        state.workspaces.remove(workspace);
        Ok(())
    }

    async fn list_workspaces(&self, namespace: &str) -> E2eResult<Vec<WorkspaceSummary>> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if let Some(message) = &state.fail_list {
            return Err(E2eError::Transport(message.clone()));
        }

        let mut summaries: Vec<WorkspaceSummary> = state
            .workspaces
            .iter()
            .filter(|(workspace, _)| workspace.namespace == namespace)
            .map(|(workspace, ws)| WorkspaceSummary::new(workspace.name.clone(), ws.listed_status()))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}
