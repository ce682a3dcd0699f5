//! Workspace Commands

use anyhow::{bail, Result};
use clap::{Subcommand, ValueEnum};
use serde::Serialize;

use dashprobe_common::{PollPolicy, WorkspaceStatus};
use dashprobe_e2e::{BulkReport, E2eError, E2eResult, WorkspaceOrchestrator};

use crate::output::{print_error, print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Debug, Subcommand)]
pub enum WorkspaceCommands {
    /// List workspaces in the namespace
    List,

    /// Show the current status of a workspace
    Status {
        /// Workspace name
        name: String,
    },

    /// Wait until a workspace reaches a status
    Wait {
        /// Workspace name
        name: String,

        /// Status to wait for
        #[arg(value_enum)]
        status: StatusArg,

        /// Override the configured number of status reads
        #[arg(long)]
        attempts: Option<u32>,

        /// Override the configured delay between reads, in milliseconds
        #[arg(long)]
        polling_ms: Option<u64>,

        /// Overall ceiling for the wait, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Start a workspace and wait for it to run
    Start {
        /// Workspace name
        name: String,
    },

    /// Stop a workspace and wait for it to stop
    Stop {
        /// Workspace name
        name: String,
    },

    /// Delete a workspace without stopping it
    Delete {
        /// Workspace name
        name: String,
    },

    /// Stop a workspace, then delete it
    StopDelete {
        /// Workspace name
        name: String,
    },

    /// Stop every workspace that is not stopped
    StopAll,

    /// Stop and delete every workspace that is not stopped
    StopDeleteAll,

    /// Delete every workspace regardless of status
    DeleteAll,
}

/// Statuses accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl From<StatusArg> for WorkspaceStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Stopped => WorkspaceStatus::Stopped,
            StatusArg::Starting => WorkspaceStatus::Starting,
            StatusArg::Running => WorkspaceStatus::Running,
            StatusArg::Stopping => WorkspaceStatus::Stopping,
            StatusArg::Failed => WorkspaceStatus::Failed,
        }
    }
}

/// One line of a bulk operation result
#[derive(Debug, Serialize)]
pub struct BulkRow {
    pub workspace: String,
    pub outcome: String,
}

impl BulkRow {
    fn ok(workspace: String) -> Self {
        Self {
            workspace,
            outcome: "ok".to_string(),
        }
    }
}

impl TableDisplay for BulkRow {
    fn headers() -> Vec<&'static str> {
        vec!["Workspace", "Outcome"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.workspace.clone(), self.outcome.clone()]
    }
}

/// Rows for every workspace a bulk operation touched, failures last
pub fn bulk_rows(result: &E2eResult<BulkReport>) -> Vec<BulkRow> {
    match result {
        Ok(report) => report.succeeded.iter().cloned().map(BulkRow::ok).collect(),
        Err(E2eError::Aggregate(aggregate)) => aggregate
            .succeeded
            .iter()
            .cloned()
            .map(BulkRow::ok)
            .chain(aggregate.failures.iter().map(|(name, cause)| BulkRow {
                workspace: name.clone(),
                outcome: format!("failed: {cause}"),
            }))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn wait_policy(
    default: &PollPolicy,
    attempts: Option<u32>,
    polling_ms: Option<u64>,
    timeout_ms: Option<u64>,
) -> Result<PollPolicy> {
    let attempts = attempts.unwrap_or(default.attempts());
    let polling_ms = polling_ms.unwrap_or(default.poll_interval().as_millis() as u64);
    let timeout_ms = timeout_ms.or(default.timeout().map(|t| t.as_millis() as u64));
    Ok(PollPolicy::from_millis(attempts, polling_ms, timeout_ms)?)
}

fn report_bulk(
    operation: &str,
    result: E2eResult<BulkReport>,
    format: OutputFormat,
) -> Result<()> {
    let rows = bulk_rows(&result);
    match result {
        Ok(report) => {
            if rows.is_empty() {
                print_warning(&format!("{operation}: nothing to do"));
            } else {
                print_list(&rows, format);
            }
            print_success(&format!("{}: {} workspace(s)", report.operation, report.succeeded.len()));
            Ok(())
        }
        Err(E2eError::Aggregate(aggregate)) => {
            print_list(&rows, format);
            for (name, cause) in &aggregate.failures {
                print_error(&format!("{name}: {cause}"));
            }
            bail!(
                "{} failed for {} workspace(s): {}",
                aggregate.operation,
                aggregate.failures.len(),
                aggregate.failed_names().join(", ")
            )
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn execute(
    cmd: WorkspaceCommands,
    orchestrator: &WorkspaceOrchestrator,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        WorkspaceCommands::List => {
            let workspaces = orchestrator.list_workspaces().await?;
            print_list(&workspaces, format);
        }

        WorkspaceCommands::Status { name } => {
            let workspace = orchestrator.workspace(&name);
            let status = orchestrator.get_workspace_status(&workspace).await?;
            print_item(&dashprobe_common::WorkspaceSummary::new(name, status), format);
        }

        WorkspaceCommands::Wait {
            name,
            status,
            attempts,
            polling_ms,
            timeout_ms,
        } => {
            let policy = wait_policy(&orchestrator.policies().status, attempts, polling_ms, timeout_ms)?;
            let expected = WorkspaceStatus::from(status);
            let workspace = orchestrator.workspace(&name);
            orchestrator
                .wait_workspace_status(&workspace, expected, &policy)
                .await?;
            print_success(&format!("Workspace '{}' is {}", name, expected));
        }

        WorkspaceCommands::Start { name } => {
            orchestrator
                .start_workspace_by_name(&orchestrator.workspace(&name))
                .await?;
            print_success(&format!("Workspace '{}' running", name));
        }

        WorkspaceCommands::Stop { name } => {
            orchestrator
                .stop_workspace_by_name(&orchestrator.workspace(&name))
                .await?;
            print_success(&format!("Workspace '{}' stopped", name));
        }

        WorkspaceCommands::Delete { name } => {
            orchestrator
                .delete_workspace_by_name(&orchestrator.workspace(&name))
                .await?;
            print_success(&format!("Workspace '{}' deletion requested", name));
        }

        WorkspaceCommands::StopDelete { name } => {
            orchestrator
                .stop_and_delete_workspace_by_name(&orchestrator.workspace(&name))
                .await?;
            print_success(&format!("Workspace '{}' stopped and deleted", name));
        }

        WorkspaceCommands::StopAll => {
            let result = orchestrator.stop_all_running_workspaces().await;
            report_bulk("stop all running workspaces", result, format)?;
        }

        WorkspaceCommands::StopDeleteAll => {
            let result = orchestrator.stop_and_delete_all_running_workspaces().await;
            report_bulk("stop and delete all running workspaces", result, format)?;
        }

        WorkspaceCommands::DeleteAll => {
            let result = orchestrator.delete_all_workspaces().await;
            report_bulk("delete all workspaces", result, format)?;
        }
    }

    Ok(())
}
