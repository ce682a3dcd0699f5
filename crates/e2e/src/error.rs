//! Error types for workspace orchestration

use std::fmt;
use thiserror::Error;

use dashprobe_common::WorkspaceStatus;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Timed out waiting for workspace {workspace} to reach '{expected}' after {attempts} attempt(s), last status: '{last_seen}'")]
    Timeout {
        workspace: String,
        expected: WorkspaceStatus,
        last_seen: WorkspaceStatus,
        attempts: u32,
    },

    #[error("Timed out waiting for the {request} request on workspace {workspace}")]
    RequestTimeout {
        workspace: String,
        request: &'static str,
    },

    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("Control plane error: {0}")]
    Transport(String),

    #[error("Workspace {0} entered the Failed state")]
    WorkspaceFailed(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Stale element: {0}")]
    StaleElement(String),

    #[error("Timeout waiting for: {0}")]
    ElementTimeout(String),

    #[error("Configuration error: {0}")]
    Config(#[from] dashprobe_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Failures of the control-plane call itself, as opposed to workspace state
    pub fn is_transport(&self) -> bool {
        matches!(self, E2eError::Transport(_) | E2eError::Http(_) | E2eError::Io(_))
    }

    /// Either kind of deadline or budget exhaustion
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            E2eError::Timeout { .. } | E2eError::RequestTimeout { .. } | E2eError::ElementTimeout(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Per-workspace failures collected by a bulk operation
#[derive(Debug)]
pub struct AggregateError {
    pub operation: String,
    pub succeeded: Vec<String>,
    pub failures: Vec<(String, E2eError)>,
}

impl AggregateError {
    /// Names of the workspaces that failed, in report order
    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for {} of {} workspace(s)",
            self.operation,
            self.failures.len(),
            self.failures.len() + self.succeeded.len()
        )?;
        for (name, cause) in &self.failures {
            write!(f, "; {name}: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
