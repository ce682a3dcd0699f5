//! Core types for dashprobe

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a workspace as reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", from = "String")]
pub enum WorkspaceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
    /// Status not observable yet, or a phase this harness does not know
    Unknown,
}

impl WorkspaceStatus {
    /// Parse a control-plane phase string.
    ///
    /// Matching is case-insensitive. Unrecognised phases map to `Unknown`
    /// so that polling keeps going across schema drift.
    pub fn from_phase(phase: &str) -> Self {
        match phase.trim().to_ascii_lowercase().as_str() {
            "stopped" => Self::Stopped,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "failed" | "failing" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Terminal statuses see no further transition without an external command
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl Default for WorkspaceStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl From<String> for WorkspaceStatus {
    fn from(phase: String) -> Self {
        Self::from_phase(&phase)
    }
}

impl std::str::FromStr for WorkspaceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_phase(s))
    }
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a workspace on the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub namespace: String,
    pub name: String,
}

impl WorkspaceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkspaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One entry of a namespace listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub name: String,
    pub status: WorkspaceStatus,
}

impl WorkspaceSummary {
    pub fn new(name: impl Into<String>, status: WorkspaceStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}
