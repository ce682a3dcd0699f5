//! Dashprobe workspace orchestration
//!
//! Library consumed by dashboard end-to-end suites to put workspaces into a
//! known state before and after browser tests:
//! - Waits for a workspace to reach a status
//! - Starts, stops and deletes single workspaces
//! - Stops and deletes every workspace in a namespace, tolerating partial failure
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  WorkspaceOrchestrator                      │
//! │    ├── wait_workspace_status(ws, status, policy)            │
//! │    ├── start / stop / delete / stop_and_delete (by name)    │
//! │    └── stop_all / stop_and_delete_all / delete_all          │
//! │          (bounded fan-out, AggregateError on failures)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  poll_until (dashprobe-common)                              │
//! │    attempts × interval, clipped by the deadline             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  dyn ControlPlane                                           │
//! │    ├── KubectlControlPlane  (kubectl / oc)                  │
//! │    ├── RestControlPlane     (API server over HTTPS)         │
//! │    └── MockControlPlane     (scripted, for tests)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod control_plane;
pub mod driver;
pub mod error;
pub mod workspace;

pub use control_plane::{connect, ControlPlane};
pub use driver::{Driver, DriverHelper, Locator};
pub use error::{AggregateError, E2eError, E2eResult};
pub use workspace::{BulkReport, LifecyclePolicies, WorkspaceOrchestrator};
