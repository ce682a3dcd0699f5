//! Dashprobe CLI
//!
//! Command-line front end over the workspace orchestrator, for preparing
//! and cleaning up namespaces around dashboard test runs.

pub mod commands;
pub mod output;
