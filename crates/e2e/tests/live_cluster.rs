//! Smoke checks against a real cluster
//!
//! Marked ignored: they need `oc`/`kubectl` logged in to a cluster with the
//! DevWorkspace operator installed. Run with
//! `cargo test -p dashprobe-e2e --test live_cluster -- --ignored`.

use std::process::Command;

use dashprobe_common::HarnessConfig;
use dashprobe_e2e::{connect, WorkspaceOrchestrator};

fn in_path(bin: &str) -> bool {
    Command::new("sh")
        .arg("-lc")
        .arg(format!("command -v {bin} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn live_orchestrator() -> Option<WorkspaceOrchestrator> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut config = HarnessConfig::default();
    config.apply_env_overrides().expect("environment overrides");
    if !in_path(&config.control_plane.kubectl_binary) {
        eprintln!("{} not found in PATH; skipping", config.control_plane.kubectl_binary);
        return None;
    }

    let control_plane = connect(&config.control_plane).expect("connect control plane");
    Some(WorkspaceOrchestrator::from_config(control_plane, &config).expect("orchestrator"))
}

#[tokio::test]
#[ignore]
async fn lists_workspaces_in_namespace() {
    let Some(orchestrator) = live_orchestrator() else {
        return;
    };

    let workspaces = orchestrator.list_workspaces().await.expect("list workspaces");
    for summary in &workspaces {
        let status = orchestrator
            .get_workspace_status(&orchestrator.workspace(&summary.name))
            .await
            .expect("status of listed workspace");
        eprintln!("{}: {} (listed {})", summary.name, status, summary.status);
    }
}

/// Destructive: stops every running workspace in the configured namespace.
#[tokio::test]
#[ignore]
async fn stops_all_running_workspaces() {
    if std::env::var("DASHPROBE_ALLOW_DESTRUCTIVE").is_err() {
        eprintln!("DASHPROBE_ALLOW_DESTRUCTIVE not set; skipping");
        return;
    }
    let Some(orchestrator) = live_orchestrator() else {
        return;
    };

    let report = orchestrator
        .stop_all_running_workspaces()
        .await
        .expect("stop all running workspaces");
    eprintln!("stopped {} workspace(s)", report.succeeded.len());

    let remaining = orchestrator.list_workspaces().await.expect("list workspaces");
    assert!(remaining
        .iter()
        .all(|ws| ws.status == dashprobe_common::WorkspaceStatus::Stopped));
}
