//! Dashprobe CLI - Main Entry Point
//!
//! Lists, waits on, starts, stops and deletes dashboard workspaces using
//! the same orchestrator the end-to-end suites use.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use dashprobe_cli::commands::workspace;
use dashprobe_cli::output::{self, print_error};
use dashprobe_common::HarnessConfig;
use dashprobe_e2e::{connect, WorkspaceOrchestrator};

/// Dashprobe - workspace lifecycle for dashboard end-to-end suites
#[derive(Parser)]
#[command(name = "dashprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "DASHPROBE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Namespace holding the workspaces (overrides configuration)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage workspaces
    #[command(subcommand)]
    Workspace(workspace::WorkspaceCommands),

    /// Print the effective configuration
    Config,

    /// Show version information
    Version,
}

fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(dashprobe_common::default_config_path);
    debug!("Loading configuration from {}", path.display());

    let mut config = HarnessConfig::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config.apply_env_overrides()?;
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Version => {
            println!("dashprobe v{}", dashprobe_common::VERSION);
            return Ok(());
        }
        Commands::Config => {
            let config = load_config(&cli)?;
            println!("{}", render_config(&config, cli.format)?);
            return Ok(());
        }
        Commands::Workspace(_) => {}
    }

    let config = load_config(&cli)?;
    let control_plane = connect(&config.control_plane)?;
    debug!(
        "Using {} control plane for namespace {}",
        control_plane.name(),
        config.namespace
    );
    let orchestrator = WorkspaceOrchestrator::from_config(control_plane, &config)?;

    if let Commands::Workspace(cmd) = cli.command {
        workspace::execute(cmd, &orchestrator, cli.format).await?;
    }
    Ok(())
}

fn render_config(config: &HarnessConfig, format: output::OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        output::OutputFormat::Json => serde_json::to_string_pretty(config)?,
        output::OutputFormat::Yaml => serde_yaml::to_string(config)?,
        output::OutputFormat::Table | output::OutputFormat::Plain => toml::to_string_pretty(config)?,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_wait() {
        let cli = Cli::try_parse_from([
            "dashprobe",
            "--namespace",
            "qa",
            "workspace",
            "wait",
            "java-lombok",
            "running",
            "--attempts",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.namespace.as_deref(), Some("qa"));
        match cli.command {
            Commands::Workspace(workspace::WorkspaceCommands::Wait { name, status, attempts, .. }) => {
                assert_eq!(name, "java-lombok");
                assert_eq!(status, workspace::StatusArg::Running);
                assert_eq!(attempts, Some(3));
            }
            _ => panic!("expected workspace wait"),
        }
    }

    #[test]
    fn test_parse_bulk_with_format() {
        let cli = Cli::try_parse_from(["dashprobe", "workspace", "stop-delete-all", "--format", "json"]).unwrap();
        assert_eq!(cli.format, output::OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Workspace(workspace::WorkspaceCommands::StopDeleteAll)
        ));
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(Cli::try_parse_from(["dashprobe", "workspace", "wait", "ws", "paused"]).is_err());
    }
}
