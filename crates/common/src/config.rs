//! Harness configuration
//!
//! Loaded from a TOML file (defaults when absent), then overridden by
//! `DASHPROBE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::poll::PollPolicy;

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Namespace holding the user's workspaces
    pub namespace: String,

    /// Wait budgets
    pub timeouts: TimeoutConfig,

    /// Control-plane backend
    pub control_plane: ControlPlaneConfig,

    /// Bulk operation settings
    pub bulk: BulkConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            namespace: "admin-devspaces".to_string(),
            timeouts: TimeoutConfig::default(),
            control_plane: ControlPlaneConfig::default(),
            bulk: BulkConfig::default(),
        }
    }
}

/// Attempt and polling budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Attempts when waiting for a workspace status
    pub status_attempts: u32,
    pub status_polling_ms: u64,
    pub status_timeout_ms: Option<u64>,

    /// Budget for the wait that follows a stop request
    pub stop_attempts: u32,
    pub stop_polling_ms: u64,
    pub stop_timeout_ms: Option<u64>,

    /// Budget for the wait that follows a start request
    pub start_attempts: u32,
    pub start_polling_ms: u64,
    pub start_timeout_ms: Option<u64>,

    /// Default budget for browser element waits
    pub driver_attempts: u32,
    pub driver_polling_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            status_attempts: 90,
            status_polling_ms: 10_000,
            status_timeout_ms: None,
            stop_attempts: 60,
            stop_polling_ms: 5_000,
            stop_timeout_ms: None,
            start_attempts: 120,
            start_polling_ms: 5_000,
            start_timeout_ms: None,
            driver_attempts: 5,
            driver_polling_ms: 1_000,
        }
    }
}

impl TimeoutConfig {
    pub fn status_policy(&self) -> Result<PollPolicy> {
        PollPolicy::from_millis(self.status_attempts, self.status_polling_ms, self.status_timeout_ms)
    }

    pub fn stop_policy(&self) -> Result<PollPolicy> {
        PollPolicy::from_millis(self.stop_attempts, self.stop_polling_ms, self.stop_timeout_ms)
    }

    pub fn start_policy(&self) -> Result<PollPolicy> {
        PollPolicy::from_millis(self.start_attempts, self.start_polling_ms, self.start_timeout_ms)
    }

    pub fn driver_policy(&self) -> Result<PollPolicy> {
        PollPolicy::from_millis(self.driver_attempts, self.driver_polling_ms, None)
    }
}

/// Which control-plane client to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Shell out to `kubectl` / `oc`
    #[default]
    Kubectl,
    /// Talk to the API server over HTTPS
    Rest,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kubectl" | "oc" => Ok(Self::Kubectl),
            "rest" | "http" | "https" => Ok(Self::Rest),
            other => Err(Error::InvalidConfig(format!("unknown backend: {other}"))),
        }
    }
}

/// Control-plane connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub backend: BackendKind,

    /// Binary used by the kubectl backend (`oc` on OpenShift)
    pub kubectl_binary: String,

    /// API server URL for the REST backend
    pub api_url: Option<String>,

    /// Bearer token for the REST backend
    pub token: Option<String>,

    /// Accept self-signed API server certificates
    pub insecure_tls: bool,

    /// Per-request timeout
    pub request_timeout_ms: u64,

    /// Consecutive failed status reads tolerated while waiting
    pub max_transport_failures: u32,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Kubectl,
            kubectl_binary: "oc".to_string(),
            api_url: None,
            token: None,
            insecure_tls: false,
            request_timeout_ms: 30_000,
            max_transport_failures: 3,
        }
    }
}

/// Bulk operation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Upper bound on per-workspace operations in flight
    pub concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DASHPROBE_NAMESPACE") {
            self.namespace = v;
        }

        let t = &mut self.timeouts;
        override_parsed(&lookup, "DASHPROBE_WORKSPACE_STATUS_ATTEMPTS", &mut t.status_attempts)?;
        override_parsed(&lookup, "DASHPROBE_WORKSPACE_STATUS_POLLING_MS", &mut t.status_polling_ms)?;
        override_optional(&lookup, "DASHPROBE_WORKSPACE_STATUS_TIMEOUT_MS", &mut t.status_timeout_ms)?;
        override_parsed(&lookup, "DASHPROBE_WORKSPACE_STOP_ATTEMPTS", &mut t.stop_attempts)?;
        override_parsed(&lookup, "DASHPROBE_WORKSPACE_STOP_POLLING_MS", &mut t.stop_polling_ms)?;
        override_optional(&lookup, "DASHPROBE_WORKSPACE_STOP_TIMEOUT_MS", &mut t.stop_timeout_ms)?;
        override_parsed(&lookup, "DASHPROBE_WORKSPACE_START_ATTEMPTS", &mut t.start_attempts)?;
        override_parsed(&lookup, "DASHPROBE_WORKSPACE_START_POLLING_MS", &mut t.start_polling_ms)?;
        override_optional(&lookup, "DASHPROBE_WORKSPACE_START_TIMEOUT_MS", &mut t.start_timeout_ms)?;
        override_parsed(&lookup, "DASHPROBE_DEFAULT_ATTEMPTS", &mut t.driver_attempts)?;
        override_parsed(&lookup, "DASHPROBE_DEFAULT_POLLING_MS", &mut t.driver_polling_ms)?;

        let cp = &mut self.control_plane;
        override_parsed(&lookup, "DASHPROBE_CONTROL_PLANE", &mut cp.backend)?;
        if let Some(v) = lookup("DASHPROBE_KUBECTL") {
            cp.kubectl_binary = v;
        }
        if let Some(v) = lookup("DASHPROBE_API_URL") {
            cp.api_url = Some(v);
        }
        if let Some(v) = lookup("DASHPROBE_API_TOKEN") {
            cp.token = Some(v);
        }
        override_parsed(&lookup, "DASHPROBE_INSECURE_TLS", &mut cp.insecure_tls)?;
        override_parsed(&lookup, "DASHPROBE_MAX_TRANSPORT_FAILURES", &mut cp.max_transport_failures)?;

        override_parsed(&lookup, "DASHPROBE_BULK_CONCURRENCY", &mut self.bulk.concurrency)?;
        Ok(())
    }

    /// Reject configurations that cannot drive a run
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::InvalidConfig("namespace must not be empty".to_string()));
        }
        if self.bulk.concurrency == 0 {
            return Err(Error::InvalidConfig("bulk.concurrency must be at least 1".to_string()));
        }
        if self.control_plane.backend == BackendKind::Rest && self.control_plane.api_url.is_none() {
            return Err(Error::InvalidConfig(
                "control_plane.api_url is required for the rest backend".to_string(),
            ));
        }
        self.timeouts.status_policy()?;
        self.timeouts.stop_policy()?;
        self.timeouts.start_policy()?;
        self.timeouts.driver_policy()?;
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("{key}: cannot parse '{raw}'")))?;
    }
    Ok(())
}

fn override_optional<F>(lookup: &F, key: &str, target: &mut Option<u64>) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = if raw.trim().is_empty() {
            None
        } else {
            Some(
                raw.trim()
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("{key}: cannot parse '{raw}'")))?,
            )
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.timeouts.status_attempts, 90);
        assert_eq!(config.bulk.concurrency, 4);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
namespace = "qa-user"

[timeouts]
status_attempts = 12
status_timeout_ms = 60000

[control_plane]
backend = "rest"
api_url = "https://api.cluster.example:6443"
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.namespace, "qa-user");
        assert_eq!(config.control_plane.backend, BackendKind::Rest);
        assert_eq!(config.timeouts.stop_attempts, 60);

        let policy = config.timeouts.status_policy().unwrap();
        assert_eq!(policy.attempts(), 12);
        assert_eq!(policy.timeout(), Some(Duration::from_secs(60)));
        config.validate().unwrap();
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = HarnessConfig::default();
        config.namespace = "saved".to_string();
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.namespace, "saved");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DASHPROBE_NAMESPACE", "ci-run-42"),
            ("DASHPROBE_WORKSPACE_STATUS_ATTEMPTS", "7"),
            ("DASHPROBE_WORKSPACE_STOP_TIMEOUT_MS", "120000"),
            ("DASHPROBE_CONTROL_PLANE", "kubectl"),
            ("DASHPROBE_KUBECTL", "kubectl"),
            ("DASHPROBE_BULK_CONCURRENCY", "2"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.namespace, "ci-run-42");
        assert_eq!(config.timeouts.status_attempts, 7);
        assert_eq!(config.timeouts.stop_timeout_ms, Some(120_000));
        assert_eq!(config.control_plane.kubectl_binary, "kubectl");
        assert_eq!(config.bulk.concurrency, 2);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_overrides_from(|k| (k == "DASHPROBE_BULK_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DASHPROBE_BULK_CONCURRENCY"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarnessConfig::default();
        config.bulk.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.timeouts.stop_attempts = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidPolicy(_))));

        let mut config = HarnessConfig::default();
        config.control_plane.backend = BackendKind::Rest;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
