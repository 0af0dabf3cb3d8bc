//! Release install/uninstall commands
//!
//! [`CommandExecutor`] is the seam between the controller and the packaging
//! tool. [`HelmExecutor`] runs the `helm` binary as a child process. Every
//! user-derived value is passed as its own argument, never through a shell.

use crate::config::HelmConfig;
use crate::error::{OperatorError, Result};
use crate::template::ChartValue;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Everything needed to install one store release
#[derive(Debug, Clone)]
pub struct InstallParams {
    pub release: String,
    pub namespace: String,
    pub chart: String,
    pub values: Vec<ChartValue>,
}

/// Runs install/uninstall operations for named releases
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Install (or upgrade) a release, creating its namespace if needed
    async fn install(&self, params: &InstallParams) -> Result<()>;

    /// Uninstall a release
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()>;
}

/// Helm-backed executor
pub struct HelmExecutor {
    config: HelmConfig,
}

impl HelmExecutor {
    pub fn new(config: HelmConfig) -> Self {
        Self { config }
    }

    fn context_args(&self) -> Vec<String> {
        match &self.config.kube_context {
            Some(context) => vec!["--kube-context".to_string(), context.clone()],
            None => Vec::new(),
        }
    }

    /// Arguments for `helm upgrade --install`
    pub fn install_args(&self, params: &InstallParams) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            params.release.clone(),
            params.chart.clone(),
            "--namespace".to_string(),
            params.namespace.clone(),
            "--create-namespace".to_string(),
        ];
        for value in &params.values {
            args.push("--set".to_string());
            args.push(format!("{}={}", value.key, value.value));
        }
        args.extend(self.context_args());
        args
    }

    /// Arguments for `helm uninstall`
    pub fn uninstall_args(&self, release: &str, namespace: &str) -> Vec<String> {
        let mut args = vec![
            "uninstall".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        args.extend(self.context_args());
        args
    }

    async fn run(&self, label: &str, args: Vec<String>) -> Result<String> {
        let command = format!("{} {}", self.config.binary, label);
        debug!(command = %command, "Running helm");

        let child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OperatorError::CommandFailed {
                command: command.clone(),
                details: format!("failed to spawn: {}", e),
            })?;

        let output = timeout(self.config.command_timeout(), child.wait_with_output())
            .await
            .map_err(|_| OperatorError::CommandFailed {
                command: command.clone(),
                details: format!(
                    "timed out after {}s",
                    self.config.command_timeout().as_secs()
                ),
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let details = if stderr.is_empty() {
            match output.status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            stderr
        };
        Err(OperatorError::CommandFailed { command, details })
    }
}

#[async_trait]
impl CommandExecutor for HelmExecutor {
    async fn install(&self, params: &InstallParams) -> Result<()> {
        info!(
            release = %params.release,
            namespace = %params.namespace,
            chart = %params.chart,
            values = ?params.values,
            "Installing release"
        );
        let args = self.install_args(params);
        self.run(&format!("upgrade --install {}", params.release), args)
            .await
            .map(|_| ())
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        info!(release = %release, namespace = %namespace, "Uninstalling release");
        let args = self.uninstall_args(release, namespace);
        self.run(&format!("uninstall {}", release), args)
            .await
            .map(|_| ())
            .inspect_err(|e| warn!(release = %release, error = %e, "Uninstall failed"))
    }
}
