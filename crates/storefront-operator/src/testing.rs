//! Test doubles for the executor and cluster seams

use crate::cluster_client::{ClusterReader, IsolationWriter, PodSnapshot};
use crate::error::{OperatorError, Result};
use crate::executor::{CommandExecutor, InstallParams};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LimitRange, ResourceQuota, Secret};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub(crate) fn ready_pod(name: &str) -> PodSnapshot {
    PodSnapshot {
        name: name.to_string(),
        phase: Some("Running".to_string()),
        containers_ready: vec![true],
    }
}

pub(crate) fn pending_pod(name: &str) -> PodSnapshot {
    PodSnapshot {
        name: name.to_string(),
        phase: Some("Pending".to_string()),
        containers_ready: vec![false],
    }
}

#[derive(Default)]
struct ClusterState {
    pods: HashMap<String, Vec<PodSnapshot>>,
    ready_after: HashMap<String, u32>,
    list_calls: HashMap<String, u32>,
    failing_reads: HashSet<String>,
    failing_kinds: HashSet<String>,
    created: Vec<(String, String)>,
}

/// Scripted cluster: pods per namespace plus recorded isolation writes
#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_pods(&self, namespace: &str, pods: Vec<PodSnapshot>) {
        self.state.lock().pods.insert(namespace.to_string(), pods);
    }

    /// Report a ready workload pod from the `attempt`-th listing on
    pub(crate) fn ready_after(&self, namespace: &str, attempt: u32) {
        self.state
            .lock()
            .ready_after
            .insert(namespace.to_string(), attempt);
    }

    pub(crate) fn fail_reads(&self, namespace: &str) {
        self.state.lock().failing_reads.insert(namespace.to_string());
    }

    pub(crate) fn fail_isolation_kind(&self, kind: &str) {
        self.state.lock().failing_kinds.insert(kind.to_string());
    }

    pub(crate) fn list_calls(&self, namespace: &str) -> u32 {
        self.state
            .lock()
            .list_calls
            .get(namespace)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn created_objects(&self) -> Vec<(String, String)> {
        self.state.lock().created.clone()
    }

    fn record_create(&self, namespace: &str, kind: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_kinds.contains(kind) {
            return Err(OperatorError::Internal(format!("{} rejected", kind)));
        }
        state.created.push((namespace.to_string(), kind.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ClusterReader for FakeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSnapshot>> {
        let mut state = self.state.lock();
        let calls = {
            let calls = state.list_calls.entry(namespace.to_string()).or_insert(0);
            *calls += 1;
            *calls
        };

        if state.failing_reads.contains(namespace) {
            return Err(OperatorError::Timeout("list pods timed out".to_string()));
        }
        if let Some(after) = state.ready_after.get(namespace) {
            if calls >= *after {
                return Ok(vec![ready_pod(&format!("{}-wordpress-0", namespace))]);
            }
        }
        Ok(state.pods.get(namespace).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl IsolationWriter for FakeCluster {
    async fn create_secret(&self, namespace: &str, _secret: Secret) -> Result<()> {
        self.record_create(namespace, "Secret")
    }

    async fn create_resource_quota(&self, namespace: &str, _quota: ResourceQuota) -> Result<()> {
        self.record_create(namespace, "ResourceQuota")
    }

    async fn create_limit_range(&self, namespace: &str, _range: LimitRange) -> Result<()> {
        self.record_create(namespace, "LimitRange")
    }
}

#[derive(Default)]
struct ExecutorState {
    installs: Vec<InstallParams>,
    uninstalls: Vec<(String, String)>,
    install_error: Option<String>,
    uninstall_fails: bool,
    install_delay: Duration,
    uninstall_delay: Duration,
}

/// Records commands instead of running them
#[derive(Default)]
pub(crate) struct FakeExecutor {
    state: Mutex<ExecutorState>,
}

impl FakeExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_installs(&self, stderr: &str) {
        self.state.lock().install_error = Some(stderr.to_string());
    }

    pub(crate) fn fail_uninstalls(&self) {
        self.state.lock().uninstall_fails = true;
    }

    pub(crate) fn delay_installs(&self, delay: Duration) {
        self.state.lock().install_delay = delay;
    }

    pub(crate) fn delay_uninstalls(&self, delay: Duration) {
        self.state.lock().uninstall_delay = delay;
    }

    pub(crate) fn installs(&self) -> Vec<InstallParams> {
        self.state.lock().installs.clone()
    }

    pub(crate) fn uninstalls(&self) -> Vec<(String, String)> {
        self.state.lock().uninstalls.clone()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn install(&self, params: &InstallParams) -> Result<()> {
        let delay = self.state.lock().install_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.installs.push(params.clone());
        match &state.install_error {
            Some(stderr) => Err(OperatorError::CommandFailed {
                command: format!("helm upgrade --install {}", params.release),
                details: stderr.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        let delay = self.state.lock().uninstall_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state
            .uninstalls
            .push((release.to_string(), namespace.to_string()));
        if state.uninstall_fails {
            return Err(OperatorError::CommandFailed {
                command: format!("helm uninstall {}", release),
                details: format!("release: not found: {}", release),
            });
        }
        Ok(())
    }
}
