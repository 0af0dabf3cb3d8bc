//! Kubernetes Cluster Client
//!
//! This module provides the operator's read and write access to the cluster:
//! listing a store's pods for readiness checks and creating the isolation
//! objects in its namespace. Both capabilities are traits so the controller
//! and the poller can run against test doubles.

use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LimitRange, Pod, ResourceQuota, Secret};
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Default operation timeout for API calls
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Phase and container readiness of one pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    /// Pod name
    pub name: String,
    /// Pod phase (`Pending`, `Running`, ...)
    pub phase: Option<String>,
    /// Ready flag per reported container status
    pub containers_ready: Vec<bool>,
}

impl PodSnapshot {
    /// Running with at least one container status, all of them ready
    pub fn is_ready(&self) -> bool {
        self.phase.as_deref() == Some("Running")
            && !self.containers_ready.is_empty()
            && self.containers_ready.iter().all(|ready| *ready)
    }
}

impl From<&Pod> for PodSnapshot {
    fn from(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            phase: status.and_then(|s| s.phase.clone()),
            containers_ready: status
                .and_then(|s| s.container_statuses.as_ref())
                .map(|cs| cs.iter().map(|c| c.ready).collect())
                .unwrap_or_default(),
        }
    }
}

/// Read access to workload pods
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// List the pods in a namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSnapshot>>;
}

/// Write access for namespace isolation objects
///
/// Implementations treat an object that already exists as created.
#[async_trait]
pub trait IsolationWriter: Send + Sync {
    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<()>;

    async fn create_resource_quota(&self, namespace: &str, quota: ResourceQuota) -> Result<()>;

    async fn create_limit_range(&self, namespace: &str, range: LimitRange) -> Result<()>;
}

/// Configuration for the cluster client
#[derive(Debug, Clone)]
pub struct ClusterClientConfig {
    /// Upper bound for a single API call
    pub operation_timeout: Duration,
}

impl Default for ClusterClientConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Cluster access backed by a `kube::Client`
pub struct KubeClusterClient {
    client: Client,
    config: ClusterClientConfig,
}

impl KubeClusterClient {
    /// Create a new cluster client with default configuration
    pub fn new(client: Client) -> Self {
        Self::with_config(client, ClusterClientConfig::default())
    }

    /// Create a new cluster client with custom configuration
    pub fn with_config(client: Client, config: ClusterClientConfig) -> Self {
        Self { client, config }
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        timeout(self.config.operation_timeout, fut)
            .await
            .map_err(|_| OperatorError::Timeout(format!("{} timed out", operation)))?
            .map_err(OperatorError::from)
    }

    async fn create_namespaced<K>(&self, namespace: &str, object: K, kind: &str) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("create {}", kind);

        match self
            .bounded(&operation, api.create(&PostParams::default(), &object))
            .await
        {
            Ok(_) => {
                debug!(namespace = %namespace, kind = %kind, "Created isolation object");
                Ok(())
            }
            Err(OperatorError::KubeError(kube::Error::Api(resp))) if resp.code == 409 => {
                debug!(namespace = %namespace, kind = %kind, "Isolation object already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ClusterReader for KubeClusterClient {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSnapshot>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = self
            .bounded("list pods", pods.list(&ListParams::default()))
            .await?;

        Ok(list.items.iter().map(PodSnapshot::from).collect())
    }
}

#[async_trait]
impl IsolationWriter for KubeClusterClient {
    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<()> {
        self.create_namespaced(namespace, secret, "Secret").await
    }

    async fn create_resource_quota(&self, namespace: &str, quota: ResourceQuota) -> Result<()> {
        self.create_namespaced(namespace, quota, "ResourceQuota")
            .await
    }

    async fn create_limit_range(&self, namespace: &str, range: LimitRange) -> Result<()> {
        self.create_namespaced(namespace, range, "LimitRange").await
    }
}
