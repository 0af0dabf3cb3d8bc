//! # Storefront Operator
//!
//! Provisions isolated, per-tenant store instances on Kubernetes and tracks
//! each one until it is serving traffic.
//!
//! A store is a Helm release of a packaged workload in its own namespace
//! (`store-<name>`), fenced by a Secret, a ResourceQuota and a LimitRange.
//! After installation a background poller watches the workload pod and moves
//! the store to `Ready`, or to `Failed` with an automatic uninstall once the
//! retry budget is spent.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use storefront_operator::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OperatorConfig::default();
//!     let cluster = Arc::new(KubeClusterClient::new(kube::Client::try_default().await?));
//!     let executor = Arc::new(HelmExecutor::new(config.helm.clone()));
//!
//!     let controller = Arc::new(ProvisioningController::new(
//!         &config,
//!         cluster.clone(),
//!         cluster,
//!         executor,
//!     ));
//!     StoreServer::new(controller, ServerConfig::default())
//!         .run("0.0.0.0:4000".parse()?)
//!         .await
//! }
//! ```
//!
//! ## Store lifecycle
//!
//! ```text
//! POST /stores ─► reserve slot ─► helm install ─► isolation ─► Provisioning
//!                                                                  │
//!                            pod Running + all containers ready ───┼──► Ready
//!                            retry budget exhausted (uninstall) ───┴──► Failed
//! ```
//!
//! `Ready` and `Failed` are final. Deleting a store cancels its poller first,
//! so a deleted store is never rolled back or updated afterwards.
//!
//! ## Modules
//!
//! - [`controller`] - creation and deletion orchestration
//! - [`registry`] - in-memory store records, capacity and uniqueness
//! - [`poller`] - per-store readiness polling and rollback
//! - [`executor`] - Helm install/uninstall
//! - [`cluster_client`] - pod listing and isolation object creation
//! - [`isolation`] / [`resources`] - namespace isolation objects
//! - [`server`] / [`rate_limiter`] - HTTP API
//! - [`config`] - operator configuration
//! - [`error`] - error types
//!
//! ## Metrics
//!
//! - `storefront_stores_created_total` - stores accepted for provisioning
//! - `storefront_store_creation_errors_total{kind}` - rejected creations
//! - `storefront_live_stores` - live store count
//! - `storefront_readiness_outcomes_total{outcome}` - ready / timeout / cancelled
//! - `storefront_isolation_failures_total{kind}` - isolation objects not created

pub mod cluster_client;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod isolation;
pub mod poller;
pub mod rate_limiter;
pub mod registry;
pub mod resources;
pub mod server;
pub mod store;
pub mod template;

#[cfg(test)]
mod testing;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::cluster_client::{
        ClusterClientConfig, ClusterReader, IsolationWriter, KubeClusterClient, PodSnapshot,
    };
    pub use crate::config::{
        ChartConfig, HelmConfig, IsolationConfig, OperatorConfig, PollerConfig, SensitiveString,
    };
    pub use crate::controller::{ControllerMetrics, CreateStoreRequest, ProvisioningController};
    pub use crate::error::{OperatorError, Result};
    pub use crate::executor::{CommandExecutor, HelmExecutor, InstallParams};
    pub use crate::isolation::{IsolationProvisioner, IsolationReport};
    pub use crate::poller::{PollOutcome, PollState, PollTarget, ReadinessPoller};
    pub use crate::rate_limiter::{RateLimitConfig, RateLimiter};
    pub use crate::registry::StoreRegistry;
    pub use crate::resources::ResourceBuilder;
    pub use crate::server::{ServerConfig, StoreServer};
    pub use crate::store::{Store, StoreName, StoreStatus};
    pub use crate::template::StoreTemplate;
}
