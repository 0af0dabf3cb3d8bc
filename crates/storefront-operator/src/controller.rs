//! Provisioning Controller
//!
//! Orchestrates store creation (reserve → install → isolate → register →
//! poll) and deletion (deregister → cancel poller → uninstall). This is the
//! only component the HTTP layer calls into.

use crate::cluster_client::{ClusterReader, IsolationWriter};
use crate::config::{ChartConfig, OperatorConfig};
use crate::error::{OperatorError, Result};
use crate::executor::{CommandExecutor, InstallParams};
use crate::isolation::IsolationProvisioner;
use crate::poller::{PollTarget, ReadinessPoller};
use crate::registry::StoreRegistry;
use crate::store::{namespace_for, normalize_name, Store, StoreName};
use crate::template::StoreTemplate;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

/// Body of a store creation request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateStoreRequest {
    #[validate(
        required(message = "name is required"),
        length(min = 1, message = "name is required")
    )]
    #[serde(default)]
    pub name: Option<String>,

    #[validate(
        required(message = "type is required"),
        length(min = 1, message = "type is required")
    )]
    #[serde(rename = "type", default)]
    pub store_type: Option<String>,
}

impl CreateStoreRequest {
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            store_type: Some(store_type.into()),
        }
    }

    /// Check presence, then normalize into a name and a template
    fn parse(&self) -> Result<(StoreName, StoreTemplate)> {
        if let Err(errors) = self.validate() {
            let error_messages: Vec<String> = errors
                .field_errors()
                .iter()
                .flat_map(|(_, errs)| {
                    errs.iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                })
                .collect();
            return Err(OperatorError::Validation(error_messages.join("; ")));
        }

        let raw_name = self.name.as_deref().unwrap_or_default();
        let raw_type = self.store_type.as_deref().unwrap_or_default();
        if raw_type.trim().is_empty() {
            return Err(OperatorError::Validation("type is required".to_string()));
        }

        let name = StoreName::parse(raw_name)?;
        let template = raw_type.parse::<StoreTemplate>()?;
        Ok((name, template))
    }
}

/// Metrics for the controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Stores created
    pub created: metrics::Counter,
    /// Stores deleted
    pub deleted: metrics::Counter,
    /// Histogram for install duration
    pub install_duration: metrics::Histogram,
}

impl ControllerMetrics {
    /// Create new controller metrics
    pub fn new() -> Self {
        Self {
            created: metrics::counter!("storefront_stores_created_total"),
            deleted: metrics::counter!("storefront_stores_deleted_total"),
            install_duration: metrics::histogram!("storefront_install_duration_seconds"),
        }
    }

    fn creation_failed(&self, err: &OperatorError) {
        metrics::counter!("storefront_store_creation_errors_total", "kind" => err.kind())
            .increment(1);
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

struct PollerHandle {
    store_id: String,
    cancel: CancellationToken,
}

/// Creates, tracks and deletes stores
pub struct ProvisioningController {
    registry: Arc<StoreRegistry>,
    executor: Arc<dyn CommandExecutor>,
    isolation: IsolationProvisioner,
    poller: Arc<ReadinessPoller>,
    chart: ChartConfig,
    /// Cancellation handles of running pollers, keyed by store name
    pollers: Arc<DashMap<String, PollerHandle>>,
    metrics: ControllerMetrics,
}

impl ProvisioningController {
    pub fn new(
        config: &OperatorConfig,
        cluster: Arc<dyn ClusterReader>,
        writer: Arc<dyn IsolationWriter>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let registry = Arc::new(StoreRegistry::new(config.max_stores));
        let poller = Arc::new(ReadinessPoller::new(
            registry.clone(),
            cluster,
            executor.clone(),
            config.poller.clone(),
        ));
        let isolation =
            IsolationProvisioner::new(writer, config.isolation.clone(), config.chart.clone());

        Self {
            registry,
            executor,
            isolation,
            poller,
            chart: config.chart.clone(),
            pollers: Arc::new(DashMap::new()),
            metrics: ControllerMetrics::new(),
        }
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// All live stores in creation order
    pub fn list_stores(&self) -> Vec<Store> {
        self.registry.list()
    }

    /// Number of stores still being polled
    pub fn active_pollers(&self) -> usize {
        self.pollers.len()
    }

    /// Provision a new store; returns as soon as polling has started
    #[instrument(skip(self, request), fields(name = request.name.as_deref().unwrap_or_default()))]
    pub async fn create_store(&self, request: CreateStoreRequest) -> Result<Store> {
        let result = self.provision(&request).await;
        if let Err(ref e) = result {
            self.metrics.creation_failed(e);
        }
        result
    }

    async fn provision(&self, request: &CreateStoreRequest) -> Result<Store> {
        let (name, template) = request.parse()?;
        let reservation = self.registry.reserve(&name)?;

        let namespace = name.namespace();
        let release = name.release();
        let hostname = name.hostname(&self.chart.base_domain);

        info!(store = %name, namespace = %namespace, template = %template, "Creating store");

        let params = InstallParams {
            release: release.clone(),
            namespace: namespace.clone(),
            chart: template.chart().to_string(),
            values: template.values(&hostname, &self.chart),
        };

        let started = Instant::now();
        let installed = self.executor.install(&params).await;
        self.metrics
            .install_duration
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = installed {
            warn!(store = %name, release = %release, error = %e, "Installation failed");
            let details = e.details().map(str::to_string).unwrap_or_else(|| e.to_string());
            return Err(OperatorError::Installation { release, details });
        }

        self.isolation.provision(&namespace).await;

        let candidate = Store::new(&name, template, &self.chart.base_domain);
        let store = match self.registry.commit(reservation, candidate) {
            Ok(store) => store,
            Err(e) => {
                warn!(store = %name, error = %e, "Store not registered; removing release");
                if let Err(rollback) = self.executor.uninstall(&release, &namespace).await {
                    error!(release = %release, error = %rollback, "Rollback uninstall failed");
                }
                return Err(e);
            }
        };

        self.start_poller(&store);
        self.metrics.created.increment(1);
        info!(store = %store.name, id = %store.id, url = %store.url, "Store provisioning");

        Ok(store)
    }

    fn start_poller(&self, store: &Store) {
        let cancel = CancellationToken::new();
        let handle = PollerHandle {
            store_id: store.id.clone(),
            cancel: cancel.clone(),
        };
        if let Some(previous) = self.pollers.insert(store.name.clone(), handle) {
            previous.cancel.cancel();
        }

        // A delete may have removed the record between commit and insert;
        // its handle lookup then missed this poller.
        let still_live = self
            .registry
            .get(&store.name)
            .is_some_and(|live| live.id == store.id);
        if !still_live {
            cancel.cancel();
            self.pollers
                .remove_if(&store.name, |_, handle| handle.store_id == store.id);
            debug!(store = %store.name, "Store deleted before polling started");
            return;
        }

        let task = self.poller.spawn(PollTarget::for_store(store), cancel);
        let pollers = Arc::clone(&self.pollers);
        let name = store.name.clone();
        let id = store.id.clone();

        tokio::spawn(async move {
            match task.await {
                Ok(outcome) => {
                    debug!(store = %name, state = ?outcome.state, attempts = outcome.attempts, "Poller finished")
                }
                Err(e) => error!(store = %name, error = %e, "Readiness poller aborted"),
            }
            pollers.remove_if(&name, |_, handle| handle.store_id == id);
        });
    }

    /// Delete a store by name
    ///
    /// The record (or a pending reservation) is removed and the poller
    /// cancelled before the uninstall is awaited, so an install finishing
    /// meanwhile fails its commit instead of registering the store.
    /// Uninstall failures are logged only. Returns whether a live record
    /// was removed.
    #[instrument(skip(self))]
    pub async fn delete_store(&self, name: &str) -> bool {
        let name = normalize_name(name);
        if name.is_empty() {
            return false;
        }

        let removed = self.registry.remove(&name);

        if let Some((_, handle)) = self.pollers.remove(&name) {
            handle.cancel.cancel();
            debug!(store = %name, "Cancelled readiness poller");
        }

        let namespace = namespace_for(&name);
        if let Err(e) = self.executor.uninstall(&namespace, &namespace).await {
            warn!(store = %name, error = %e, "Uninstall failed; record already removed");
        }

        if removed {
            self.metrics.deleted.increment(1);
            info!(store = %name, "Store deleted");
        } else {
            debug!(store = %name, "No live store with this name");
        }
        removed
    }

    /// Stop every running poller without touching store state
    pub fn shutdown(&self) {
        for entry in self.pollers.iter() {
            entry.value().cancel.cancel();
        }
        info!(pollers = self.pollers.len(), "Cancelled readiness pollers");
    }
}
