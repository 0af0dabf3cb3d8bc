//! Readiness Poller
//!
//! One task per store watches the store's workload pod until it is running
//! with every container ready, or until the retry budget runs out.
//!
//! ```text
//!             miss, retries < limit
//!              ┌──────────────┐
//!              ▼              │
//!  start ──► Polling ─────────┘
//!              │  ready                 ──► Succeeded  (status Ready)
//!              │  miss, retries >= limit ──► TimedOut  (status Failed, uninstall)
//!              │  token cancelled        ──► Cancelled (no mutation)
//! ```
//!
//! Query errors are misses, not failures. The first check runs immediately;
//! later checks are spaced by the poll interval, so the worst case is
//! bounded by `retry_limit × interval`.

use crate::cluster_client::{ClusterReader, PodSnapshot};
use crate::config::PollerConfig;
use crate::executor::CommandExecutor;
use crate::registry::{StatusUpdate, StoreRegistry};
use crate::store::{Store, StoreStatus};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// The store a poller is watching
#[derive(Debug, Clone)]
pub struct PollTarget {
    pub store_id: String,
    pub store_name: String,
    pub namespace: String,
    pub release: String,
    /// Substring of the workload pod name
    pub component: &'static str,
}

impl PollTarget {
    pub fn for_store(store: &Store) -> Self {
        Self {
            store_id: store.id.clone(),
            store_name: store.name.clone(),
            namespace: store.namespace.clone(),
            release: store.release(),
            component: store.store_type.component(),
        }
    }
}

/// Why a readiness check did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No pod name contains the component name
    NoWorkloadPod,
    /// The workload pod is not in the `Running` phase
    NotRunning(Option<String>),
    /// At least one container is not ready, or none reported yet
    ContainersNotReady,
    /// The pod listing itself failed
    QueryFailed(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NoWorkloadPod => write!(f, "workload pod not found"),
            MissReason::NotRunning(phase) => {
                write!(f, "pod phase is {}", phase.as_deref().unwrap_or("unknown"))
            }
            MissReason::ContainersNotReady => write!(f, "containers not ready"),
            MissReason::QueryFailed(e) => write!(f, "pod query failed: {}", e),
        }
    }
}

/// Result of one readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Miss(MissReason),
}

/// Judge a pod listing against the workload component name
pub fn evaluate(pods: &[PodSnapshot], component: &str) -> Readiness {
    let component = component.to_lowercase();
    let Some(pod) = pods
        .iter()
        .find(|p| p.name.to_lowercase().contains(&component))
    else {
        return Readiness::Miss(MissReason::NoWorkloadPod);
    };

    if pod.phase.as_deref() != Some("Running") {
        return Readiness::Miss(MissReason::NotRunning(pod.phase.clone()));
    }
    if !pod.is_ready() {
        return Readiness::Miss(MissReason::ContainersNotReady);
    }
    Readiness::Ready
}

/// Poller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Succeeded,
    TimedOut,
    Cancelled,
}

/// Final state of a poller and how many checks it ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub state: PollState,
    pub attempts: u32,
}

/// Retry accounting for one store
#[derive(Debug)]
struct PollProgress {
    attempts: u32,
    retries: u32,
    limit: u32,
}

impl PollProgress {
    fn new(limit: u32) -> Self {
        Self {
            attempts: 0,
            retries: 0,
            limit,
        }
    }

    fn record(&mut self, readiness: &Readiness) -> PollState {
        self.attempts += 1;
        match readiness {
            Readiness::Ready => PollState::Succeeded,
            Readiness::Miss(_) => {
                self.retries += 1;
                if self.retries >= self.limit {
                    PollState::TimedOut
                } else {
                    PollState::Polling
                }
            }
        }
    }

    fn outcome(&self, state: PollState) -> PollOutcome {
        PollOutcome {
            state,
            attempts: self.attempts,
        }
    }
}

/// Drives stores from `Provisioning` to a terminal status
pub struct ReadinessPoller {
    registry: Arc<StoreRegistry>,
    cluster: Arc<dyn ClusterReader>,
    executor: Arc<dyn CommandExecutor>,
    config: PollerConfig,
}

impl ReadinessPoller {
    pub fn new(
        registry: Arc<StoreRegistry>,
        cluster: Arc<dyn ClusterReader>,
        executor: Arc<dyn CommandExecutor>,
        config: PollerConfig,
    ) -> Self {
        Self {
            registry,
            cluster,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run the poller for `target` on its own task
    pub fn spawn(self: &Arc<Self>, target: PollTarget, cancel: CancellationToken) -> JoinHandle<PollOutcome> {
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.run(&target, &cancel).await })
    }

    /// Poll until a terminal state is reached
    #[instrument(skip(self, target, cancel), fields(store = %target.store_name, namespace = %target.namespace))]
    pub async fn run(&self, target: &PollTarget, cancel: &CancellationToken) -> PollOutcome {
        let mut progress = PollProgress::new(self.config.retry_limit);
        debug!(
            retry_limit = self.config.retry_limit,
            interval_secs = self.config.interval_secs,
            deadline_secs = self.config.deadline().as_secs(),
            "Readiness polling started"
        );

        loop {
            let readiness = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(&progress),
                readiness = self.check(target) => readiness,
            };
            metrics::counter!("storefront_poll_attempts_total").increment(1);

            match progress.record(&readiness) {
                PollState::Succeeded => {
                    if cancel.is_cancelled() {
                        return self.cancelled(&progress);
                    }
                    return self.succeed(target, &progress);
                }
                PollState::TimedOut => {
                    if cancel.is_cancelled() {
                        return self.cancelled(&progress);
                    }
                    return self.time_out(target, &progress).await;
                }
                _ => {
                    if let Readiness::Miss(reason) = &readiness {
                        debug!(
                            attempt = progress.attempts,
                            retries = progress.retries,
                            reason = %reason,
                            "Store not ready yet"
                        );
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(&progress),
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }
    }

    async fn check(&self, target: &PollTarget) -> Readiness {
        match self.cluster.list_pods(&target.namespace).await {
            Ok(pods) => evaluate(&pods, target.component),
            Err(e) => Readiness::Miss(MissReason::QueryFailed(e.to_string())),
        }
    }

    fn succeed(&self, target: &PollTarget, progress: &PollProgress) -> PollOutcome {
        match self.registry.set_status(&target.store_id, StoreStatus::Ready) {
            StatusUpdate::Applied => {
                info!(attempts = progress.attempts, "Store ready");
                record_outcome("ready");
                progress.outcome(PollState::Succeeded)
            }
            StatusUpdate::NotFound => {
                debug!("Store deleted before it became ready");
                self.cancelled(progress)
            }
            StatusUpdate::AlreadyTerminal(status) => {
                warn!(status = %status, "Store already terminal; leaving status unchanged");
                progress.outcome(PollState::Succeeded)
            }
        }
    }

    async fn time_out(&self, target: &PollTarget, progress: &PollProgress) -> PollOutcome {
        match self.registry.set_status(&target.store_id, StoreStatus::Failed) {
            StatusUpdate::Applied => {}
            StatusUpdate::NotFound => {
                debug!("Store deleted before its readiness deadline");
                return self.cancelled(progress);
            }
            StatusUpdate::AlreadyTerminal(status) => {
                warn!(status = %status, "Store already terminal; skipping rollback");
                return progress.outcome(PollState::TimedOut);
            }
        }

        warn!(
            attempts = progress.attempts,
            release = %target.release,
            "Store did not become ready in time; rolling back"
        );
        record_outcome("timeout");

        if let Err(e) = self
            .executor
            .uninstall(&target.release, &target.namespace)
            .await
        {
            error!(release = %target.release, error = %e, "Rollback uninstall failed");
        }
        progress.outcome(PollState::TimedOut)
    }

    fn cancelled(&self, progress: &PollProgress) -> PollOutcome {
        debug!(attempts = progress.attempts, "Readiness polling cancelled");
        record_outcome("cancelled");
        progress.outcome(PollState::Cancelled)
    }
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("storefront_readiness_outcomes_total", "outcome" => outcome).increment(1);
}
