//! Namespace isolation
//!
//! Isolation is advisory: the three objects are created independently and a
//! failure is reported on the log and metrics channels, never to the caller.

use crate::cluster_client::IsolationWriter;
use crate::config::{ChartConfig, IsolationConfig};
use crate::error::{OperatorError, Result};
use crate::resources::ResourceBuilder;
use std::sync::Arc;
use tracing::{info, warn};

/// Which isolation objects were created for a namespace
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IsolationReport {
    pub secret: bool,
    pub resource_quota: bool,
    pub limit_range: bool,
}

impl IsolationReport {
    pub fn is_complete(&self) -> bool {
        self.secret && self.resource_quota && self.limit_range
    }
}

/// Creates the credential and resource-limiting objects for a store
pub struct IsolationProvisioner {
    writer: Arc<dyn IsolationWriter>,
    isolation: IsolationConfig,
    chart: ChartConfig,
}

impl IsolationProvisioner {
    pub fn new(
        writer: Arc<dyn IsolationWriter>,
        isolation: IsolationConfig,
        chart: ChartConfig,
    ) -> Self {
        Self {
            writer,
            isolation,
            chart,
        }
    }

    /// Create all isolation objects, best-effort
    pub async fn provision(&self, namespace: &str) -> IsolationReport {
        let builder = ResourceBuilder::new(namespace, &self.isolation, &self.chart);

        let (secret, quota, range) = tokio::join!(
            self.writer.create_secret(namespace, builder.build_secret()),
            self.writer
                .create_resource_quota(namespace, builder.build_resource_quota()),
            self.writer
                .create_limit_range(namespace, builder.build_limit_range()),
        );

        let report = IsolationReport {
            secret: check(namespace, "Secret", secret),
            resource_quota: check(namespace, "ResourceQuota", quota),
            limit_range: check(namespace, "LimitRange", range),
        };

        if report.is_complete() {
            info!(namespace = %namespace, "Namespace isolation in place");
        } else {
            warn!(
                namespace = %namespace,
                secret = report.secret,
                resource_quota = report.resource_quota,
                limit_range = report.limit_range,
                "Store is running with incomplete isolation"
            );
        }
        report
    }
}

fn check(namespace: &str, kind: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            let err = OperatorError::Isolation {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                message: e.to_string(),
            };
            warn!(namespace = %namespace, kind = %kind, error = %err, "Isolation setup error");
            metrics::counter!("storefront_isolation_failures_total", "kind" => kind.to_string())
                .increment(1);
            false
        }
    }
}
