//! Kubernetes Resource Builders
//!
//! This module generates the namespace isolation objects (Secret,
//! ResourceQuota, LimitRange) created for every store.

use crate::config::{ChartConfig, IsolationConfig};
use k8s_openapi::api::core::v1::{
    LimitRange, LimitRangeItem, LimitRangeSpec, ResourceQuota, ResourceQuotaSpec, Secret,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Field manager / managed-by label value
pub const MANAGER_NAME: &str = "storefront-operator";

/// Builder for the isolation objects of one store namespace
pub struct ResourceBuilder<'a> {
    namespace: &'a str,
    isolation: &'a IsolationConfig,
    chart: &'a ChartConfig,
}

impl<'a> ResourceBuilder<'a> {
    /// Create a new resource builder
    pub fn new(namespace: &'a str, isolation: &'a IsolationConfig, chart: &'a ChartConfig) -> Self {
        Self {
            namespace,
            isolation,
            chart,
        }
    }

    /// Labels stamped on every object the operator creates
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(
            "app.kubernetes.io/name".to_string(),
            "storefront".to_string(),
        );
        labels.insert(
            "app.kubernetes.io/instance".to_string(),
            self.namespace.to_string(),
        );
        labels.insert(
            "app.kubernetes.io/component".to_string(),
            "isolation".to_string(),
        );
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            MANAGER_NAME.to_string(),
        );
        labels
    }

    fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.to_string()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }

    /// Secret holding the workload's admin password
    pub fn build_secret(&self) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(
            "wordpressPassword".to_string(),
            self.chart.admin_password.expose_secret().to_string(),
        );

        Secret {
            metadata: self.metadata(&self.isolation.secret_name),
            string_data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        }
    }

    /// Quota capping pod count and aggregate CPU/memory for the namespace
    pub fn build_resource_quota(&self) -> ResourceQuota {
        let iso = self.isolation;
        let mut hard = BTreeMap::new();
        hard.insert("pods".to_string(), Quantity(iso.max_pods.clone()));
        hard.insert("requests.cpu".to_string(), Quantity(iso.requests_cpu.clone()));
        hard.insert(
            "requests.memory".to_string(),
            Quantity(iso.requests_memory.clone()),
        );
        hard.insert("limits.cpu".to_string(), Quantity(iso.limits_cpu.clone()));
        hard.insert(
            "limits.memory".to_string(),
            Quantity(iso.limits_memory.clone()),
        );

        ResourceQuota {
            metadata: self.metadata(&iso.quota_name),
            spec: Some(ResourceQuotaSpec {
                hard: Some(hard),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Default per-container requests and limits
    pub fn build_limit_range(&self) -> LimitRange {
        let iso = self.isolation;

        let mut default = BTreeMap::new();
        default.insert("cpu".to_string(), Quantity(iso.container_cpu.clone()));
        default.insert("memory".to_string(), Quantity(iso.container_memory.clone()));

        let mut default_request = BTreeMap::new();
        default_request.insert(
            "cpu".to_string(),
            Quantity(iso.container_request_cpu.clone()),
        );
        default_request.insert(
            "memory".to_string(),
            Quantity(iso.container_request_memory.clone()),
        );

        LimitRange {
            metadata: self.metadata(&iso.limit_range_name),
            spec: Some(LimitRangeSpec {
                limits: vec![LimitRangeItem {
                    type_: "Container".to_string(),
                    default: Some(default),
                    default_request: Some(default_request),
                    ..Default::default()
                }],
            }),
        }
    }
}
