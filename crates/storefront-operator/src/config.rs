//! Operator configuration
//!
//! Configuration is grouped by concern: the chart that gets installed for
//! every store, how Helm is invoked, readiness polling and the isolation
//! objects created in each store namespace. Every field has a default so a
//! partial YAML file is enough.

use crate::error::{OperatorError, Result};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// Regex for validating Kubernetes resource quantities (e.g., "2Gi", "500m")
static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(m|Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$").unwrap()
});

/// Default number of live stores
pub const DEFAULT_MAX_STORES: usize = 5;

/// Wrapper for sensitive configuration values
///
/// Prevents accidental logging of secrets while allowing access when needed.
#[derive(Debug, Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the secret value
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Top-level operator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// Maximum number of live stores
    #[serde(default = "default_max_stores")]
    pub max_stores: usize,

    /// Chart values shared by every store
    #[serde(default)]
    pub chart: ChartConfig,

    /// Helm invocation settings
    #[serde(default)]
    pub helm: HelmConfig,

    /// Readiness polling
    #[serde(default)]
    pub poller: PollerConfig,

    /// Namespace isolation objects
    #[serde(default)]
    pub isolation: IsolationConfig,
}

fn default_max_stores() -> usize {
    DEFAULT_MAX_STORES
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_stores: DEFAULT_MAX_STORES,
            chart: ChartConfig::default(),
            helm: HelmConfig::default(),
            poller: PollerConfig::default(),
            isolation: IsolationConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the live-store limit
    pub fn with_max_stores(mut self, max_stores: usize) -> Self {
        self.max_stores = max_stores;
        self
    }

    /// Set the poller configuration
    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_stores == 0 {
            return Err(OperatorError::InvalidConfig(
                "maxStores must be at least 1".to_string(),
            ));
        }
        if self.poller.retry_limit == 0 {
            return Err(OperatorError::InvalidConfig(
                "poller.retryLimit must be at least 1".to_string(),
            ));
        }
        if self.helm.command_timeout_secs == 0 {
            return Err(OperatorError::InvalidConfig(
                "helm.commandTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.chart.base_domain.trim().is_empty() {
            return Err(OperatorError::InvalidConfig(
                "chart.baseDomain must not be empty".to_string(),
            ));
        }
        self.isolation.validate()
    }
}

/// Values rendered into every store's chart installation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    /// Ingress class for the store's ingress
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,

    /// Domain appended to the namespace to form the store hostname
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// Administrative username of the workload
    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    /// Administrative password of the workload
    #[serde(default = "default_admin_password")]
    pub admin_password: SensitiveString,

    /// Administrative email of the workload
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

fn default_base_domain() -> String {
    "localhost".to_string()
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password() -> SensitiveString {
    SensitiveString::new("admin123")
}

fn default_admin_email() -> String {
    "admin@test.com".to_string()
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            ingress_class: default_ingress_class(),
            base_domain: default_base_domain(),
            admin_username: default_admin_username(),
            admin_password: default_admin_password(),
            admin_email: default_admin_email(),
        }
    }
}

/// How the Helm binary is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmConfig {
    /// Path or name of the helm binary
    #[serde(default = "default_helm_binary")]
    pub binary: String,

    /// Upper bound for a single install/uninstall in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Kube context passed to helm (current context when unset)
    #[serde(default)]
    pub kube_context: Option<String>,
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_command_timeout() -> u64 {
    600
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            command_timeout_secs: default_command_timeout(),
            kube_context: None,
        }
    }
}

impl HelmConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Readiness polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollerConfig {
    /// Delay between two readiness checks in seconds
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Missed checks tolerated before the store is marked failed
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_retry_limit() -> u32 {
    60
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            retry_limit: default_retry_limit(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Worst-case time a store spends in `Provisioning`
    pub fn deadline(&self) -> Duration {
        self.interval() * self.retry_limit
    }
}

/// Names and sizes of the objects that isolate a store namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationConfig {
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
    #[serde(default = "default_quota_name")]
    pub quota_name: String,
    #[serde(default = "default_limit_range_name")]
    pub limit_range_name: String,

    /// Hard cap on pods in the namespace
    #[serde(default = "default_max_pods")]
    pub max_pods: String,
    #[serde(default = "default_requests_cpu")]
    pub requests_cpu: String,
    #[serde(default = "default_requests_memory")]
    pub requests_memory: String,
    #[serde(default = "default_limits_cpu")]
    pub limits_cpu: String,
    #[serde(default = "default_limits_memory")]
    pub limits_memory: String,

    /// Per-container default limit
    #[serde(default = "default_container_cpu")]
    pub container_cpu: String,
    #[serde(default = "default_container_memory")]
    pub container_memory: String,

    /// Per-container default request
    #[serde(default = "default_container_request_cpu")]
    pub container_request_cpu: String,
    #[serde(default = "default_container_request_memory")]
    pub container_request_memory: String,
}

fn default_secret_name() -> String {
    "wp-secret".to_string()
}

fn default_quota_name() -> String {
    "store-quota".to_string()
}

fn default_limit_range_name() -> String {
    "store-limit-range".to_string()
}

fn default_max_pods() -> String {
    "10".to_string()
}

fn default_requests_cpu() -> String {
    "2".to_string()
}

fn default_requests_memory() -> String {
    "2Gi".to_string()
}

fn default_limits_cpu() -> String {
    "4".to_string()
}

fn default_limits_memory() -> String {
    "4Gi".to_string()
}

fn default_container_cpu() -> String {
    "500m".to_string()
}

fn default_container_memory() -> String {
    "512Mi".to_string()
}

fn default_container_request_cpu() -> String {
    "250m".to_string()
}

fn default_container_request_memory() -> String {
    "256Mi".to_string()
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            secret_name: default_secret_name(),
            quota_name: default_quota_name(),
            limit_range_name: default_limit_range_name(),
            max_pods: default_max_pods(),
            requests_cpu: default_requests_cpu(),
            requests_memory: default_requests_memory(),
            limits_cpu: default_limits_cpu(),
            limits_memory: default_limits_memory(),
            container_cpu: default_container_cpu(),
            container_memory: default_container_memory(),
            container_request_cpu: default_container_request_cpu(),
            container_request_memory: default_container_request_memory(),
        }
    }
}

impl IsolationConfig {
    fn validate(&self) -> Result<()> {
        let quantities = [
            ("maxPods", &self.max_pods),
            ("requestsCpu", &self.requests_cpu),
            ("requestsMemory", &self.requests_memory),
            ("limitsCpu", &self.limits_cpu),
            ("limitsMemory", &self.limits_memory),
            ("containerCpu", &self.container_cpu),
            ("containerMemory", &self.container_memory),
            ("containerRequestCpu", &self.container_request_cpu),
            ("containerRequestMemory", &self.container_request_memory),
        ];

        for (field, value) in quantities {
            if !QUANTITY_REGEX.is_match(value) {
                return Err(OperatorError::InvalidConfig(format!(
                    "isolation.{}: '{}' is not a valid Kubernetes quantity",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OperatorConfig::default();
        assert_eq!(config.max_stores, 5);
        assert_eq!(config.poller.retry_limit, 60);
        assert_eq!(config.poller.interval(), Duration::from_secs(10));
        assert_eq!(config.poller.deadline(), Duration::from_secs(600));
        assert_eq!(config.chart.base_domain, "localhost");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
maxStores: 3
poller:
  intervalSecs: 2
isolation:
  limitsMemory: 8Gi
"#;
        let config = OperatorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_stores, 3);
        assert_eq!(config.poller.interval_secs, 2);
        assert_eq!(config.poller.retry_limit, 60);
        assert_eq!(config.isolation.limits_memory, "8Gi");
        assert_eq!(config.isolation.requests_memory, "2Gi");
        assert_eq!(config.helm.binary, "helm");
    }

    #[test]
    fn test_invalid_quantity_rejected() {
        let yaml = "isolation:\n  requestsCpu: two\n";
        let err = OperatorConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, OperatorError::InvalidConfig(_)));
        assert!(err.to_string().contains("requestsCpu"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = OperatorConfig::default().with_max_stores(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_is_redacted() {
        let config = ChartConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("admin123"));
        assert!(json.contains("REDACTED"));
        assert_eq!(config.admin_password.expose_secret(), "admin123");
    }
}
