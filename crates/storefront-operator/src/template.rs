//! Store templates
//!
//! A template selects the chart installed for a store, the values rendered
//! into it and the pod that signals readiness.

use crate::config::ChartConfig;
use crate::error::{OperatorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Packaged workload a store is built from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StoreTemplate {
    /// WordPress with the WooCommerce plugin
    WooCommerce,
}

impl StoreTemplate {
    pub const ALL: &'static [StoreTemplate] = &[StoreTemplate::WooCommerce];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreTemplate::WooCommerce => "woocommerce",
        }
    }

    /// Chart reference passed to helm
    pub fn chart(self) -> &'static str {
        match self {
            StoreTemplate::WooCommerce => "bitnami/wordpress",
        }
    }

    /// Substring identifying the workload pod among the release's pods
    pub fn component(self) -> &'static str {
        match self {
            StoreTemplate::WooCommerce => "wordpress",
        }
    }

    fn plugins(self) -> &'static str {
        match self {
            StoreTemplate::WooCommerce => "woocommerce",
        }
    }

    /// Chart values for one store
    pub fn values(self, hostname: &str, chart: &ChartConfig) -> Vec<ChartValue> {
        match self {
            StoreTemplate::WooCommerce => vec![
                ChartValue::plain("ingress.enabled", "true"),
                ChartValue::plain("ingress.ingressClassName", &chart.ingress_class),
                ChartValue::plain("ingress.hostname", hostname),
                ChartValue::plain("wordpressUsername", &chart.admin_username),
                ChartValue::secret(
                    "wordpressPassword",
                    chart.admin_password.expose_secret(),
                ),
                ChartValue::plain("wordpressEmail", &chart.admin_email),
                ChartValue::plain("wordpressPlugins", self.plugins()),
            ],
        }
    }
}

impl FromStr for StoreTemplate {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        StoreTemplate::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                OperatorError::Validation(format!("unsupported store type '{}'", s.trim()))
            })
    }
}

impl fmt::Display for StoreTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `key=value` chart override
#[derive(Clone, PartialEq, Eq)]
pub struct ChartValue {
    pub key: String,
    pub value: String,
    /// Masked in logs and debug output
    pub sensitive: bool,
}

impl ChartValue {
    pub fn plain(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            sensitive: false,
        }
    }

    pub fn secret(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            sensitive: true,
        }
    }
}

impl fmt::Debug for ChartValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.sensitive {
            "[REDACTED]"
        } else {
            self.value.as_str()
        };
        write!(f, "{}={}", self.key, value)
    }
}
