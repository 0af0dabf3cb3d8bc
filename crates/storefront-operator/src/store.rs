//! Store records and naming rules
//!
//! A store's namespace, Helm release and hostname are all derived from its
//! normalized name, so two live stores can never collide on any of them.

use crate::error::{OperatorError, Result};
use crate::template::StoreTemplate;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Regex for validating Kubernetes names (RFC 1123 label)
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Prefix of every store namespace
pub const NAMESPACE_PREFIX: &str = "store-";

/// Kubernetes limits namespace names to one DNS label
const MAX_NAMESPACE_LEN: usize = 63;

/// Trim and lower-case a tenant-supplied name
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Namespace (and release name) for a normalized store name
pub fn namespace_for(name: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, name)
}

/// A validated, normalized store name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreName(String);

impl StoreName {
    /// Normalize and validate a tenant-supplied name
    pub fn parse(raw: &str) -> Result<Self> {
        let name = normalize_name(raw);
        if name.is_empty() {
            return Err(OperatorError::Validation("name is required".to_string()));
        }
        if !NAME_REGEX.is_match(&name) {
            return Err(OperatorError::Validation(format!(
                "'{}' is not a valid store name (lowercase letters, digits and '-')",
                name
            )));
        }
        if NAMESPACE_PREFIX.len() + name.len() > MAX_NAMESPACE_LEN {
            return Err(OperatorError::Validation(format!(
                "store name exceeds {} characters",
                MAX_NAMESPACE_LEN - NAMESPACE_PREFIX.len()
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> String {
        namespace_for(&self.0)
    }

    /// Helm release name; identical to the namespace
    pub fn release(&self) -> String {
        self.namespace()
    }

    /// Ingress hostname under the given base domain
    pub fn hostname(&self, base_domain: &str) -> String {
        format!("{}.{}", self.namespace(), base_domain)
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provisioning status of a store
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StoreStatus {
    /// Installed, waiting for the workload to become ready
    #[default]
    Provisioning,
    /// Workload pod is running with all containers ready
    Ready,
    /// Workload never became ready and was rolled back
    Failed,
}

impl StoreStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(self) -> bool {
        !matches!(self, StoreStatus::Provisioning)
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStatus::Provisioning => write!(f, "Provisioning"),
            StoreStatus::Ready => write!(f, "Ready"),
            StoreStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// A tenant store and its lifecycle record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: StoreTemplate,
    pub status: StoreStatus,
    pub namespace: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Build a fresh `Provisioning` record with a new id
    pub fn new(name: &StoreName, template: StoreTemplate, base_domain: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.as_str().to_string(),
            store_type: template,
            status: StoreStatus::Provisioning,
            namespace: name.namespace(),
            url: format!("http://{}", name.hostname(base_domain)),
            created_at: Utc::now(),
        }
    }

    /// Helm release backing this store
    pub fn release(&self) -> String {
        self.namespace.clone()
    }
}
