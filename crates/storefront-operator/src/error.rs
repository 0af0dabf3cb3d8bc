//! Error types for the Storefront operator

use thiserror::Error;

/// Errors that can occur while provisioning or managing stores
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Request is missing required fields or carries invalid values
    #[error("Validation error: {0}")]
    Validation(String),

    /// The live-store limit has been reached
    #[error("Maximum stores reached ({limit})")]
    CapacityExceeded { limit: usize },

    /// A live or in-flight store already uses this name
    #[error("Store already exists: {0}")]
    AlreadyExists(String),

    /// The store was deleted while it was still being installed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The install command for a release failed
    #[error("Installation of release {release} failed")]
    Installation { release: String, details: String },

    /// An external command could not be run or exited unsuccessfully
    #[error("Command `{command}` failed: {details}")]
    CommandFailed { command: String, details: String },

    /// Creating a namespace isolation object failed
    #[error("Isolation setup failed for {kind} in namespace {namespace}: {message}")]
    Isolation {
        kind: String,
        namespace: String,
        message: String,
    },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// HTTP status code the API layer reports for this error
    pub fn http_status(&self) -> u16 {
        match self {
            OperatorError::Validation(_) => 400,
            OperatorError::CapacityExceeded { .. } => 403,
            OperatorError::AlreadyExists(_) | OperatorError::Conflict(_) => 409,
            _ => 500,
        }
    }

    /// Diagnostic text captured from an external command, if any
    pub fn details(&self) -> Option<&str> {
        match self {
            OperatorError::Installation { details, .. }
            | OperatorError::CommandFailed { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Short metric label for this error kind
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorError::Validation(_) => "validation",
            OperatorError::CapacityExceeded { .. } => "capacity",
            OperatorError::AlreadyExists(_) => "already_exists",
            OperatorError::Conflict(_) => "conflict",
            OperatorError::Installation { .. } => "installation",
            OperatorError::CommandFailed { .. } => "command",
            OperatorError::Isolation { .. } => "isolation",
            OperatorError::KubeError(_) => "kube",
            OperatorError::Timeout(_) => "timeout",
            OperatorError::InvalidConfig(_) => "config",
            OperatorError::Io(_) => "io",
            OperatorError::SerializationError(_) | OperatorError::YamlError(_) => "serialization",
            OperatorError::Internal(_) => "internal",
        }
    }
}
