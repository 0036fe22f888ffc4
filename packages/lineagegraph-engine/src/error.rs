use lineagegraph_store::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, LineageError>;

#[derive(Error, Debug)]
pub enum LineageError {
    /// Seed does not resolve to any known job, dataset or field
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Seed kind is not handled by the requested lineage mode
    #[error("Unsupported seed: {0}")]
    UnsupportedSeed(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(#[from] StorageError),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LineageError {
    pub fn not_found<E: std::fmt::Display>(e: E) -> Self {
        Self::NotFound(e.to_string())
    }

    pub fn unsupported_seed<E: std::fmt::Display>(e: E) -> Self {
        Self::UnsupportedSeed(e.to_string())
    }

    pub fn invalid_node_id<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidNodeId(e.to_string())
    }

    pub fn cancelled<E: std::fmt::Display>(e: E) -> Self {
        Self::Cancelled(e.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UpstreamFailure(_) | Self::Cancelled(_) => ErrorCategory::Transient,
            Self::NotFound(_)
            | Self::UnsupportedSeed(_)
            | Self::InvalidNodeId(_)
            | Self::Config(_) => ErrorCategory::Permanent,
        }
    }
}

/// Error category for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Transient error - retry automatically (e.g., timeout, store outage)
    Transient,
    /// Permanent error - don't retry (e.g., unknown seed, bad config)
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "transient" => Ok(ErrorCategory::Transient),
            "permanent" => Ok(ErrorCategory::Permanent),
            _ => Err(LineageError::Config(ConfigError::Invalid(format!(
                "Invalid error category: {}",
                s
            )))),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
