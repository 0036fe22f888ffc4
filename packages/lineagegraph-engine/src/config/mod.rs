//! Engine configuration
//!
//! Three sections, all optional in YAML:
//! - `traversal`: depth defaults and caps, fan-out boundary threshold
//! - `column`: which injected column-lineage strategies are attempted
//! - `request`: wall-clock timeout per lineage request
//!
//! # Examples
//!
//! ```rust,ignore
//! use lineagegraph_engine::config::LineageConfig;
//!
//! // Defaults with one override
//! let config = LineageConfig::default().traversal(|t| t.max_depth(50));
//!
//! // Versioned YAML
//! let config = LineageConfig::from_yaml_file("lineage.yaml")?;
//! ```

pub mod error;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use error::{ConfigError, ConfigResult};

/// Schema versions this build can read
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

const MAX_DEPTH_CAP: u32 = 1000;

// ═══════════════════════════════════════════════════════════════════════════
// Traversal
// ═══════════════════════════════════════════════════════════════════════════

/// Depth and fan-out settings shared by job and column traversals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraversalConfig {
    /// Depth used when a request does not name one
    pub default_depth: u32,

    /// Largest depth honoured; larger requests are clamped (1..=1000)
    pub max_depth: u32,

    /// A dataset read by more than this many jobs is a fan-out boundary (>= 1)
    pub fan_out_threshold: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            default_depth: 20,
            max_depth: 100,
            fan_out_threshold: 1,
        }
    }
}

impl TraversalConfig {
    pub fn default_depth(mut self, depth: u32) -> Self {
        self.default_depth = depth;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn fan_out_threshold(mut self, threshold: usize) -> Self {
        self.fan_out_threshold = threshold;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH_CAP {
            return Err(ConfigError::range_with_hint(
                "traversal.max_depth",
                self.max_depth,
                1,
                MAX_DEPTH_CAP,
                "Depth cap must allow at least one hop",
            ));
        }
        if self.default_depth > self.max_depth {
            return Err(ConfigError::range_with_hint(
                "traversal.default_depth",
                self.default_depth,
                0,
                self.max_depth,
                "Default depth cannot exceed traversal.max_depth",
            ));
        }
        if self.fan_out_threshold == 0 {
            return Err(ConfigError::range_with_hint(
                "traversal.fan_out_threshold",
                self.fan_out_threshold,
                1,
                usize::MAX,
                "A threshold of 0 would stop at every dataset; use 1 for single-consumer paths",
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Column strategies
// ═══════════════════════════════════════════════════════════════════════════

/// Which optional column-lineage strategies are attempted before iterating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnConfig {
    /// Try the injected federated strategy first
    pub federated: bool,

    /// Try the injected recursive-query strategy next
    pub recursive: bool,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            federated: true,
            recursive: true,
        }
    }
}

impl ColumnConfig {
    pub fn federated(mut self, enabled: bool) -> Self {
        self.federated = enabled;
        self
    }

    pub fn recursive(mut self, enabled: bool) -> Self {
        self.recursive = enabled;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestConfig {
    /// Wall-clock bound per request in milliseconds (0 = unlimited)
    pub timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl RequestConfig {
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LineageConfig
// ═══════════════════════════════════════════════════════════════════════════

/// Complete engine configuration (YAML schema v1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineageConfig {
    /// Schema version (always 1 for v1)
    pub version: u32,

    #[serde(default)]
    pub traversal: TraversalConfig,

    #[serde(default)]
    pub column: ColumnConfig,

    #[serde(default)]
    pub request: RequestConfig,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            version: 1,
            traversal: TraversalConfig::default(),
            column: ColumnConfig::default(),
            request: RequestConfig::default(),
        }
    }
}

impl LineageConfig {
    pub fn traversal(mut self, f: impl FnOnce(TraversalConfig) -> TraversalConfig) -> Self {
        self.traversal = f(self.traversal);
        self
    }

    pub fn column(mut self, f: impl FnOnce(ColumnConfig) -> ColumnConfig) -> Self {
        self.column = f(self.column);
        self
    }

    pub fn request(mut self, f: impl FnOnce(RequestConfig) -> RequestConfig) -> Self {
        self.request = f(self.request);
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }
        self.traversal.validate()
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content)?;
        if raw.get("version").is_none() {
            return Err(ConfigError::MissingVersion);
        }
        let config: Self = serde_yaml::from_value(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Depth to run with: the request's, or the default, capped at `max_depth`
    pub fn effective_depth(&self, requested: Option<u32>) -> u32 {
        let depth = requested.unwrap_or(self.traversal.default_depth);
        if depth > self.traversal.max_depth {
            warn!(
                "Requested depth {} exceeds traversal.max_depth {}, clamping",
                depth, self.traversal.max_depth
            );
            return self.traversal.max_depth;
        }
        depth
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request.timeout_ms > 0).then(|| Duration::from_millis(self.request.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = LineageConfig::default();
        config.validate().unwrap();
        assert_eq!(config.traversal.default_depth, 20);
        assert_eq!(config.traversal.max_depth, 100);
        assert_eq!(config.traversal.fan_out_threshold, 1);
        assert!(config.column.federated && config.column.recursive);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_range_validation() {
        let err = LineageConfig::default()
            .traversal(|t| t.max_depth(0))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Range { ref field, .. } if field == "traversal.max_depth"));

        let err = LineageConfig::default()
            .traversal(|t| t.max_depth(10).default_depth(11))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("traversal.default_depth"));

        let err = LineageConfig::default()
            .traversal(|t| t.fan_out_threshold(0))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("fan_out_threshold"));
    }

    #[test]
    fn test_effective_depth_clamps() {
        let config = LineageConfig::default().traversal(|t| t.max_depth(5).default_depth(3));
        assert_eq!(config.effective_depth(None), 3);
        assert_eq!(config.effective_depth(Some(4)), 4);
        assert_eq!(config.effective_depth(Some(500)), 5);
        assert_eq!(config.effective_depth(Some(0)), 0);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = LineageConfig::default().request(|r| r.timeout_ms(0));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = LineageConfig::default().column(|c| c.federated(false));
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("federated: false"));
        assert_eq!(LineageConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_partial_sections() {
        let config = LineageConfig::from_yaml_str(
            r#"
version: 1
traversal:
  max_depth: 40
request:
  timeout_ms: 250
"#,
        )
        .unwrap();
        assert_eq!(config.traversal.max_depth, 40);
        assert_eq!(config.traversal.default_depth, 20);
        assert_eq!(config.request.timeout_ms, 250);
        assert!(config.column.recursive);
    }

    #[test]
    fn test_yaml_file_loading() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"version: 1\ntraversal:\n  fan_out_threshold: 3\n")
            .unwrap();

        let config = LineageConfig::from_yaml_file(temp_file.path()).unwrap();
        assert_eq!(config.traversal.fan_out_threshold, 3);
    }

    #[test]
    fn test_yaml_missing_version() {
        let result = LineageConfig::from_yaml_str("traversal:\n  max_depth: 5\n");
        assert!(matches!(result.unwrap_err(), ConfigError::MissingVersion));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = LineageConfig::from_yaml_str("version: 2\n");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::UnsupportedVersion { found: 2, .. }
        ));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let result = LineageConfig::from_yaml_str("version: 1\ntraversal:\n  max_hops: 5\n");
        assert!(matches!(result.unwrap_err(), ConfigError::Yaml(_)));
    }
}
