//! Capability manager configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for a [`crate::CapabilityManager`], optionally read from TOML:
///
/// ```toml
/// cache_ttl_ms = 2000
/// cache_capacity = 512
/// default_creator = "session-manager"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// How long a memoized validation result stays usable. 0 disables caching.
    pub cache_ttl_ms: u64,

    /// Maximum number of memoized results before the cache is pruned.
    pub cache_capacity: usize,

    /// Creator identity stamped on tokens issued by the manager itself.
    pub default_creator: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5_000,
            cache_capacity: 1_024,
            default_creator: "runtime".to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    ///
    /// A file that exists but fails to parse is logged and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), error = %err, "ignoring invalid manager config");
            Self::default()
        })
    }
}
