//! Execution configuration
//!
//! Loaded from a JSON file; every field has a default:
//!
//! ```json
//! {
//!   "page_size": 4096,
//!   "num_buffers": 64,
//!   "join_strategy": "block_nested",
//!   "spill_dir": "/var/tmp/qproc",
//!   "log_level": "warn"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;
use crate::optimizer::{self, JoinStrategy, PlannerResult};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Page size, frame budget, join strategy and spill location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Bytes per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Total frames available to the query
    #[serde(default = "default_num_buffers")]
    pub num_buffers: usize,

    #[serde(default)]
    pub join_strategy: JoinStrategy,

    /// Where run files go (a fresh temporary directory if unset)
    #[serde(default)]
    pub spill_dir: Option<PathBuf>,

    /// Minimum log severity
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_page_size() -> usize {
    4096
}
fn default_num_buffers() -> usize {
    64
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            num_buffers: default_num_buffers(),
            join_strategy: JoinStrategy::default(),
            spill_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl ExecConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ExecConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be > 0".into()));
        }
        if self.num_buffers < 2 {
            return Err(ConfigError::Invalid(format!(
                "num_buffers must be at least 2, got {}",
                self.num_buffers
            )));
        }
        self.log_severity()?;
        Ok(())
    }

    pub fn log_severity(&self) -> ConfigResult<Severity> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log_level '{}'", self.log_level)))
    }

    /// Frames each join gets when the plan has `num_joins` joins
    pub fn buffers_per_join(&self, num_joins: usize) -> PlannerResult<usize> {
        optimizer::buffers_per_join(self.num_buffers, num_joins)
    }
}
