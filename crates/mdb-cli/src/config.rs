//! Tool configuration (`--config <file>` or `MDB_CONFIG`).
//!
//! ```yaml
//! author: data-team
//! retry:
//!   max_attempts: 5
//!   base_delay_ms: 500
//!   max_delay_ms: 10000
//!   jitter: 0.2
//! timeout_secs: 20
//! concurrency: 8
//! output_format: xml
//! ```
//!
//! Command-line flags override the file; the file overrides built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use mdb_changelog::{OutputFormat, DEFAULT_AUTHOR};
use mdb_terms::RetryPolicy;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "MDB_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub author: Option<String>,
    pub retry: RetryConfig,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<f64>,
}

impl ToolConfig {
    /// Load `explicit`, else the file named by `MDB_CONFIG`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => env::var_os(CONFIG_ENV).map(PathBuf::from),
        };
        match path {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded tool config");
        Ok(config)
    }

    pub fn author(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.author.clone())
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
    }

    pub fn output_format(&self, flag: Option<OutputFormat>) -> Result<OutputFormat> {
        match (flag, &self.output_format) {
            (Some(f), _) => Ok(f),
            (None, Some(s)) => s.parse().map_err(anyhow::Error::msg),
            (None, None) => Ok(OutputFormat::default()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        if let Some(n) = self.retry.max_attempts {
            policy.max_attempts = n;
        }
        if let Some(ms) = self.retry.base_delay_ms {
            policy.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry.max_delay_ms {
            policy.max_delay = Duration::from_millis(ms);
        }
        if let Some(j) = self.retry.jitter {
            policy.jitter = j;
        }
        if let Some(secs) = self.timeout_secs {
            policy.timeout = Duration::from_secs(secs);
        }
        policy
    }
}
