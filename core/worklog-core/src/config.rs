//! Runtime configuration loaded from `config.toml`.
//!
//! A missing file yields defaults. Every table and field is optional.
//!
//! ```toml
//! [watch]
//! flush_interval_ms = 2000
//! quiescence_ms = 1000
//! extra_ignore = ["dist", "*.bak"]
//!
//! [estimator]
//! diff_timeout_ms = 5000
//!
//! [docs]
//! enabled = true
//! index_file = "docs/INDEX.md"
//!
//! [[modules]]
//! pattern = "crates/parser"
//! module = "parser"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WorklogError};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WorklogConfig {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub modules: Vec<ModuleRuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub flush_interval_ms: u64,
    pub quiescence_ms: u64,
    pub channel_capacity: usize,
    pub extra_ignore: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 2000,
            quiescence_ms: 1000,
            channel_capacity: 1024,
            extra_ignore: Vec::new(),
        }
    }
}

impl WatchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub diff_timeout_ms: u64,
    pub git_binary: String,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            diff_timeout_ms: 5000,
            git_binary: "git".to_string(),
        }
    }
}

impl EstimatorConfig {
    pub fn diff_timeout(&self) -> Duration {
        Duration::from_millis(self.diff_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexScope {
    #[default]
    Repo,
    Docs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    pub enabled: bool,
    pub dir: String,
    pub index_file: String,
    pub scope: IndexScope,
    pub descriptions_file: Option<PathBuf>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "docs".to_string(),
            index_file: "docs/INDEX.md".to_string(),
            scope: IndexScope::Repo,
            descriptions_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModuleRuleConfig {
    pub pattern: String,
    pub module: String,
}

/// Loads the config at `path`, returning defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<WorklogConfig> {
    if !path.exists() {
        return Ok(WorklogConfig::default());
    }

    let content = fs_err::read_to_string(path)
        .map_err(|err| WorklogError::io(format!("Failed to read config {}", path.display()), err))?;
    toml::from_str::<WorklogConfig>(&content).map_err(|err| WorklogError::Config {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}
