//! Configuration management for taskboard.
//!
//! Configuration is a small TOML file. The first of these that exists wins:
//!
//! 1. an explicit `--config` path (or `TASKBOARD_CONFIG`);
//! 2. `<comm_dir>/taskboard.toml`;
//! 3. `<user config dir>/taskboard/config.toml`;
//!
//! and built-in defaults apply when none does. Command-line values override
//! whatever the file says.
//!
//! ```toml
//! comm_dir = "comm"
//! workspace_dir = "."
//! lock_timeout_secs = 30
//! confidence_threshold = 70
//! default_reconciliation_mode = "strict"
//! agent_cache_ttl_secs = 60
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{IntoTaskboardError, Result, TaskboardError};
use crate::lock::DEFAULT_LOCK_TIMEOUT_SECS;
use crate::reconcile::ReconciliationMode;
use crate::task::DEFAULT_AGENT_CACHE_TTL_SECS;
use crate::verify::DEFAULT_CONFIDENCE_THRESHOLD;

/// File name looked up inside the comm directory.
pub const COMM_CONFIG_FILE: &str = "taskboard.toml";

/// Default comm directory, relative to the working directory.
pub const DEFAULT_COMM_DIR: &str = "comm";

/// Where the config in effect came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    CommDir(PathBuf),
    User(PathBuf),
    Defaults,
}

impl ConfigSource {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(p) | Self::CommDir(p) | Self::User(p) => Some(p),
            Self::Defaults => None,
        }
    }
}

/// Settings shared by the library and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskboardConfig {
    /// Root holding `<agent>/<task_id>/` directories.
    pub comm_dir: PathBuf,
    /// Directory scanned for modified files during verification.
    /// Defaults to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,
    pub lock_timeout_secs: u64,
    pub confidence_threshold: u8,
    pub default_reconciliation_mode: String,
    pub agent_cache_ttl_secs: u64,
}

impl Default for TaskboardConfig {
    fn default() -> Self {
        Self {
            comm_dir: PathBuf::from(DEFAULT_COMM_DIR),
            workspace_dir: None,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            default_reconciliation_mode: ReconciliationMode::Strict.to_string(),
            agent_cache_ttl_secs: DEFAULT_AGENT_CACHE_TTL_SECS,
        }
    }
}

impl TaskboardConfig {
    /// Resolve configuration as described in the module docs.
    ///
    /// `comm_dir` is the command-line comm directory, if given; it both
    /// selects where to look for `taskboard.toml` and overrides the file.
    pub fn load(explicit: Option<&Path>, comm_dir: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let (mut config, source) = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(TaskboardError::config_with_path(
                        "config file does not exist",
                        path.to_path_buf(),
                    ));
                }
                (Self::load_file(path)?, ConfigSource::Explicit(path.to_path_buf()))
            }
            None => Self::discover(comm_dir)?,
        };

        if let Some(dir) = comm_dir {
            config.comm_dir = dir.to_path_buf();
        }
        config.validate()?;
        debug!(source = ?source, comm_dir = %config.comm_dir.display(), "Configuration loaded");
        Ok((config, source))
    }

    fn discover(comm_dir: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let comm = comm_dir.map_or_else(|| PathBuf::from(DEFAULT_COMM_DIR), Path::to_path_buf);
        let in_comm = comm.join(COMM_CONFIG_FILE);
        if in_comm.is_file() {
            return Ok((Self::load_file(&in_comm)?, ConfigSource::CommDir(in_comm)));
        }

        if let Some(user) = Self::user_config_path().filter(|p| p.is_file()) {
            return Ok((Self::load_file(&user)?, ConfigSource::User(user)));
        }

        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// `<config dir>/taskboard/config.toml`, when the platform has one.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("taskboard").join("config.toml"))
    }

    /// Load and parse one TOML file.
    pub fn load_file(path: &Path) -> Result<Self> {
        Self::read_file(path)
            .map_err(|e| TaskboardError::config_with_path(format!("{e:#}"), path.to_path_buf()))
    }

    fn read_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content).into_taskboard_config()
    }

    /// Reject settings no operation could work with.
    pub fn validate(&self) -> Result<()> {
        if self.comm_dir.as_os_str().is_empty() {
            return Err(TaskboardError::config("comm_dir must not be empty"));
        }
        if self.lock_timeout_secs == 0 {
            return Err(TaskboardError::config(
                "lock_timeout_secs must be greater than 0",
            ));
        }
        if self.confidence_threshold > 100 {
            return Err(TaskboardError::config(format!(
                "confidence_threshold must be between 0 and 100, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    #[must_use]
    pub fn agent_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_cache_ttl_secs)
    }

    /// Mode used when a completion request names none. Unknown names fall
    /// back to `reconcile`.
    #[must_use]
    pub fn reconciliation_mode(&self) -> ReconciliationMode {
        ReconciliationMode::parse(&self.default_reconciliation_mode)
    }

    /// Workspace to scan, defaulting to the working directory.
    #[must_use]
    pub fn workspace(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
