//! Engine configuration types deserialized from YAML.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tributary_state::SqliteBackend;

use crate::errors::ErrorPolicy;
use crate::runner::{RunOptions, DEFAULT_SYNC_POINT_INTERVAL};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub engine: EngineSection,
}

/// Storage backend kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackendKind {
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("tributary-state.db")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackendKind::default(),
            path: default_state_path(),
        }
    }
}

/// Run-loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_sync_point_interval")]
    pub sync_point_interval: u64,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    #[serde(default = "default_incremental")]
    pub incremental: bool,
}

fn default_sync_point_interval() -> u64 {
    DEFAULT_SYNC_POINT_INTERVAL
}

fn default_incremental() -> bool {
    true
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            sync_point_interval: default_sync_point_interval(),
            error_policy: ErrorPolicy::default(),
            incremental: default_incremental(),
        }
    }
}

impl EngineConfig {
    /// Options the run-loop is driven with.
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            incremental: self.engine.incremental,
            sync_point_interval: self.engine.sync_point_interval,
            error_policy: self.engine.error_policy,
        }
    }

    /// Open the configured state database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_state(&self) -> anyhow::Result<SqliteBackend> {
        match self.state.backend {
            StateBackendKind::Sqlite => Ok(SqliteBackend::open(&self.state.path)?),
        }
    }
}
