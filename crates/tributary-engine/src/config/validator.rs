//! Semantic validation for parsed engine configuration values.

use anyhow::{bail, Result};

use crate::config::types::{EngineConfig, StateBackendKind};

/// Validate a parsed engine configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.engine.sync_point_interval == 0 {
        errors.push("sync_point_interval must be at least 1".to_string());
    }

    match config.state.backend {
        StateBackendKind::Sqlite => {
            if config.state.path.as_os_str().is_empty() {
                errors.push("state.path must not be empty for the sqlite backend".to_string());
            } else if config.state.path.is_dir() {
                errors.push(format!(
                    "state.path '{}' is a directory",
                    config.state.path.display()
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
}
