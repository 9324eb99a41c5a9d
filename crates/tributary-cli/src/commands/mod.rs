pub mod check;
pub mod history;
pub mod state;

use std::path::Path;

use anyhow::{Context, Result};
use tributary_engine::config::{parse_config, validate_config};
use tributary_state::SqliteBackend;

/// Parse and validate the config, then open its state database.
fn open_state(config_path: &Path) -> Result<SqliteBackend> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    validate_config(&config)?;
    tracing::debug!(path = %config.state.path.display(), "Opening state database");
    config.open_state()
}
