use std::path::Path;

use anyhow::{Context, Result};
use tributary_engine::config::{parse_config, validate_config};

/// Execute the `check` command: validate engine config and open the state database.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;

    validate_config(&config)?;
    println!("Config structure:  OK");

    let options = config.run_options();
    println!(
        "Run options:       incremental={} sync_point_interval={} error_policy={:?}",
        options.incremental, options.sync_point_interval, options.error_policy
    );

    match config.open_state() {
        Ok(_) => {
            println!("State backend:     OK ({})", config.state.path.display());
            println!("\nAll checks passed.");
            Ok(())
        }
        Err(e) => {
            println!("State backend:     FAILED");
            println!("  {e:#}");
            anyhow::bail!("One or more checks failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_and_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");
        let config = dir.path().join("tributary.yaml");
        std::fs::write(
            &config,
            format!("state:\n  path: {}\nengine:\n  sync_point_interval: 10\n", db.display()),
        )
        .unwrap();

        execute(&config).unwrap();
        assert!(db.exists());
    }

    #[test]
    fn check_reports_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("tributary.yaml");
        std::fs::write(&config, "engine:\n  sync_point_interval: 0\n").unwrap();

        let err = execute(&config).unwrap_err().to_string();
        assert!(err.contains("sync_point_interval"));
    }
}
