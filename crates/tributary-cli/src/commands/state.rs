use std::path::Path;

use anyhow::Result;
use tributary_state::CheckpointStore;
use tributary_types::{ConnectionId, StateMap, SubtaskName};

/// Execute the `state` command: print the resumption state as JSON.
pub fn execute(config_path: &Path, subtask: &str, connection: i64) -> Result<()> {
    let backend = super::open_state(config_path)?;
    let state = backend
        .last_completed_state(&SubtaskName::new(subtask), ConnectionId::new(connection))?;
    if state.is_empty() {
        tracing::info!(subtask, connection, "No completed run; next run starts from empty state");
    }
    println!("{}", render(&state)?);
    Ok(())
}

fn render(state: &StateMap) -> Result<String> {
    Ok(serde_json::to_string_pretty(state)?)
}
