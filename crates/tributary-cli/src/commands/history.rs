use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use tributary_state::CheckpointStore;
use tributary_types::{ConnectionId, SubtaskName, SubtaskRun};

/// Execute the `history` command: list every run of a subtask, oldest first.
pub fn execute(config_path: &Path, subtask: &str, connection: i64) -> Result<()> {
    let backend = super::open_state(config_path)?;
    let runs = backend.list_runs(&SubtaskName::new(subtask), ConnectionId::new(connection))?;
    if runs.is_empty() {
        println!("No runs recorded for {subtask} on connection {connection}.");
        return Ok(());
    }
    print!("{}", render(&runs)?);
    Ok(())
}

fn render(runs: &[SubtaskRun]) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{:>6}  {:<32}  {:<32}  STATE", "RUN", "STARTED", "COMPLETED")?;
    for run in runs {
        let completed = run
            .completed
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
        writeln!(
            out,
            "{:>6}  {:<32}  {:<32}  {}",
            run.id.id(),
            run.started.to_rfc3339(),
            completed,
            run.state.to_json()?
        )?;
        if let Some(error) = &run.error {
            writeln!(out, "        error: {error}")?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_state::SqliteBackend;
    use tributary_types::StateMap;

    #[test]
    fn render_marks_open_runs_and_errors() {
        let backend = SqliteBackend::in_memory().unwrap();
        let name = SubtaskName::new("collectGithubIssues");
        let conn = ConnectionId::new(1);

        let done = backend.start(&name, conn).unwrap();
        backend
            .finalize(done, &StateMap::new().with("offset", 3), Some("fetch failed: timeout"))
            .unwrap();
        backend.start(&name, conn).unwrap();

        let out = render(&backend.list_runs(&name, conn).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains(r#"{"offset":3}"#));
        assert!(lines[2].contains("error: fetch failed: timeout"));
        assert!(lines[3].contains("  -  "));
    }
}
