//! `SQLite`-backed implementation of [`CheckpointStore`] and [`RecordStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. The connection runs
//! in autocommit mode, so every write is durable when the call returns.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tributary_types::{
    ConnectionId, DomainRow, Origin, Params, RawRecord, RunHandle, StateMap, SubtaskName,
    SubtaskRun, ToolRow,
};

use crate::backend::{CheckpointStore, RecordStore};
use crate::error::{self, StateError};
use crate::schema::CREATE_TABLES;

const RUN_COLUMNS: &str =
    "id, subtask_name, connection_id, started, completed, state, error";

/// Columns of a `subtask_runs` row as read from `SQLite`.
type RunRow = (
    i64,
    String,
    i64,
    String,
    Option<String>,
    String,
    Option<String>,
);

/// `SQLite`-backed run and record storage.
///
/// Create with [`SqliteBackend::open`] for file-backed persistence
/// or [`SqliteBackend::in_memory`] for tests.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or a `SQLite` error if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| StateError::context("open", e))?;
        let backend = Self::init(conn)?;
        tracing::debug!(path = %path.display(), "Opened SQLite state database");
        Ok(backend)
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns a `SQLite` error if the in-memory database can't be
    /// initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::context("open", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::context("create tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Current UTC time as fixed-width RFC 3339, so text order is time order.
    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_time(raw: &str) -> error::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StateError::Corrupt(format!("timestamp '{raw}': {e}")))
    }

    fn decode_run(row: RunRow) -> error::Result<SubtaskRun> {
        let (id, subtask_name, connection_id, started, completed, state, error) = row;
        Ok(SubtaskRun {
            id: RunHandle::new(id),
            subtask_name: SubtaskName::new(subtask_name),
            connection_id: ConnectionId::new(connection_id),
            started: Self::parse_time(&started)?,
            completed: completed.as_deref().map(Self::parse_time).transpose()?,
            state: StateMap::from_json(&state)?,
            error,
        })
    }

    fn read_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }
}

impl CheckpointStore for SqliteBackend {
    fn start(&self, subtask: &SubtaskName, connection: ConnectionId) -> error::Result<RunHandle> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO subtask_runs (subtask_name, connection_id, started, state) \
             VALUES (?1, ?2, ?3, '{}')",
            rusqlite::params![subtask.as_str(), connection.get(), Self::now()],
        )
        .map_err(|e| StateError::context("start", e))?;
        Ok(RunHandle::new(conn.last_insert_rowid()))
    }

    fn last_completed_state(
        &self,
        subtask: &SubtaskName,
        connection: ConnectionId,
    ) -> error::Result<StateMap> {
        let conn = self.lock_conn()?;
        let state: Option<String> = conn
            .query_row(
                "SELECT state FROM subtask_runs \
                 WHERE subtask_name = ?1 AND connection_id = ?2 AND completed IS NOT NULL \
                 ORDER BY started DESC, id DESC LIMIT 1",
                rusqlite::params![subtask.as_str(), connection.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StateError::context("last_completed_state", e))?;

        match state {
            Some(raw) => Ok(StateMap::from_json(&raw)?),
            None => Ok(StateMap::new()),
        }
    }

    fn checkpoint(&self, handle: RunHandle, state: &StateMap) -> error::Result<()> {
        let encoded = state.to_json()?;
        let conn = self.lock_conn()?;
        let updated = conn
            .execute(
                "UPDATE subtask_runs SET state = ?1 WHERE id = ?2",
                rusqlite::params![encoded, handle.id()],
            )
            .map_err(|e| StateError::context("checkpoint", e))?;
        if updated == 0 {
            return Err(StateError::UnknownRun(handle.id()));
        }
        Ok(())
    }

    fn finalize(
        &self,
        handle: RunHandle,
        state: &StateMap,
        error: Option<&str>,
    ) -> error::Result<()> {
        let encoded = state.to_json()?;
        let conn = self.lock_conn()?;
        let updated = conn
            .execute(
                "UPDATE subtask_runs SET state = ?1, completed = ?2, error = ?3 WHERE id = ?4",
                rusqlite::params![encoded, Self::now(), error, handle.id()],
            )
            .map_err(|e| StateError::context("finalize", e))?;
        if updated == 0 {
            return Err(StateError::UnknownRun(handle.id()));
        }
        Ok(())
    }

    fn get_run(&self, handle: RunHandle) -> error::Result<Option<SubtaskRun>> {
        let row = {
            let conn = self.lock_conn()?;
            conn.query_row(
                &format!("SELECT {RUN_COLUMNS} FROM subtask_runs WHERE id = ?1"),
                [handle.id()],
                Self::read_run_row,
            )
            .optional()
            .map_err(|e| StateError::context("get_run", e))?
        };
        row.map(Self::decode_run).transpose()
    }

    fn list_runs(
        &self,
        subtask: &SubtaskName,
        connection: ConnectionId,
    ) -> error::Result<Vec<SubtaskRun>> {
        let rows = {
            let conn = self.lock_conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM subtask_runs \
                     WHERE subtask_name = ?1 AND connection_id = ?2 \
                     ORDER BY started, id"
                ))
                .map_err(|e| StateError::context("list_runs", e))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![subtask.as_str(), connection.get()],
                    Self::read_run_row,
                )
                .map_err(|e| StateError::context("list_runs", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| StateError::context("list_runs", e))?;
            rows
        };
        rows.into_iter().map(Self::decode_run).collect()
    }
}

impl RecordStore for SqliteBackend {
    fn insert_raw(&self, table: &str, params: &Params, data: &[u8]) -> error::Result<i64> {
        let params = params.to_json()?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO raw_records (table_name, params, data, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![table, params, data, Self::now()],
        )
        .map_err(|e| StateError::context("insert_raw", e))?;
        Ok(conn.last_insert_rowid())
    }

    fn delete_raw(&self, table: &str, params: &Params) -> error::Result<u64> {
        let params = params.to_json()?;
        let conn = self.lock_conn()?;
        let removed = conn
            .execute(
                "DELETE FROM raw_records WHERE table_name = ?1 AND params = ?2",
                rusqlite::params![table, params],
            )
            .map_err(|e| StateError::context("delete_raw", e))?;
        Ok(removed as u64)
    }

    fn list_raw(&self, table: &str) -> error::Result<Vec<RawRecord>> {
        let rows: Vec<(i64, String, Vec<u8>)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn
                .prepare("SELECT id, params, data FROM raw_records WHERE table_name = ?1 ORDER BY id")
                .map_err(|e| StateError::context("list_raw", e))?;
            let rows = stmt
                .query_map([table], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .map_err(|e| StateError::context("list_raw", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| StateError::context("list_raw", e))?;
            rows
        };
        rows.into_iter()
            .map(|(id, params, data)| {
                Ok(RawRecord {
                    id,
                    params: Params::from_json(&params)?,
                    data,
                })
            })
            .collect()
    }

    fn upsert_tool(&self, row: &ToolRow) -> error::Result<()> {
        let origin = row.origin();
        let raw_params = origin.raw_params.to_json()?;
        let data = serde_json::to_string(row.data())?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO tool_records \
             (table_name, primary_key, raw_table, raw_id, raw_params, data) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(table_name, primary_key) DO UPDATE SET \
             raw_table = excluded.raw_table, raw_id = excluded.raw_id, \
             raw_params = excluded.raw_params, data = excluded.data",
            rusqlite::params![
                row.table(),
                row.primary_key(),
                origin.raw_table,
                origin.raw_id,
                raw_params,
                data,
            ],
        )
        .map_err(|e| StateError::context("upsert_tool", e))?;
        Ok(())
    }

    fn list_tool(&self, table: &str) -> error::Result<Vec<ToolRow>> {
        let rows: Vec<(String, String, i64, String, String)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT primary_key, raw_table, raw_id, raw_params, data \
                     FROM tool_records WHERE table_name = ?1 ORDER BY rowid",
                )
                .map_err(|e| StateError::context("list_tool", e))?;
            let rows = stmt
                .query_map([table], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })
                .map_err(|e| StateError::context("list_tool", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| StateError::context("list_tool", e))?;
            rows
        };
        rows.into_iter()
            .map(|(primary_key, raw_table, raw_id, raw_params, data)| {
                let origin = Origin {
                    raw_table,
                    raw_id,
                    raw_params: Params::from_json(&raw_params)?,
                };
                Ok(ToolRow::new(
                    table,
                    primary_key,
                    origin,
                    serde_json::from_str(&data)?,
                ))
            })
            .collect()
    }

    fn upsert_domain(&self, row: &DomainRow) -> error::Result<()> {
        let data = serde_json::to_string(&row.data)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO domain_records (table_name, id, data) VALUES (?1, ?2, ?3) \
             ON CONFLICT(table_name, id) DO UPDATE SET data = excluded.data",
            rusqlite::params![row.table, row.id, data],
        )
        .map_err(|e| StateError::context("upsert_domain", e))?;
        Ok(())
    }

    fn list_domain(&self, table: &str) -> error::Result<Vec<DomainRow>> {
        let rows: Vec<(String, String)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn
                .prepare("SELECT id, data FROM domain_records WHERE table_name = ?1 ORDER BY rowid")
                .map_err(|e| StateError::context("list_domain", e))?;
            let rows = stmt
                .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| StateError::context("list_domain", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| StateError::context("list_domain", e))?;
            rows
        };
        rows.into_iter()
            .map(|(id, data)| {
                Ok(DomainRow {
                    table: table.to_string(),
                    id,
                    data: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }
}
