//! Storage contracts consumed by the run-loop and the stages.
//!
//! [`CheckpointStore`] persists run records and their resumption state.
//! [`RecordStore`] is the session the stages read and write records
//! through. Model types live in [`tributary_types`].

use tributary_types::{
    ConnectionId, DomainRow, Params, RawRecord, RunHandle, StateMap, SubtaskName, SubtaskRun,
    ToolRow,
};

use crate::error;

/// Persistence of subtask runs.
///
/// Every write must be durable before the call returns. Implementations
/// must be `Send + Sync` for use behind `Arc<dyn CheckpointStore>`.
pub trait CheckpointStore: Send + Sync {
    /// Create a run with empty state and no completion time.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start(&self, subtask: &SubtaskName, connection: ConnectionId) -> error::Result<RunHandle>;

    /// State of the newest completed run for (subtask, connection), or an
    /// empty state when there is none.
    ///
    /// Runs without a completion time are never considered.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure
    /// or if the stored state is not a JSON object.
    fn last_completed_state(
        &self,
        subtask: &SubtaskName,
        connection: ConnectionId,
    ) -> error::Result<StateMap>;

    /// Overwrite the run's state. Does not touch the completion time.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownRun`](crate::error::StateError::UnknownRun)
    /// if the handle does not name a run.
    fn checkpoint(&self, handle: RunHandle, state: &StateMap) -> error::Result<()>;

    /// Overwrite the run's state, record the truncating error (if any) and
    /// set the completion time to now.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownRun`](crate::error::StateError::UnknownRun)
    /// if the handle does not name a run.
    fn finalize(
        &self,
        handle: RunHandle,
        state: &StateMap,
        error: Option<&str>,
    ) -> error::Result<()>;

    /// Load one run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_run(&self, handle: RunHandle) -> error::Result<Option<SubtaskRun>>;

    /// All runs for (subtask, connection), oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_runs(
        &self,
        subtask: &SubtaskName,
        connection: ConnectionId,
    ) -> error::Result<Vec<SubtaskRun>>;
}

/// Record storage shared by the collect, extract and convert stages.
///
/// Writes are visible to later reads immediately; there is no per-run
/// transaction.
pub trait RecordStore: Send + Sync {
    /// Insert a raw payload tagged with `params`, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_raw(&self, table: &str, params: &Params, data: &[u8]) -> error::Result<i64>;

    /// Delete every raw payload in `table` whose params equal `params`.
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn delete_raw(&self, table: &str, params: &Params) -> error::Result<u64>;

    /// Every raw payload in `table`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_raw(&self, table: &str) -> error::Result<Vec<RawRecord>>;

    /// Insert or replace a tool row by (table, primary key).
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn upsert_tool(&self, row: &ToolRow) -> error::Result<()>;

    /// Every tool row in `table`, in first-insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_tool(&self, table: &str) -> error::Result<Vec<ToolRow>>;

    /// Insert or replace a domain row by (table, id).
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn upsert_domain(&self, row: &DomainRow) -> error::Result<()>;

    /// Every domain row in `table`, in first-insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_domain(&self, table: &str) -> error::Result<Vec<DomainRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_are_object_safe() {
        fn _checkpoints(_: &dyn CheckpointStore) {}
        fn _records(_: &dyn RecordStore) {}
    }
}
