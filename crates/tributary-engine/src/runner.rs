//! Checkpointing run-loop shared by every stage.
//!
//! [`SubtaskRunner`] is a lazy iterator over [`Progress`] signals. Each call
//! to `next` drives the stage until the next sync point, the end of the
//! fetch sequence, or the first error. A caller that stops pulling halts
//! the run in place: nothing is finalized and the last checkpoint stays as
//! written.

use tributary_state::CheckpointStore;
use tributary_types::{Progress, RunHandle, StateMap, SubtaskName};

use crate::context::Context;
use crate::errors::{ErrorPolicy, SubtaskError};
use crate::stage::{Fetch, Stage};

/// Items between two checkpoints unless configured otherwise.
pub const DEFAULT_SYNC_POINT_INTERVAL: u64 = 100;

/// Per-run options of the run-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Resume from the last completed state instead of deleting and
    /// starting from empty state.
    pub incremental: bool,
    /// Checkpoint every this many items. Must be positive.
    pub sync_point_interval: u64,
    pub error_policy: ErrorPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            incremental: true,
            sync_point_interval: DEFAULT_SYNC_POINT_INTERVAL,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl RunOptions {
    /// Full-refresh options with defaults for everything else.
    #[must_use]
    pub fn full_refresh() -> Self {
        Self {
            incremental: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_interval(mut self, sync_point_interval: u64) -> Self {
        self.sync_point_interval = sync_point_interval;
        self
    }

    #[must_use]
    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }
}

/// Outcome of a run driven to its end.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run: RunHandle,
    pub items_processed: u64,
    pub progress: Vec<Progress>,
    /// State the run was finalized with.
    pub state: StateMap,
    /// Message of the error that truncated the run, if any.
    pub error: Option<String>,
}

enum FetchPhase<'a, T> {
    /// `fetch` not called yet; holds the initial state.
    Pending(StateMap),
    Active(Fetch<'a, T>),
    Finished,
}

enum Step {
    Continue,
    Progress(Progress),
    Exhausted,
    Failed(SubtaskError),
}

/// Drives one stage for one connection.
pub struct SubtaskRunner<'a, S: Stage + ?Sized> {
    stage: &'a S,
    ctx: &'a Context,
    checkpoints: &'a dyn CheckpointStore,
    options: RunOptions,
    name: SubtaskName,
    handle: RunHandle,
    fetch: FetchPhase<'a, S::Item>,
    state: StateMap,
    index: u64,
    error: Option<String>,
}

impl<'a, S: Stage + ?Sized> SubtaskRunner<'a, S> {
    /// Start a run: create its run record, then either load the last
    /// completed state (incremental) or delete previous output and start
    /// from empty state (full refresh).
    ///
    /// If loading the state or the full-refresh delete fails, the run is
    /// finalized with empty state and the error message, and the returned
    /// runner is already finished.
    ///
    /// # Errors
    ///
    /// Returns [`SubtaskError::InvalidOptions`] if the sync point interval
    /// is zero and [`SubtaskError::State`] if the run record cannot be
    /// created; no run exists in either case. Under [`ErrorPolicy::Abort`]
    /// a load or delete failure is also returned, after finalizing.
    pub fn start(
        stage: &'a S,
        ctx: &'a Context,
        checkpoints: &'a dyn CheckpointStore,
        options: RunOptions,
    ) -> Result<Self, SubtaskError> {
        if options.sync_point_interval == 0 {
            return Err(SubtaskError::InvalidOptions(
                "sync_point_interval must be positive".to_string(),
            ));
        }
        let name = stage.name();
        let connection_id = ctx.connection_id();
        let handle = checkpoints.start(&name, connection_id)?;

        let mut runner = Self {
            stage,
            ctx,
            checkpoints,
            options,
            name,
            handle,
            fetch: FetchPhase::Finished,
            state: StateMap::new(),
            index: 0,
            error: None,
        };

        let initial = if options.incremental {
            checkpoints
                .last_completed_state(&runner.name, connection_id)
                .map_err(SubtaskError::from)
        } else {
            stage
                .delete(ctx)
                .map(|()| StateMap::new())
                .map_err(SubtaskError::Delete)
        };
        let initial = match initial {
            Ok(initial) => initial,
            Err(err) => {
                return match runner.finish(Some(err)) {
                    Some(Err(err)) => Err(err),
                    _ => Ok(runner),
                };
            }
        };

        tracing::info!(
            subtask = runner.name.as_str(),
            connection_id = connection_id.get(),
            run_id = handle.id(),
            incremental = options.incremental,
            resume_keys = initial.len(),
            "Subtask run started"
        );

        runner.fetch = FetchPhase::Pending(initial.clone());
        runner.state = initial;
        Ok(runner)
    }

    #[must_use]
    pub fn handle(&self) -> RunHandle {
        self.handle
    }

    /// Number of items whose `process` call succeeded so far.
    #[must_use]
    pub fn items_processed(&self) -> u64 {
        self.index
    }

    /// Most recently tracked state.
    #[must_use]
    pub fn state(&self) -> &StateMap {
        &self.state
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.fetch, FetchPhase::Finished)
    }

    /// Pull every remaining progress signal and summarize the run.
    ///
    /// # Errors
    ///
    /// Returns the interrupting error only under [`ErrorPolicy::Abort`];
    /// the run is finalized either way.
    pub fn run_to_end(mut self) -> Result<RunSummary, SubtaskError> {
        let mut progress = Vec::new();
        while let Some(step) = self.next() {
            progress.push(step?);
        }
        Ok(RunSummary {
            run: self.handle,
            items_processed: self.index,
            progress,
            state: self.state,
            error: self.error,
        })
    }

    fn step(&mut self) -> Step {
        if let FetchPhase::Pending(initial) = &self.fetch {
            let stage: &'a S = self.stage;
            let ctx: &'a Context = self.ctx;
            match stage.fetch(initial.clone(), ctx) {
                Ok(sequence) => self.fetch = FetchPhase::Active(sequence),
                Err(e) => return Step::Failed(SubtaskError::Fetch(e)),
            }
        }

        let FetchPhase::Active(sequence) = &mut self.fetch else {
            return Step::Exhausted;
        };

        let (item, next_state) = match sequence.next() {
            None => return Step::Exhausted,
            Some(Err(e)) => return Step::Failed(SubtaskError::Fetch(e)),
            Some(Ok(pair)) => pair,
        };

        let index = self.index;
        if let Err(error) = self.stage.process(item, self.ctx) {
            return Step::Failed(SubtaskError::Process { index, error });
        }
        self.state = next_state;
        self.index += 1;

        let interval = self.options.sync_point_interval;
        if index != 0 && index % interval == 0 {
            if let Err(e) = self.checkpoints.checkpoint(self.handle, &self.state) {
                return Step::Failed(e.into());
            }
            tracing::debug!(
                subtask = self.name.as_str(),
                run_id = self.handle.id(),
                index,
                "Checkpoint written"
            );
            let progress = Progress {
                increment: interval,
                current: index,
            };
            return Step::Progress(progress);
        }

        Step::Continue
    }

    /// Finalize with the last tracked state. Returns what `next` yields.
    fn finish(&mut self, failure: Option<SubtaskError>) -> Option<Result<Progress, SubtaskError>> {
        self.fetch = FetchPhase::Finished;

        if let Some(err) = &failure {
            tracing::error!(
                subtask = self.name.as_str(),
                connection_id = self.ctx.connection_id().get(),
                run_id = self.handle.id(),
                items_processed = self.index,
                error = %err,
                "Subtask run interrupted; finalizing with last tracked state"
            );
            self.error = Some(err.to_string());
        }

        let finalized = self
            .checkpoints
            .finalize(self.handle, &self.state, self.error.as_deref());

        match finalized {
            Ok(()) => tracing::info!(
                subtask = self.name.as_str(),
                run_id = self.handle.id(),
                items_processed = self.index,
                errored = failure.is_some(),
                "Subtask run finalized"
            ),
            Err(e) => {
                tracing::error!(
                    subtask = self.name.as_str(),
                    run_id = self.handle.id(),
                    error = %e,
                    "Failed to finalize subtask run"
                );
                if self.options.error_policy == ErrorPolicy::Abort {
                    return Some(Err(failure.unwrap_or_else(|| e.into())));
                }
            }
        }

        match (failure, self.options.error_policy) {
            (Some(err), ErrorPolicy::Abort) => Some(Err(err)),
            _ => None,
        }
    }
}

impl<S: Stage + ?Sized> Iterator for SubtaskRunner<'_, S> {
    type Item = Result<Progress, SubtaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_finished() {
            return None;
        }
        loop {
            match self.step() {
                Step::Continue => {}
                Step::Progress(progress) => return Some(Ok(progress)),
                Step::Exhausted => return self.finish(None),
                Step::Failed(err) => return self.finish(Some(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tributary_state::{SqliteBackend, StateError};
    use tributary_types::{ConnectionId, SubtaskRun, Verb};

    use super::*;

    /// Stage over a fixed list; item `i` carries state `{"next": i + 1}`.
    struct ListStage {
        len: u64,
        fail_process_at: Option<u64>,
        fail_delete: bool,
        processed: Mutex<Vec<u64>>,
        deletes: Mutex<u32>,
        fetched_from: Mutex<Vec<StateMap>>,
    }

    impl ListStage {
        fn new(len: u64) -> Self {
            Self {
                len,
                fail_process_at: None,
                fail_delete: false,
                processed: Mutex::new(Vec::new()),
                deletes: Mutex::new(0),
                fetched_from: Mutex::new(Vec::new()),
            }
        }
    }

    impl Stage for ListStage {
        type Item = u64;

        fn verb(&self) -> Verb {
            Verb::Collect
        }

        fn name(&self) -> SubtaskName {
            Verb::Collect.subtask_name("test", "list")
        }

        fn fetch<'a>(&'a self, state: StateMap, _ctx: &'a Context) -> anyhow::Result<Fetch<'a, u64>> {
            let start = state.get("next").and_then(serde_json::Value::as_u64).unwrap_or(0);
            self.fetched_from.lock().unwrap().push(state);
            Ok(Box::new(
                (start..self.len).map(|i| Ok((i, StateMap::new().with("next", i + 1)))),
            ))
        }

        fn process(&self, item: u64, _ctx: &Context) -> anyhow::Result<()> {
            if self.fail_process_at == Some(item) {
                anyhow::bail!("cannot store item {item}");
            }
            self.processed.lock().unwrap().push(item);
            Ok(())
        }

        fn delete(&self, _ctx: &Context) -> anyhow::Result<()> {
            if self.fail_delete {
                anyhow::bail!("table locked");
            }
            *self.deletes.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn setup() -> (Arc<SqliteBackend>, Context) {
        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        let ctx = Context::new(ConnectionId::new(1), "scope", backend.clone());
        (backend, ctx)
    }

    fn run_record(backend: &SqliteBackend, handle: RunHandle) -> SubtaskRun {
        backend.get_run(handle).unwrap().unwrap()
    }

    #[test]
    fn cadence_skips_index_zero_and_hits_multiples() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(250);
        let runner = SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::default())
            .unwrap();

        let summary = runner.run_to_end().unwrap();
        assert_eq!(
            summary.progress,
            vec![
                Progress { increment: 100, current: 100 },
                Progress { increment: 100, current: 200 },
            ]
        );
        assert_eq!(summary.items_processed, 250);
        assert_eq!(summary.state.get("next"), Some(&json!(250)));
    }

    #[test]
    fn interval_of_one_checkpoints_every_item_but_the_first() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(4);
        let runner = SubtaskRunner::start(
            &stage,
            &ctx,
            backend.as_ref(),
            RunOptions::default().with_interval(1),
        )
        .unwrap();

        let currents: Vec<u64> = runner.map(|p| p.unwrap().current).collect();
        assert_eq!(currents, vec![1, 2, 3]);
    }

    #[test]
    fn checkpoint_holds_state_yielded_with_checkpointed_item() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(10);
        let mut runner = SubtaskRunner::start(
            &stage,
            &ctx,
            backend.as_ref(),
            RunOptions::default().with_interval(4),
        )
        .unwrap();

        let first = runner.next().unwrap().unwrap();
        assert_eq!(first.current, 4);
        // Item 4 was yielded with {"next": 5}: resume after item 4.
        let run = run_record(&backend, runner.handle());
        assert_eq!(run.state.get("next"), Some(&json!(5)));
        assert!(run.completed.is_none());
        assert_eq!(*stage.processed.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_sequence_finalizes_with_initial_state() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(0);
        let runner = SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::default())
            .unwrap();
        let handle = runner.handle();

        let summary = runner.run_to_end().unwrap();
        assert!(summary.progress.is_empty());
        let run = run_record(&backend, handle);
        assert!(run.is_completed());
        assert!(run.state.is_empty());
        assert!(run.error.is_none());
    }

    #[test]
    fn full_refresh_deletes_and_ignores_previous_state() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(3);
        SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::default())
            .unwrap()
            .run_to_end()
            .unwrap();

        SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::full_refresh())
            .unwrap()
            .run_to_end()
            .unwrap();

        assert_eq!(*stage.deletes.lock().unwrap(), 1);
        let fetched = stage.fetched_from.lock().unwrap();
        assert!(fetched[1].is_empty());
        assert_eq!(*stage.processed.lock().unwrap(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn incremental_resumes_from_last_completed_state() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(5);
        SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::default())
            .unwrap()
            .run_to_end()
            .unwrap();
        let second = SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::default())
            .unwrap()
            .run_to_end()
            .unwrap();

        assert_eq!(stage.fetched_from.lock().unwrap()[1].get("next"), Some(&json!(5)));
        assert_eq!(second.items_processed, 0);
        assert_eq!(*stage.deletes.lock().unwrap(), 0);
    }

    #[test]
    fn process_failure_keeps_state_of_last_processed_item() {
        let (backend, ctx) = setup();
        let mut stage = ListStage::new(10);
        stage.fail_process_at = Some(6);
        let runner = SubtaskRunner::start(
            &stage,
            &ctx,
            backend.as_ref(),
            RunOptions::default().with_interval(5),
        )
        .unwrap();
        let handle = runner.handle();

        let summary = runner.run_to_end().unwrap();
        assert_eq!(summary.items_processed, 6);
        assert_eq!(summary.state.get("next"), Some(&json!(6)));
        let run = run_record(&backend, handle);
        assert!(run.is_completed());
        assert!(run.error.unwrap().contains("process failed at item 6"));
    }

    #[test]
    fn abort_policy_yields_error_once_after_finalizing() {
        let (backend, ctx) = setup();
        let mut stage = ListStage::new(10);
        stage.fail_process_at = Some(2);
        let mut runner = SubtaskRunner::start(
            &stage,
            &ctx,
            backend.as_ref(),
            RunOptions::default().with_error_policy(ErrorPolicy::Abort),
        )
        .unwrap();

        let err = runner.next().unwrap().expect_err("abort policy surfaces the error");
        assert_eq!(err.failed_index(), Some(2));
        assert!(runner.next().is_none());
        assert!(run_record(&backend, runner.handle()).is_completed());
    }

    #[test]
    fn failed_delete_finalizes_the_run_it_started() {
        let (backend, ctx) = setup();
        let mut stage = ListStage::new(3);
        stage.fail_delete = true;

        let mut runner =
            SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::full_refresh())
                .unwrap();
        assert!(runner.is_finished());
        assert!(runner.next().is_none());
        assert!(stage.fetched_from.lock().unwrap().is_empty());

        let run = run_record(&backend, runner.handle());
        assert!(run.is_completed());
        assert!(run.state.is_empty());
        assert_eq!(
            run.error.as_deref(),
            Some("delete before full refresh failed: table locked")
        );
    }

    #[test]
    fn failed_delete_is_returned_under_abort_after_finalizing() {
        let (backend, ctx) = setup();
        let mut stage = ListStage::new(3);
        stage.fail_delete = true;
        let options = RunOptions::full_refresh().with_error_policy(ErrorPolicy::Abort);

        let Err(err) = SubtaskRunner::start(&stage, &ctx, backend.as_ref(), options) else {
            panic!("abort policy returns the delete failure");
        };
        assert!(matches!(err, SubtaskError::Delete(_)));

        let runs = backend.list_runs(&stage.name(), ConnectionId::new(1)).unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].is_completed());
        assert!(runs[0].error.is_some());
    }

    #[test]
    fn zero_interval_is_rejected_before_any_run_exists() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(3);

        let Err(err) = SubtaskRunner::start(
            &stage,
            &ctx,
            backend.as_ref(),
            RunOptions::default().with_interval(0),
        ) else {
            panic!("zero interval must not start a run");
        };
        assert!(matches!(err, SubtaskError::InvalidOptions(_)));
        assert!(backend
            .list_runs(&stage.name(), ConnectionId::new(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn iterating_yields_each_sync_point_once() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(7);
        let runner = SubtaskRunner::start(
            &stage,
            &ctx,
            backend.as_ref(),
            RunOptions::default().with_interval(2),
        )
        .unwrap();

        let progress: Vec<Progress> = runner.map(Result::unwrap).collect();
        assert_eq!(
            progress,
            vec![
                Progress { increment: 2, current: 2 },
                Progress { increment: 2, current: 4 },
                Progress { increment: 2, current: 6 },
            ]
        );
    }

    #[test]
    fn finished_runner_stays_finished() {
        let (backend, ctx) = setup();
        let stage = ListStage::new(1);
        let mut runner = SubtaskRunner::start(&stage, &ctx, backend.as_ref(), RunOptions::default())
            .unwrap();
        assert!(runner.next().is_none());
        assert!(runner.is_finished());
        assert!(runner.next().is_none());
        assert_eq!(backend.list_runs(&stage.name(), ConnectionId::new(1)).unwrap().len(), 1);
    }

    struct RejectingCheckpoints(SqliteBackend);

    impl CheckpointStore for RejectingCheckpoints {
        fn start(
            &self,
            subtask: &SubtaskName,
            connection: ConnectionId,
        ) -> Result<RunHandle, StateError> {
            self.0.start(subtask, connection)
        }

        fn last_completed_state(
            &self,
            subtask: &SubtaskName,
            connection: ConnectionId,
        ) -> Result<StateMap, StateError> {
            self.0.last_completed_state(subtask, connection)
        }

        fn checkpoint(&self, _handle: RunHandle, _state: &StateMap) -> Result<(), StateError> {
            Err(StateError::Corrupt("disk full".into()))
        }

        fn finalize(
            &self,
            handle: RunHandle,
            state: &StateMap,
            error: Option<&str>,
        ) -> Result<(), StateError> {
            self.0.finalize(handle, state, error)
        }

        fn get_run(&self, handle: RunHandle) -> Result<Option<SubtaskRun>, StateError> {
            self.0.get_run(handle)
        }

        fn list_runs(
            &self,
            subtask: &SubtaskName,
            connection: ConnectionId,
        ) -> Result<Vec<SubtaskRun>, StateError> {
            self.0.list_runs(subtask, connection)
        }
    }

    #[test]
    fn checkpoint_failure_takes_the_finalize_path() {
        let (_records, ctx) = setup();
        let checkpoints = RejectingCheckpoints(SqliteBackend::in_memory().unwrap());
        let stage = ListStage::new(10);
        let runner = SubtaskRunner::start(
            &stage,
            &ctx,
            &checkpoints,
            RunOptions::default().with_interval(3),
        )
        .unwrap();
        let handle = runner.handle();

        let summary = runner.run_to_end().unwrap();
        assert!(summary.progress.is_empty());
        assert_eq!(summary.items_processed, 4);
        let run = checkpoints.get_run(handle).unwrap().unwrap();
        assert!(run.is_completed());
        assert_eq!(run.state.get("next"), Some(&json!(4)));
        assert!(run.error.unwrap().contains("disk full"));
    }
}
