//! Plugin registry: streams keyed by name and the subtasks they expose.

use std::sync::Arc;

use serde_json::Value;
use tributary_state::CheckpointStore;
use tributary_types::{Progress, SubtaskMeta, SubtaskName, Verb};

use crate::collector::{Collector, SubstreamCollector};
use crate::context::Context;
use crate::convertor::Convertor;
use crate::errors::SubtaskError;
use crate::extractor::Extractor;
use crate::runner::{RunOptions, SubtaskRunner};
use crate::stage::Stage;
use crate::stream::{Stream, Substream};

/// Progress sequence of one started subtask run.
pub type ProgressStream<'a> = Box<dyn Iterator<Item = Result<Progress, SubtaskError>> + 'a>;

/// The three stages of one registered stream, behind a uniform interface.
pub trait StreamSubtasks: Send + Sync {
    fn stream_name(&self) -> &str;

    /// Metadata of the collect, extract and convert subtasks, in that order.
    fn metas(&self) -> Vec<SubtaskMeta>;

    /// Start the run-loop for the stage behind `verb`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be started.
    fn run<'a>(
        &'a self,
        verb: Verb,
        ctx: &'a Context,
        checkpoints: &'a dyn CheckpointStore,
        options: RunOptions,
    ) -> Result<ProgressStream<'a>, SubtaskError>;
}

struct StreamEntry<S, C> {
    stream: Arc<S>,
    collector: C,
    extractor: Extractor<S>,
    convertor: Convertor<S>,
}

impl<S: Stream, C> StreamEntry<S, C> {
    fn new(stream: Arc<S>, collector: C) -> Self {
        Self {
            extractor: Extractor::new(Arc::clone(&stream)),
            convertor: Convertor::new(Arc::clone(&stream)),
            collector,
            stream,
        }
    }
}

fn start<'a, T>(
    stage: &'a T,
    ctx: &'a Context,
    checkpoints: &'a dyn CheckpointStore,
    options: RunOptions,
) -> Result<ProgressStream<'a>, SubtaskError>
where
    T: Stage + 'a,
    T::Item: 'a,
{
    Ok(Box::new(SubtaskRunner::start(stage, ctx, checkpoints, options)?))
}

impl<S, C> StreamSubtasks for StreamEntry<S, C>
where
    S: Stream,
    C: Stage<Item = Value> + Send + Sync,
{
    fn stream_name(&self) -> &str {
        self.stream.name()
    }

    fn metas(&self) -> Vec<SubtaskMeta> {
        Verb::ALL
            .iter()
            .map(|&verb| self.stream.subtask_meta(verb))
            .collect()
    }

    fn run<'a>(
        &'a self,
        verb: Verb,
        ctx: &'a Context,
        checkpoints: &'a dyn CheckpointStore,
        options: RunOptions,
    ) -> Result<ProgressStream<'a>, SubtaskError> {
        match verb {
            Verb::Collect => start(&self.collector, ctx, checkpoints, options),
            Verb::Extract => start(&self.extractor, ctx, checkpoints, options),
            Verb::Convert => start(&self.convertor, ctx, checkpoints, options),
        }
    }
}

/// A named set of streams.
pub struct Plugin {
    name: String,
    streams: Vec<Box<dyn StreamSubtasks>>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            streams: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a stream collected straight from its source.
    #[must_use]
    pub fn with_stream<S: Stream + 'static>(self, stream: S) -> Self {
        let stream = Arc::new(stream);
        let collector = Collector::new(Arc::clone(&stream));
        self.register(Box::new(StreamEntry::new(stream, collector)))
    }

    /// Register a stream collected once per stored parent record.
    #[must_use]
    pub fn with_substream<S: Substream + 'static>(self, stream: S) -> Self {
        let stream = Arc::new(stream);
        let collector = SubstreamCollector::new(Arc::clone(&stream));
        self.register(Box::new(StreamEntry::new(stream, collector)))
    }

    // Streams are keyed by name; a later registration replaces an earlier one.
    fn register(mut self, entry: Box<dyn StreamSubtasks>) -> Self {
        if let Some(slot) = self
            .streams
            .iter_mut()
            .find(|s| s.stream_name() == entry.stream_name())
        {
            tracing::warn!(
                plugin = self.name.as_str(),
                stream = entry.stream_name(),
                "Replacing previously registered stream"
            );
            *slot = entry;
        } else {
            self.streams.push(entry);
        }
        self
    }

    /// Registered stream names, in registration order.
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(|s| s.stream_name())
    }

    /// Metadata of every subtask: per stream, collect, extract and convert.
    #[must_use]
    pub fn subtask_metas(&self) -> Vec<SubtaskMeta> {
        self.streams.iter().flat_map(|s| s.metas()).collect()
    }

    /// Names of every subtask, in the order of [`Plugin::subtask_metas`].
    #[must_use]
    pub fn subtasks(&self) -> Vec<SubtaskName> {
        self.subtask_metas().into_iter().map(|m| m.name).collect()
    }

    /// Start the `verb` stage of `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`SubtaskError::UnknownStream`] if no stream has that name,
    /// or the error that prevented the run from starting.
    pub fn run<'a>(
        &'a self,
        verb: Verb,
        stream: &str,
        ctx: &'a Context,
        checkpoints: &'a dyn CheckpointStore,
        options: RunOptions,
    ) -> Result<ProgressStream<'a>, SubtaskError> {
        let entry = self
            .streams
            .iter()
            .find(|s| s.stream_name() == stream)
            .ok_or_else(|| SubtaskError::UnknownStream(stream.to_owned()))?;
        entry.run(verb, ctx, checkpoints, options)
    }

    /// Start the collect stage of `stream`.
    ///
    /// # Errors
    ///
    /// See [`Plugin::run`].
    pub fn collect<'a>(
        &'a self,
        ctx: &'a Context,
        stream: &str,
        checkpoints: &'a dyn CheckpointStore,
        options: RunOptions,
    ) -> Result<ProgressStream<'a>, SubtaskError> {
        self.run(Verb::Collect, stream, ctx, checkpoints, options)
    }

    /// Start the extract stage of `stream`.
    ///
    /// # Errors
    ///
    /// See [`Plugin::run`].
    pub fn extract<'a>(
        &'a self,
        ctx: &'a Context,
        stream: &str,
        checkpoints: &'a dyn CheckpointStore,
        options: RunOptions,
    ) -> Result<ProgressStream<'a>, SubtaskError> {
        self.run(Verb::Extract, stream, ctx, checkpoints, options)
    }

    /// Start the convert stage of `stream`.
    ///
    /// # Errors
    ///
    /// See [`Plugin::run`].
    pub fn convert<'a>(
        &'a self,
        ctx: &'a Context,
        stream: &str,
        checkpoints: &'a dyn CheckpointStore,
        options: RunOptions,
    ) -> Result<ProgressStream<'a>, SubtaskError> {
        self.run(Verb::Convert, stream, ctx, checkpoints, options)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("streams", &self.stream_names().collect::<Vec<_>>())
            .finish()
    }
}
