//! Collect stage: stores what the source yields as raw payloads.

use std::sync::Arc;

use anyhow::Context as _;
use serde_json::Value;
use tributary_types::{StateMap, SubtaskName, Verb};

use crate::context::Context;
use crate::stage::{Fetch, Stage};
use crate::stream::{Stream, Substream};

/// Collects one stream's payloads into its raw table.
pub struct Collector<S> {
    stream: Arc<S>,
}

impl<S: Stream> Collector<S> {
    pub fn new(stream: Arc<S>) -> Self {
        Self { stream }
    }
}

impl<S: Stream> Stage for Collector<S> {
    type Item = Value;

    fn verb(&self) -> Verb {
        Verb::Collect
    }

    fn name(&self) -> SubtaskName {
        Verb::Collect.subtask_name(self.stream.plugin_name(), self.stream.name())
    }

    fn fetch<'a>(&'a self, state: StateMap, ctx: &'a Context) -> anyhow::Result<Fetch<'a, Value>> {
        self.stream.collect(state, ctx)
    }

    fn process(&self, item: Value, ctx: &Context) -> anyhow::Result<()> {
        store_raw(self.stream.as_ref(), &item, ctx)
    }

    fn delete(&self, ctx: &Context) -> anyhow::Result<()> {
        delete_raw(self.stream.as_ref(), ctx)
    }
}

/// Collects a substream by fetching children of every stored parent record.
pub struct SubstreamCollector<S> {
    stream: Arc<S>,
}

impl<S: Substream> SubstreamCollector<S> {
    pub fn new(stream: Arc<S>) -> Self {
        Self { stream }
    }
}

impl<S: Substream> Stage for SubstreamCollector<S> {
    type Item = Value;

    fn verb(&self) -> Verb {
        Verb::Collect
    }

    fn name(&self) -> SubtaskName {
        Verb::Collect.subtask_name(self.stream.plugin_name(), self.stream.name())
    }

    fn fetch<'a>(&'a self, state: StateMap, ctx: &'a Context) -> anyhow::Result<Fetch<'a, Value>> {
        let parent_table = self.stream.parent_tool_table();
        let parents = ctx
            .store()
            .list_tool(&parent_table)
            .with_context(|| format!("listing parent records in {parent_table}"))?;
        tracing::debug!(
            stream = self.stream.name(),
            parent_table = parent_table.as_str(),
            parents = parents.len(),
            "Collecting substream"
        );

        let stream = self.stream.as_ref();
        let children = parents.into_iter().flat_map(move |row| {
            let parent = serde_json::from_value::<S::Parent>(row.into_data())
                .context("decoding parent record");
            let sequence = parent.and_then(|p| stream.collect_child(state.clone(), ctx, p));
            let items: Fetch<'a, Value> = match sequence {
                Ok(items) => items,
                Err(e) => Box::new(std::iter::once(Err(e))),
            };
            items
        });
        Ok(Box::new(children))
    }

    fn process(&self, item: Value, ctx: &Context) -> anyhow::Result<()> {
        store_raw(self.stream.as_ref(), &item, ctx)
    }

    fn delete(&self, ctx: &Context) -> anyhow::Result<()> {
        delete_raw(self.stream.as_ref(), ctx)
    }
}

fn store_raw<S: Stream + ?Sized>(stream: &S, item: &Value, ctx: &Context) -> anyhow::Result<()> {
    let data = serde_json::to_vec(item).context("encoding raw payload")?;
    ctx.store().insert_raw(&stream.raw_table(), &ctx.params(), &data)?;
    Ok(())
}

fn delete_raw<S: Stream + ?Sized>(stream: &S, ctx: &Context) -> anyhow::Result<()> {
    let table = stream.raw_table();
    let removed = ctx.store().delete_raw(&table, &ctx.params())?;
    tracing::info!(
        table = table.as_str(),
        scope_id = ctx.scope_id(),
        removed,
        "Deleted raw payloads for full refresh"
    );
    Ok(())
}
