//! Extract stage: decodes raw payloads into tool rows.

use std::sync::Arc;

use anyhow::Context as _;
use tributary_types::{Origin, RawRecord, StateMap, SubtaskName, ToolRow, Verb};

use crate::context::Context;
use crate::stage::{Fetch, Stage};
use crate::stream::{Stream, ToolRecord};

/// Re-extracts every raw payload of a stream on each run.
pub struct Extractor<S> {
    stream: Arc<S>,
}

impl<S: Stream> Extractor<S> {
    pub fn new(stream: Arc<S>) -> Self {
        Self { stream }
    }
}

impl<S: Stream> Stage for Extractor<S> {
    type Item = RawRecord;

    fn verb(&self) -> Verb {
        Verb::Extract
    }

    fn name(&self) -> SubtaskName {
        Verb::Extract.subtask_name(self.stream.plugin_name(), self.stream.name())
    }

    // Always a full pass; the state is handed back unchanged.
    fn fetch<'a>(&'a self, state: StateMap, ctx: &'a Context) -> anyhow::Result<Fetch<'a, RawRecord>> {
        let raws = ctx.store().list_raw(&self.stream.raw_table())?;
        Ok(Box::new(raws.into_iter().map(move |raw| Ok((raw, state.clone())))))
    }

    fn process(&self, raw: RawRecord, ctx: &Context) -> anyhow::Result<()> {
        let payload = raw
            .json()
            .with_context(|| format!("raw payload {} is not JSON", raw.id))?;
        let tool = self
            .stream
            .extract(payload)
            .with_context(|| format!("extracting raw payload {}", raw.id))?;
        let row = ToolRow::new(
            self.stream.tool_table(),
            tool.primary_key(),
            Origin::of(self.stream.raw_table(), &raw),
            serde_json::to_value(&tool)?,
        );
        ctx.store().upsert_tool(&row)?;
        Ok(())
    }

    fn delete(&self, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }
}
