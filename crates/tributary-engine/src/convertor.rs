//! Convert stage: maps tool rows to domain rows with deterministic ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::Value;
use tributary_types::{generate_domain_id, DomainRow, StateMap, SubtaskName, ToolIdentity, Verb};

use crate::context::Context;
use crate::stage::{Fetch, Stage};
use crate::stream::{Converted, DomainRecord, Stream, ToolRecord};

/// Converts every stored tool record of a stream on each run.
pub struct Convertor<S> {
    stream: Arc<S>,
    rejected: AtomicU64,
}

impl<S: Stream> Convertor<S> {
    pub fn new(stream: Arc<S>) -> Self {
        Self {
            stream,
            rejected: AtomicU64::new(0),
        }
    }

    /// Conversion results skipped because they were not domain records.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn upsert(&self, tool: &S::Tool, record: &S::Domain, ctx: &Context) -> anyhow::Result<()> {
        let primary_key = tool.primary_key();
        let id = generate_domain_id(
            ToolIdentity {
                plugin: self.stream.plugin_name(),
                model: <S::Tool as ToolRecord>::MODEL,
                primary_key: &primary_key,
            },
            ctx.connection_id(),
        );
        let mut data = serde_json::to_value(record).context("encoding domain record")?;
        if let Value::Object(fields) = &mut data {
            fields.insert("id".to_owned(), Value::String(id.clone()));
        } else {
            tracing::warn!(
                stream = self.stream.name(),
                table = record.table(),
                id = id.as_str(),
                "Domain record is not a JSON object; stored without an id field"
            );
        }
        ctx.store().upsert_domain(&DomainRow {
            table: record.table().to_owned(),
            id,
            data,
        })?;
        Ok(())
    }
}

impl<S: Stream> Stage for Convertor<S> {
    type Item = S::Tool;

    fn verb(&self) -> Verb {
        Verb::Convert
    }

    fn name(&self) -> SubtaskName {
        Verb::Convert.subtask_name(self.stream.plugin_name(), self.stream.name())
    }

    // Always a full pass; the state is handed back unchanged.
    fn fetch<'a>(&'a self, state: StateMap, ctx: &'a Context) -> anyhow::Result<Fetch<'a, S::Tool>> {
        let table = self.stream.tool_table();
        let rows = ctx.store().list_tool(&table)?;
        Ok(Box::new(rows.into_iter().map(move |row| {
            let key = row.primary_key().to_owned();
            let tool = serde_json::from_value::<S::Tool>(row.into_data())
                .with_context(|| format!("decoding tool record {key} in {table}"))?;
            Ok((tool, state.clone()))
        })))
    }

    fn process(&self, tool: S::Tool, ctx: &Context) -> anyhow::Result<()> {
        match self.stream.convert(&tool, ctx)? {
            Converted::Single(record) => self.upsert(&tool, &record, ctx),
            Converted::Many(records) => records
                .iter()
                .try_for_each(|record| self.upsert(&tool, record, ctx)),
            Converted::Rejected(reason) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    stream = self.stream.name(),
                    primary_key = %tool.primary_key(),
                    reason = reason.as_str(),
                    "Conversion did not produce a domain record; skipping"
                );
                Ok(())
            }
        }
    }

    fn delete(&self, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tributary_state::{RecordStore, SqliteBackend};
    use tributary_types::ConnectionId;

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct JiraLabel {
        key: String,
    }

    impl ToolRecord for JiraLabel {
        const MODEL: &'static str = "JiraLabel";

        fn primary_key(&self) -> String {
            self.key.clone()
        }
    }

    /// Serializes as a bare string rather than an object.
    #[derive(Serialize)]
    #[serde(transparent)]
    struct Tag(String);

    impl DomainRecord for Tag {
        fn table(&self) -> &str {
            "tags"
        }
    }

    struct LabelsStream;

    impl Stream for LabelsStream {
        type Tool = JiraLabel;
        type Domain = Tag;

        fn name(&self) -> &str {
            "labels"
        }

        fn plugin_name(&self) -> &str {
            "jira"
        }

        fn collect<'a>(&'a self, _state: StateMap, _ctx: &'a Context) -> anyhow::Result<Fetch<'a, Value>> {
            Ok(Box::new(std::iter::empty()))
        }

        fn convert(&self, tool: &JiraLabel, _ctx: &Context) -> anyhow::Result<Converted<Tag>> {
            Ok(Converted::Single(Tag(tool.key.clone())))
        }
    }

    #[test]
    fn non_object_record_is_stored_under_its_generated_id() {
        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        let ctx = Context::new(ConnectionId::new(4), "JRA", backend.clone());
        let convertor = Convertor::new(Arc::new(LabelsStream));

        convertor
            .process(JiraLabel { key: "backend".into() }, &ctx)
            .unwrap();

        let rows = backend.list_domain("tags").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "jira:JiraLabel:4:backend");
        assert_eq!(rows[0].data, json!("backend"));
        assert_eq!(convertor.rejected(), 0);
    }

    #[test]
    fn object_record_carries_its_id() {
        #[derive(Serialize)]
        struct Named {
            name: String,
        }

        impl DomainRecord for Named {
            fn table(&self) -> &str {
                "named"
            }
        }

        struct NamedStream;

        impl Stream for NamedStream {
            type Tool = JiraLabel;
            type Domain = Named;

            fn name(&self) -> &str {
                "labels"
            }

            fn plugin_name(&self) -> &str {
                "jira"
            }

            fn collect<'a>(&'a self, _state: StateMap, _ctx: &'a Context) -> anyhow::Result<Fetch<'a, Value>> {
                Ok(Box::new(std::iter::empty()))
            }

            fn convert(&self, tool: &JiraLabel, _ctx: &Context) -> anyhow::Result<Converted<Named>> {
                Ok(Converted::Single(Named { name: tool.key.clone() }))
            }
        }

        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        let ctx = Context::new(ConnectionId::new(4), "JRA", backend.clone());
        let convertor = Convertor::new(Arc::new(NamedStream));
        convertor
            .process(JiraLabel { key: "ui".into() }, &ctx)
            .unwrap();

        let rows = backend.list_domain("named").unwrap();
        assert_eq!(rows[0].data, json!({"name": "ui", "id": "jira:JiraLabel:4:ui"}));
    }
}
