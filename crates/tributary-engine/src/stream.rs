//! The tool-specific collaborator behind each pipeline.
//!
//! A [`Stream`] knows how to pull raw payloads from one external endpoint,
//! decode them into a tool record and map tool records to domain records.
//! The stages in [`crate::collector`], [`crate::extractor`] and
//! [`crate::convertor`] drive it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tributary_types::{StateMap, SubtaskMeta, Verb};

use crate::context::Context;
use crate::stage::Fetch;

/// Source-specific record decoded from one raw payload.
pub trait ToolRecord: Serialize + DeserializeOwned {
    /// Model name used in domain ids, e.g. `GithubIssue`.
    const MODEL: &'static str;

    /// Primary key within the tool table.
    fn primary_key(&self) -> String;
}

/// Canonical record produced by conversion.
pub trait DomainRecord: Serialize {
    /// Domain table the record is upserted into.
    fn table(&self) -> &str;
}

/// Result of converting one tool record.
#[derive(Debug, Clone, PartialEq)]
pub enum Converted<D> {
    Single(D),
    Many(Vec<D>),
    /// The conversion produced something that is not a domain record. The
    /// convertor logs the reason and skips it.
    Rejected(String),
}

impl<D> Converted<D> {
    /// Conversion that yields nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::Many(Vec::new())
    }
}

impl<D> From<D> for Converted<D> {
    fn from(record: D) -> Self {
        Self::Single(record)
    }
}

impl<D> FromIterator<D> for Converted<D> {
    fn from_iter<I: IntoIterator<Item = D>>(iter: I) -> Self {
        Self::Many(iter.into_iter().collect())
    }
}

/// One endpoint of an external tool.
pub trait Stream: Send + Sync {
    type Tool: ToolRecord;
    type Domain: DomainRecord;

    /// Stream name, unique within its plugin.
    fn name(&self) -> &str;

    /// Name of the owning plugin.
    fn plugin_name(&self) -> &str;

    /// Domain tables this stream converts into.
    fn domain_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Pull new payloads starting from `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached.
    fn collect<'a>(&'a self, state: StateMap, ctx: &'a Context) -> anyhow::Result<Fetch<'a, Value>>;

    /// Decode one raw payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not have the tool shape.
    fn extract(&self, raw: Value) -> anyhow::Result<Self::Tool> {
        Ok(serde_json::from_value(raw)?)
    }

    /// Map one tool record to zero or more domain records.
    ///
    /// # Errors
    ///
    /// Returns an error if conversion fails outright.
    fn convert(&self, tool: &Self::Tool, ctx: &Context) -> anyhow::Result<Converted<Self::Domain>>;

    /// Table raw payloads are stored in.
    fn raw_table(&self) -> String {
        format!("_raw_{}_{}", self.plugin_name(), self.name())
    }

    /// Table tool records are stored in.
    fn tool_table(&self) -> String {
        format!("_tool_{}_{}", self.plugin_name(), self.name())
    }

    /// Metadata for the subtask running `verb` over this stream.
    fn subtask_meta(&self, verb: Verb) -> SubtaskMeta {
        SubtaskMeta {
            name: verb.subtask_name(self.plugin_name(), self.name()),
            entry_point_name: verb,
            arguments: vec![self.name().to_owned()],
            required: true,
            enabled_by_default: true,
            description: verb.describe(self.plugin_name(), self.name()),
            domain_types: self.domain_types(),
        }
    }
}

/// A stream whose payloads are fetched once per stored parent record.
pub trait Substream: Stream {
    type Parent: ToolRecord;

    /// Tool table holding the parent records.
    fn parent_tool_table(&self) -> String;

    /// Pull child payloads of one parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached.
    fn collect_child<'a>(
        &'a self,
        state: StateMap,
        ctx: &'a Context,
        parent: Self::Parent,
    ) -> anyhow::Result<Fetch<'a, Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converted_collects_from_iterator() {
        let many: Converted<u8> = [1, 2].into_iter().collect();
        assert_eq!(many, Converted::Many(vec![1, 2]));
        assert_eq!(Converted::from(3u8), Converted::Single(3));
        assert_eq!(Converted::<u8>::none(), Converted::Many(vec![]));
    }
}
