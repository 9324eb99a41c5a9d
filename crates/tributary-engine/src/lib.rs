//! Resumable three-stage subtask engine.
//!
//! A [`Stage`] is a fetch / process / delete trio. The [`SubtaskRunner`]
//! drives one stage for one connection, checkpointing its opaque state at
//! fixed sync points so the next incremental run resumes where the last
//! completed run stopped. [`Collector`], [`Extractor`] and [`Convertor`]
//! implement the three pipeline roles over a tool-specific [`Stream`], and
//! a [`Plugin`] groups streams and exposes their subtasks by name.

#![warn(clippy::pedantic)]

pub mod collector;
pub mod config;
pub mod context;
pub mod convertor;
pub mod errors;
pub mod extractor;
pub mod plugin;
pub mod runner;
pub mod stage;
pub mod stream;

pub use collector::{Collector, SubstreamCollector};
pub use config::EngineConfig;
pub use context::Context;
pub use convertor::Convertor;
pub use errors::{ErrorPolicy, SubtaskError};
pub use extractor::Extractor;
pub use plugin::{Plugin, ProgressStream, StreamSubtasks};
pub use runner::{RunOptions, RunSummary, SubtaskRunner};
pub use stage::{Fetch, Stage};
pub use stream::{Converted, DomainRecord, Stream, Substream, ToolRecord};
