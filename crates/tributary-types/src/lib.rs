//! Shared types for the tributary subtask engine.
//!
//! Pure data: the opaque state bag, run records, raw/tool/domain storage
//! rows, progress signals and subtask naming. Kept free of storage and
//! engine dependencies so every other crate can share them.

#![warn(clippy::pedantic)]

pub mod domain_id;
pub mod progress;
pub mod record;
pub mod state;
pub mod subtask;

pub use domain_id::{generate_domain_id, ToolIdentity};
pub use progress::Progress;
pub use record::{DomainRow, Origin, Params, RawRecord, ToolRow};
pub use state::{ConnectionId, RunHandle, StateMap, SubtaskName, SubtaskRun};
pub use subtask::{SubtaskMeta, Verb};
