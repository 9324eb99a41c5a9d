//! Checkpoint and record persistence for the tributary subtask engine.
//!
//! Provides the [`CheckpointStore`] and [`RecordStore`] traits and a
//! [`SqliteBackend`] implementing both: run history with resumption
//! state, plus the raw, tool and domain record tables the stages read and
//! write.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{CheckpointStore, RecordStore};
pub use error::StateError;
pub use sqlite::SqliteBackend;
