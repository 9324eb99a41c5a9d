//! Checkpoint state and run-tracking model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// State bag
// ---------------------------------------------------------------------------

/// Opaque, stage-defined resumption state.
///
/// A JSON object with string keys. Keys are kept sorted so the encoded form
/// is stable for equal values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMap(Map<String, Value>);

impl StateMap {
    /// An empty state, used for full-refresh runs and first runs.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a value, returning the previous one for `key` if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Encode as a JSON object string for persistence.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a value cannot be encoded.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    /// Decode a persisted JSON object string.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a JSON object.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl From<Map<String, Value>> for StateMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<StateMap> for Value {
    fn from(state: StateMap) -> Self {
        Value::Object(state.0)
    }
}

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Subtask name, e.g. `"collectGithubIssues"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskName(String);

impl SubtaskName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubtaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for SubtaskName {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Identifier of the external connection a run works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(i64);

impl ConnectionId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConnectionId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Handle to a started run, used for subsequent checkpoint writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(i64);

impl RunHandle {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Checkpoint record of one execution attempt of one stage for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskRun {
    pub id: RunHandle,
    pub subtask_name: SubtaskName,
    pub connection_id: ConnectionId,
    pub started: DateTime<Utc>,
    /// Set only at finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    pub state: StateMap,
    /// Message of the error that truncated the run, if one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubtaskRun {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }
}
