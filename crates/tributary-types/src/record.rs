//! Storage rows for the three data representations.
//!
//! Raw payloads are tagged with a [`Params`] fingerprint. Tool rows carry an
//! [`Origin`] pointing back at the raw payload they were decoded from.
//! Domain rows carry a deterministic identifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::ConnectionId;

/// Fingerprint of a collection scope: which connection and which scope the
/// raw payloads were fetched for.
///
/// Compared by value; the encoded form is stable for equal values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Params {
    pub connection_id: ConnectionId,
    pub scope_id: String,
}

impl Params {
    #[must_use]
    pub fn new(connection_id: ConnectionId, scope_id: impl Into<String>) -> Self {
        Self {
            connection_id,
            scope_id: scope_id.into(),
        }
    }

    /// Encode as the JSON object string stored alongside raw payloads.
    ///
    /// # Errors
    ///
    /// Never fails for this shape; the `Result` mirrors `serde_json`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a stored params string.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a params object.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Unprocessed external payload captured during collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: i64,
    pub params: Params,
    pub data: Vec<u8>,
}

impl RawRecord {
    /// Decode the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.data)
    }
}

/// Back-reference from a tool row to the raw payload it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub raw_table: String,
    pub raw_id: i64,
    pub raw_params: Params,
}

impl Origin {
    #[must_use]
    pub fn of(raw_table: impl Into<String>, raw: &RawRecord) -> Self {
        Self {
            raw_table: raw_table.into(),
            raw_id: raw.id,
            raw_params: raw.params.clone(),
        }
    }
}

/// Stored tool-specific record.
///
/// The origin is fixed at construction; there is no way to repoint it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRow {
    table: String,
    primary_key: String,
    origin: Origin,
    data: Value,
}

impl ToolRow {
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        origin: Origin,
        data: Value,
    ) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            origin,
            data,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Consume the row, keeping only its payload.
    #[must_use]
    pub fn into_data(self) -> Value {
        self.data
    }
}

/// Stored canonical entity keyed by its generated domain id.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRow {
    pub table: String,
    pub id: String,
    pub data: Value,
}
