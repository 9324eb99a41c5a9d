//! Idempotent DDL for the run and record tables.

/// Created on every open; safe to run against an existing database.
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS subtask_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subtask_name TEXT NOT NULL,
    connection_id INTEGER NOT NULL,
    started TEXT NOT NULL,
    completed TEXT,
    state TEXT NOT NULL DEFAULT '{}',
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_subtask_runs_resume
    ON subtask_runs (subtask_name, connection_id, started);

CREATE TABLE IF NOT EXISTS raw_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    params TEXT NOT NULL,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_records_params ON raw_records (table_name, params);

CREATE TABLE IF NOT EXISTS tool_records (
    table_name TEXT NOT NULL,
    primary_key TEXT NOT NULL,
    raw_table TEXT NOT NULL,
    raw_id INTEGER NOT NULL,
    raw_params TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (table_name, primary_key)
);

CREATE TABLE IF NOT EXISTS domain_records (
    table_name TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (table_name, id)
);
";
