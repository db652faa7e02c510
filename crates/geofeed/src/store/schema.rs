//! `SQLite` schema definitions for geofeed.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the reports table.
///
/// `likes` and `rates` hold JSON arrays of user ids; `timestamp` is whole
/// seconds since the Unix epoch.
pub const CREATE_REPORTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS reports (
    report_id TEXT PRIMARY KEY,
    address TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    report_image TEXT NOT NULL,
    likes TEXT NOT NULL DEFAULT '[]',
    rates TEXT NOT NULL DEFAULT '[]',
    rating REAL NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index on timestamp for feed ordering.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_reports_timestamp ON reports(timestamp DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_REPORTS_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_METADATA_TABLE,
];

/// Columns selected whenever a full report is read, in row-mapping order.
pub const REPORT_COLUMNS: &str =
    "report_id, address, timestamp, report_image, likes, rates, rating";
