//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Legis-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    termination TEXT,
    pages_visited INTEGER NOT NULL DEFAULT 0,
    items_processed INTEGER NOT NULL DEFAULT 0,
    items_failed INTEGER NOT NULL DEFAULT 0,
    records_written INTEGER NOT NULL DEFAULT 0,
    records_dropped INTEGER NOT NULL DEFAULT 0
);

-- One row per legislation item, keyed by its canonical URL
CREATE TABLE IF NOT EXISTS legislation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL CHECK(length(url) > 0),
    summary_title TEXT,
    summary_description TEXT,
    summary_status TEXT,
    title TEXT,
    abstract TEXT,
    original_text_url TEXT,
    original_text TEXT,
    source_proposal TEXT,
    origin TEXT,
    status TEXT,
    subject_tags TEXT,
    fetch_error INTEGER NOT NULL DEFAULT 0,
    last_fetched_at TEXT,
    last_attempted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Indexes created before the first write of every run
pub const INDEX_SQL: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_legislation_url ON legislation(url);
CREATE INDEX IF NOT EXISTS idx_legislation_title_abstract ON legislation(title, abstract);
"#;

/// Upsert for a resolved record: every attribute column is replaced
///
/// `created_at` is only written on insert. `last_attempted_at` keeps its
/// previous value because a resolved record carries none.
pub const UPSERT_RESOLVED_SQL: &str = r#"
INSERT INTO legislation (
    url, summary_title, summary_description, summary_status, title, abstract,
    original_text_url, original_text, source_proposal, origin, status,
    subject_tags, fetch_error, last_fetched_at, last_attempted_at,
    created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
ON CONFLICT(url) DO UPDATE SET
    summary_title = excluded.summary_title,
    summary_description = excluded.summary_description,
    summary_status = excluded.summary_status,
    title = excluded.title,
    abstract = excluded.abstract,
    original_text_url = excluded.original_text_url,
    original_text = excluded.original_text,
    source_proposal = excluded.source_proposal,
    origin = excluded.origin,
    status = excluded.status,
    subject_tags = excluded.subject_tags,
    fetch_error = excluded.fetch_error,
    last_fetched_at = excluded.last_fetched_at,
    updated_at = excluded.updated_at
"#;

/// Upsert for a minimal record: only the fields it carries are replaced
///
/// Detail columns from an earlier successful fetch survive a failed one.
pub const UPSERT_MINIMAL_SQL: &str = r#"
INSERT INTO legislation (
    url, summary_title, summary_description, summary_status, title, abstract,
    original_text_url, original_text, source_proposal, origin, status,
    subject_tags, fetch_error, last_fetched_at, last_attempted_at,
    created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
ON CONFLICT(url) DO UPDATE SET
    summary_title = excluded.summary_title,
    summary_description = excluded.summary_description,
    summary_status = excluded.summary_status,
    fetch_error = excluded.fetch_error,
    last_attempted_at = excluded.last_attempted_at,
    updated_at = excluded.updated_at
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
