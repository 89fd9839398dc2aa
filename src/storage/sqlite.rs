//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::crawler::RunSummary;
use crate::record::LegislationRecord;
use crate::storage::schema::{
    initialize_schema, INDEX_SQL, UPSERT_MINIMAL_SQL, UPSERT_RESOLVED_SQL,
};
use crate::storage::traits::{ItemError, StorageError, StorageResult, Store, UpsertReport};
use crate::storage::{RunRecord, RunStatus, StoredRecord};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

const TAG_SEPARATOR: &str = "; ";

const RECORD_COLUMNS: &str = "url, summary_title, summary_description, summary_status, title,
    abstract, original_text_url, original_text, source_proposal, origin, status, subject_tags,
    fetch_error, last_fetched_at, last_attempted_at, created_at, updated_at";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, termination,
    pages_visited, items_processed, items_failed, records_written, records_dropped";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Writes one record in its own transaction
    ///
    /// The outer error means no transaction could be started at all; the
    /// inner one is a failure of this record only.
    fn upsert_one(
        &mut self,
        record: &LegislationRecord,
        now: &str,
    ) -> StorageResult<Result<bool, rusqlite::Error>> {
        let tx = self.conn.transaction()?;

        match write_record(&tx, record, now) {
            Ok(inserted) => {
                tx.commit()?;
                Ok(Ok(inserted))
            }
            // Dropping the transaction rolls this record back
            Err(e) => Ok(Err(e)),
        }
    }
}

/// Upserts one record; returns true if it was inserted
fn write_record(tx: &Transaction<'_>, record: &LegislationRecord, now: &str) -> rusqlite::Result<bool> {
    let existed = tx
        .query_row(
            "SELECT 1 FROM legislation WHERE url = ?1",
            params![record.identity],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    let sql = if record.fetch_error {
        UPSERT_MINIMAL_SQL
    } else {
        UPSERT_RESOLVED_SQL
    };

    tx.execute(
        sql,
        params![
            record.identity,
            record.summary_title,
            record.summary_description,
            record.summary_status,
            record.title,
            record.abstract_text,
            record.original_text_url,
            record.original_text,
            record.source_proposal,
            record.origin,
            record.status,
            join_tags(&record.subject_tags),
            record.fetch_error,
            record.last_fetched_at.map(|t| t.to_rfc3339()),
            record.last_attempted_at.map(|t| t.to_rfc3339()),
            now,
        ],
    )?;

    Ok(!existed)
}

impl Store for SqliteStore {
    // ===== Legislation Records =====

    fn ensure_unique_index(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(INDEX_SQL).map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::ConstraintViolation(
                    msg.unwrap_or_else(|| "duplicate identities in legislation".to_string()),
                )
            }
            other => StorageError::Sqlite(other),
        })
    }

    fn bulk_upsert(&mut self, records: &[LegislationRecord]) -> StorageResult<UpsertReport> {
        let now = Utc::now().to_rfc3339();
        let mut report = UpsertReport::default();

        for record in records {
            match self.upsert_one(record, &now)? {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(url = %record.identity, "Failed to upsert record: {}", e);
                    report.errors.push(ItemError {
                        identity: record.identity.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    fn get_record(&self, identity: &str) -> StorageResult<Option<StoredRecord>> {
        let sql = format!("SELECT {} FROM legislation WHERE url = ?1", RECORD_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, params![identity], stored_record_from_row)
            .optional()?;
        Ok(record)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM legislation", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_failed_records(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM legislation WHERE fetch_error = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Run Management =====

    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, summary: &RunSummary) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let status = if summary.termination.is_aborted() {
            RunStatus::Aborted
        } else {
            RunStatus::Completed
        };

        let changed = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2, termination = ?3, pages_visited = ?4,
             items_processed = ?5, items_failed = ?6, records_written = ?7, records_dropped = ?8
             WHERE id = ?9",
            params![
                now,
                status.to_db_string(),
                summary.termination.to_string(),
                summary.pages_visited as i64,
                summary.items_processed as i64,
                summary.items_failed as i64,
                summary.records_written() as i64,
                summary.records_dropped as i64,
                run_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }
}

fn join_tags(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        None
    } else {
        Some(tags.join(TAG_SEPARATOR))
    }
}

fn split_tags(joined: Option<String>) -> Vec<String> {
    joined
        .map(|joined| {
            joined
                .split(TAG_SEPARATOR)
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_timestamp(index: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(index)?
        .map(|value| parse_timestamp(index, value))
        .transpose()
}

fn stored_record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let record = LegislationRecord {
        identity: row.get(0)?,
        summary_title: row.get(1)?,
        summary_description: row.get(2)?,
        summary_status: row.get(3)?,
        title: row.get(4)?,
        abstract_text: row.get(5)?,
        original_text_url: row.get(6)?,
        original_text: row.get(7)?,
        source_proposal: row.get(8)?,
        origin: row.get(9)?,
        status: row.get(10)?,
        subject_tags: split_tags(row.get(11)?),
        fetch_error: row.get(12)?,
        last_fetched_at: optional_timestamp(row, 13)?,
        last_attempted_at: optional_timestamp(row, 14)?,
    };

    Ok(StoredRecord {
        record,
        created_at: parse_timestamp(15, row.get(15)?)?,
        updated_at: parse_timestamp(16, row.get(16)?)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        termination: row.get(5)?,
        pages_visited: row.get::<_, i64>(6)? as u64,
        items_processed: row.get::<_, i64>(7)? as u64,
        items_failed: row.get::<_, i64>(8)? as u64,
        records_written: row.get::<_, i64>(9)? as u64,
        records_dropped: row.get::<_, i64>(10)? as u64,
    })
}
