//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::RunSummary;
use crate::record::LegislationRecord;
use crate::storage::{RunRecord, StoredRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A single record that could not be written during a bulk upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub identity: String,
    pub message: String,
}

/// Outcome of one bulk upsert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<ItemError>,
}

impl UpsertReport {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Trait for storage backend implementations
///
/// Records are keyed by identity. Writes are idempotent: storing the same
/// record twice leaves one row whose creation timestamp is the first one.
pub trait Store: Send {
    // ===== Legislation Records =====

    /// Creates the unique index on identity if it does not exist yet
    ///
    /// Must succeed before any upsert; a failure here prevents a run from
    /// starting.
    fn ensure_unique_index(&mut self) -> StorageResult<()>;

    /// Inserts or updates every record, each one independently
    ///
    /// A record that cannot be written is reported in
    /// `UpsertReport::errors` without affecting its siblings. `Err` means
    /// the store as a whole was unavailable.
    fn bulk_upsert(&mut self, records: &[LegislationRecord]) -> StorageResult<UpsertReport>;

    /// Gets a record by identity
    fn get_record(&self, identity: &str) -> StorageResult<Option<StoredRecord>>;

    /// Counts all stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts records whose last detail fetch failed
    fn count_failed_records(&self) -> StorageResult<u64>;

    // ===== Run Management =====

    /// Records the start of a harvest run
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Records the end of a harvest run with its summary
    fn finish_run(&mut self, run_id: i64, summary: &RunSummary) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;
}
