//! Batch accumulation and flushing of resolved records

use crate::record::LegislationRecord;
use crate::storage::{ItemError, Store};

/// Result of one flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushResult {
    /// Nothing was buffered
    Empty,

    /// The store accepted the batch; individual records may still have failed
    Written {
        inserted: usize,
        updated: usize,
        errors: Vec<ItemError>,
    },

    /// The store rejected the whole batch; the records are gone
    Failed { dropped: usize, reason: String },
}

impl FlushResult {
    /// Number of buffered records that did not reach the store
    pub fn dropped(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Written { errors, .. } => errors.len(),
            Self::Failed { dropped, .. } => *dropped,
        }
    }
}

/// Buffers resolved records and writes them to the store in bulk
pub struct BatchPersister {
    store: Box<dyn Store>,
    buffer: Vec<LegislationRecord>,
    threshold: usize,
}

impl BatchPersister {
    pub fn new(store: Box<dyn Store>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            buffer: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Buffers a record; returns true once the buffer has reached the threshold
    pub fn add(&mut self, record: LegislationRecord) -> bool {
        self.buffer.push(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.threshold
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes the oldest buffered records, at most one threshold's worth, as
    /// one bulk upsert
    ///
    /// The written records leave the buffer whatever the outcome; a rejected
    /// batch is not retried.
    pub fn flush(&mut self) -> FlushResult {
        if self.buffer.is_empty() {
            return FlushResult::Empty;
        }

        let take = self.buffer.len().min(self.threshold);
        let batch: Vec<LegislationRecord> = self.buffer.drain(..take).collect();
        tracing::info!(count = batch.len(), "Writing {} records to the store", batch.len());

        match self.store.bulk_upsert(&batch) {
            Ok(report) => {
                tracing::info!(
                    "Bulk write: {} inserted, {} updated, {} failed",
                    report.inserted,
                    report.updated,
                    report.errors.len()
                );
                FlushResult::Written {
                    inserted: report.inserted,
                    updated: report.updated,
                    errors: report.errors,
                }
            }
            Err(e) => {
                let identities: Vec<&str> = batch.iter().map(|r| r.identity.as_str()).collect();
                tracing::error!(
                    count = batch.len(),
                    "Bulk write failed, dropping {} records: {} ({})",
                    batch.len(),
                    e,
                    identities.join(", ")
                );
                FlushResult::Failed {
                    dropped: batch.len(),
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn store_mut(&mut self) -> &mut dyn Store {
        self.store.as_mut()
    }
}
