//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::storage::{RunRecord, Store};
use crate::HarvestError;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Records whose last detail fetch failed
    pub failed_records: u64,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl HarvestStatistics {
    /// Share of records with complete details, as a percentage
    pub fn completeness(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        let complete = self.total_records.saturating_sub(self.failed_records);
        (complete as f64 / self.total_records as f64) * 100.0
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(store: &dyn Store) -> Result<HarvestStatistics, HarvestError> {
    Ok(HarvestStatistics {
        total_records: store.count_records()?,
        failed_records: store.count_failed_records()?,
        latest_run: store.latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Records:");
    println!("  Total records: {}", stats.total_records);
    println!("  Detail fetch failed: {}", stats.failed_records);
    println!("  Complete: {:.1}%", stats.completeness());
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Started: {}", run.started_at);
            println!(
                "  Finished: {}",
                run.finished_at.as_deref().unwrap_or("(not finished)")
            );
            println!("  Status: {}", run.status.to_db_string());
            if let Some(termination) = &run.termination {
                println!("  Termination: {}", termination);
            }
            println!("  Pages visited: {}", run.pages_visited);
            println!(
                "  Items processed: {} ({} failed)",
                run.items_processed, run.items_failed
            );
            println!("  Records written: {}", run.records_written);
            println!("  Records dropped: {}", run.records_dropped);
        }
        None => println!("No harvest runs recorded yet"),
    }
}
