//! Output module for harvest summaries and reports
//!
//! This module handles:
//! - Printing the summary of a finished run
//! - Loading and printing store statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use crate::crawler::RunSummary;

/// Formats a run summary as a short human-readable report
pub fn format_run_summary(summary: &RunSummary) -> String {
    let outcome = if summary.is_aborted() {
        "ABORTED"
    } else {
        "DONE"
    };

    let mut report = format!("=== Harvest Run #{} {} ===\n\n", summary.run_id, outcome);
    report.push_str(&format!("  Termination: {}\n", summary.termination));
    report.push_str(&format!("  Pages visited: {}\n", summary.pages_visited));
    report.push_str(&format!(
        "  Items discovered: {} ({} duplicates skipped)\n",
        summary.items_discovered, summary.duplicates_skipped
    ));
    report.push_str(&format!(
        "  Items processed: {} ({} failed)\n",
        summary.items_processed, summary.items_failed
    ));
    report.push_str(&format!(
        "  Records written: {} ({} inserted, {} updated) in {} flushes\n",
        summary.records_written(),
        summary.records_inserted,
        summary.records_updated,
        summary.flushes
    ));
    if summary.records_dropped > 0 {
        report.push_str(&format!("  Records dropped: {}\n", summary.records_dropped));
    }
    report.push_str(&format!("  Elapsed: {:.1}s\n", summary.elapsed.as_secs_f64()));
    report
}
