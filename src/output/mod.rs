//! Output module for generating crawl summaries and reports
//!
//! This module handles:
//! - Collecting statistics about the latest crawl run
//! - Generating markdown summaries of crawl results

mod markdown;
pub mod stats;
mod summary;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use summary::{CrawlSummary, FailureEntry, OutputError, OutputResult};

use crate::storage::Storage;
use chrono::{DateTime, Utc};

/// Generates a crawl summary of the latest run from storage
///
/// # Arguments
///
/// * `storage` - The storage backend containing crawl data
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Successfully generated summary
/// * `Err(OutputError)` - No run exists or storage could not be queried
pub fn generate_summary(storage: &dyn Storage) -> OutputResult<CrawlSummary> {
    let stats = stats::load_statistics(storage)?;
    let run = stats.run.ok_or(OutputError::NoRuns)?;

    let duration_seconds = match (
        run.started_at.parse::<DateTime<Utc>>(),
        run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => {
            Some((finished - started).num_seconds().max(0) as u64)
        }
        _ => None,
    };

    let failures = storage
        .get_failures(run.id)?
        .into_iter()
        .map(|item| FailureEntry {
            url: item.url,
            state: item.state,
            status_code: item.status_code,
            message: item.error_message,
            attempts: item.attempts,
        })
        .collect();

    Ok(CrawlSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        next_page: stats.checkpoint.map(|c| c.next_page),
        total_fonts: stats.total_fonts,
        items_by_state: stats.items_by_state,
        failures,
        license_breakdown: stats.licenses,
    })
}
