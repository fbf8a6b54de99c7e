//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::output::summary::OutputResult;
use crate::state::ItemState;
use crate::storage::{Checkpoint, RunRecord, Storage};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Latest run, if any crawl has been started
    pub run: Option<RunRecord>,

    /// Checkpoint of the latest run
    pub checkpoint: Option<Checkpoint>,

    /// Total number of fonts stored
    pub total_fonts: u64,

    /// Count of the latest run's items by state
    pub items_by_state: HashMap<ItemState, u64>,

    /// Font count per license text, most common first
    pub licenses: Vec<(Option<String>, u64)>,
}

impl CrawlStatistics {
    /// Total items tracked by the latest run
    pub fn total_items(&self) -> u64 {
        self.items_by_state.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(OutputError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> OutputResult<CrawlStatistics> {
    let run = storage.get_latest_run()?;
    let total_fonts = storage.count_fonts()?;
    let licenses = storage.count_fonts_by_license()?;

    let mut items_by_state = HashMap::new();
    let mut checkpoint = None;

    if let Some(run) = &run {
        for state in ItemState::all_states() {
            let count = storage.count_items_by_state(run.id, state)?;
            if count > 0 {
                items_by_state.insert(state, count);
            }
        }
        checkpoint = storage.load_checkpoint(run.id)?;
    }

    Ok(CrawlStatistics {
        run,
        checkpoint,
        total_fonts,
        items_by_state,
        licenses,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Fonts stored: {}", stats.total_fonts);
    match &stats.run {
        Some(run) => {
            println!(
                "  Latest run: #{} ({}), started {}",
                run.id,
                run.status.to_db_string(),
                run.started_at
            );
            if let Some(checkpoint) = &stats.checkpoint {
                println!("  Next listing page: {}", checkpoint.next_page);
            }
        }
        None => println!("  No crawl runs yet"),
    }
    println!();

    let total_items = stats.total_items();
    if total_items > 0 {
        println!("Items by State:");
        let mut state_counts: Vec<_> = stats.items_by_state.iter().collect();
        state_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (state, count) in state_counts {
            let percentage = (*count as f64 / total_items as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", state, count, percentage);
        }
        println!();
    }

    if !stats.licenses.is_empty() {
        println!("Licenses:");
        for (license, count) in stats.licenses.iter().take(10) {
            println!("  {}: {}", license.as_deref().unwrap_or("(none)"), count);
        }
        println!();
    }

    let stored = stats
        .items_by_state
        .get(&ItemState::Stored)
        .copied()
        .unwrap_or(0);
    let success_rate = if total_items > 0 {
        (stored as f64 / total_items as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} items stored)",
        success_rate, stored, total_items
    );
}
