//! Crawl summary types
//!
//! This module defines the data collected for a crawl summary and the
//! output error type.

use crate::state::ItemState;
use crate::storage::StorageError;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("No crawl runs found in database")]
    NoRuns,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A font page that ended in an error state
#[derive(Debug, Clone)]
pub struct FailureEntry {
    pub url: String,
    pub state: ItemState,
    pub status_code: Option<u16>,
    pub message: Option<String>,

    /// Fetch attempts recorded for the item (retries within one attempt are not counted)
    pub attempts: u32,
}

/// Summary statistics for a crawl run
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    // Run metadata
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    /// Next listing page of the run, if it saved a checkpoint
    pub next_page: Option<u32>,

    /// Fonts in the database across all runs
    pub total_fonts: u64,

    /// Item count per state for this run
    pub items_by_state: HashMap<ItemState, u64>,

    pub failures: Vec<FailureEntry>,

    /// Font count per license text, most common first
    pub license_breakdown: Vec<(Option<String>, u64)>,
}

impl CrawlSummary {
    /// Creates a new empty crawl summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Item count for one state
    pub fn items_in(&self, state: ItemState) -> u64 {
        self.items_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Returns the total number of items in terminal states
    pub fn total_terminal_items(&self) -> u64 {
        self.items_by_state
            .iter()
            .filter(|(state, _)| state.is_terminal())
            .map(|(_, count)| count)
            .sum()
    }

    /// Returns the number of items in error states
    pub fn total_errors(&self) -> u64 {
        self.items_by_state
            .iter()
            .filter(|(state, _)| state.is_error())
            .map(|(_, count)| count)
            .sum()
    }

    /// Returns the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let terminal = self.total_terminal_items();
        if terminal == 0 {
            return 0.0;
        }
        (self.items_in(ItemState::Stored) as f64 / terminal as f64) * 100.0
    }
}
