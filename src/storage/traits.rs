//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::FontRecord;
use crate::state::ItemState;
use crate::storage::{Checkpoint, FontRow, ItemRecord, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid state transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: ItemState,
        to: ItemState,
    },

    #[error("Unknown value '{value}' in column {column}")]
    Corrupt { column: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Fonts =====

    /// Inserts a font or replaces the fields of the font with the same URL
    ///
    /// Tags are replaced as a whole. Returns the font ID.
    fn upsert_font(&mut self, font: &FontRecord, run_id: i64) -> StorageResult<i64>;

    /// Gets a font by its detail page URL
    fn get_font_by_url(&self, url: &str) -> StorageResult<Option<FontRow>>;

    /// Lists all fonts ordered by name
    fn list_fonts(&self) -> StorageResult<Vec<FontRow>>;

    // ===== Item States =====

    /// Records the state of an item in a run
    ///
    /// A URL not yet seen in the run starts out as `Discovered`. Moving to
    /// `Fetching` counts an attempt. Transitions rejected by
    /// [`ItemState::can_transition_to`] fail with
    /// [`StorageError::InvalidTransition`].
    fn record_item_state(
        &mut self,
        run_id: i64,
        url: &str,
        state: ItemState,
        status_code: Option<u16>,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets the state of an item in a run
    fn get_item_state(&self, run_id: i64, url: &str) -> StorageResult<Option<ItemState>>;

    // ===== Checkpoints =====

    /// Saves the listing progress of a run, replacing the previous checkpoint
    fn save_checkpoint(&mut self, run_id: i64, checkpoint: Checkpoint) -> StorageResult<()>;

    /// Loads the listing progress of a run
    fn load_checkpoint(&self, run_id: i64) -> StorageResult<Option<Checkpoint>>;

    // ===== Statistics =====

    /// Gets total font count
    fn count_fonts(&self) -> StorageResult<u64>;

    /// Counts the items of a run in the given state
    fn count_items_by_state(&self, run_id: i64, state: ItemState) -> StorageResult<u64>;

    /// Gets the items of a run that ended in an error state
    fn get_failures(&self, run_id: i64) -> StorageResult<Vec<ItemRecord>>;

    /// Gets font counts per license text, most common first
    ///
    /// Fonts without a license are counted under `None`.
    fn count_fonts_by_license(&self) -> StorageResult<Vec<(Option<String>, u64)>>;
}
