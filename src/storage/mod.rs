//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Parsed font records and their tags
//! - Per-run item states and failure messages
//! - Listing page checkpoints for resumption

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::ItemState;

/// A stored font
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRow {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub foundry: Option<String>,
    pub license: Option<String>,
    pub tags: Vec<String>,
    pub first_seen_run: i64,
    pub updated_at: String,
}

/// Processing state of one font URL within a run
#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub run_id: i64,
    pub url: String,
    pub state: ItemState,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub updated_at: String,
}

/// Listing progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Next listing page to fetch
    pub next_page: u32,

    /// Fonts stored by the run so far
    pub items_stored: u64,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    /// Whether a run in this status can be picked up again
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Interrupted)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
