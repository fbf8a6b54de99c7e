//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::FontRecord;
use crate::state::ItemState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{Checkpoint, FontRow, ItemRecord, RunRecord, RunStatus};
use crate::CrawlerError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlerError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_tags(&self, font_id: i64) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM font_tags WHERE font_id = ?1 ORDER BY position")?;
        let tags = stmt
            .query_map(params![font_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    fn font_with_tags(&self, mut font: FontRow) -> StorageResult<FontRow> {
        font.tags = self.load_tags(font.id)?;
        Ok(font)
    }
}

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status";
const FONT_COLUMNS: &str = "id, url, name, foundry, license, first_seen_run, updated_at";
const ITEM_COLUMNS: &str =
    "run_id, url, state, status_code, error_message, attempts, updated_at";

/// Run row with the status still in its database form
type RawRun = (i64, String, Option<String>, String, String);

fn raw_run(row: &Row<'_>) -> rusqlite::Result<RawRun> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn run_from_raw(raw: RawRun) -> StorageResult<RunRecord> {
    let (id, started_at, finished_at, config_hash, status) = raw;
    let status = RunStatus::from_db_string(&status).ok_or(StorageError::Corrupt {
        column: "runs.status",
        value: status,
    })?;
    Ok(RunRecord {
        id,
        started_at,
        finished_at,
        config_hash,
        status,
    })
}

fn font_from_row(row: &Row<'_>) -> rusqlite::Result<FontRow> {
    Ok(FontRow {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        foundry: row.get(3)?,
        license: row.get(4)?,
        tags: Vec::new(),
        first_seen_run: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn parse_item_state(value: String) -> StorageResult<ItemState> {
    ItemState::from_db_string(&value).ok_or(StorageError::Corrupt {
        column: "items.state",
        value,
    })
}

/// Item row with the state still in its database form
struct RawItem {
    run_id: i64,
    url: String,
    state: String,
    status_code: Option<u16>,
    error_message: Option<String>,
    attempts: u32,
    updated_at: String,
}

impl RawItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            url: row.get(1)?,
            state: row.get(2)?,
            status_code: row.get(3)?,
            error_message: row.get(4)?,
            attempts: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> StorageResult<ItemRecord> {
        Ok(ItemRecord {
            run_id: self.run_id,
            url: self.url,
            state: parse_item_state(self.state)?,
            status_code: self.status_code,
            error_message: self.error_message,
            attempts: self.attempts,
            updated_at: self.updated_at,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![run_id],
                raw_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))?;

        run_from_raw(raw)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT 1"),
                [],
                raw_run,
            )
            .optional()?
            .map(run_from_raw)
            .transpose()
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Fonts =====

    fn upsert_font(&mut self, font: &FontRecord, run_id: i64) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO fonts (url, name, foundry, license, first_seen_run, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                foundry = excluded.foundry,
                license = excluded.license,
                updated_at = excluded.updated_at",
            params![font.url, font.name, font.foundry, font.license, run_id, now],
        )?;

        let font_id: i64 = tx.query_row(
            "SELECT id FROM fonts WHERE url = ?1",
            params![font.url],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM font_tags WHERE font_id = ?1", params![font_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO font_tags (font_id, position, tag) VALUES (?1, ?2, ?3)",
            )?;
            for (position, tag) in font.tags.iter().enumerate() {
                stmt.execute(params![font_id, position as i64, tag])?;
            }
        }

        tx.commit()?;
        Ok(font_id)
    }

    fn get_font_by_url(&self, url: &str) -> StorageResult<Option<FontRow>> {
        self.conn
            .query_row(
                &format!("SELECT {FONT_COLUMNS} FROM fonts WHERE url = ?1"),
                params![url],
                font_from_row,
            )
            .optional()?
            .map(|font| self.font_with_tags(font))
            .transpose()
    }

    fn list_fonts(&self) -> StorageResult<Vec<FontRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FONT_COLUMNS} FROM fonts ORDER BY name COLLATE NOCASE, id"
        ))?;

        let fonts = stmt
            .query_map([], font_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        fonts
            .into_iter()
            .map(|font| self.font_with_tags(font))
            .collect()
    }

    // ===== Item States =====

    fn record_item_state(
        &mut self,
        run_id: i64,
        url: &str,
        state: ItemState,
        status_code: Option<u16>,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let current = self.get_item_state(run_id, url)?;

        if let Some(from) = current {
            if !from.can_transition_to(state) {
                return Err(StorageError::InvalidTransition {
                    url: url.to_string(),
                    from,
                    to: state,
                });
            }
        } else if state != ItemState::Discovered
            && !ItemState::Discovered.can_transition_to(state)
        {
            return Err(StorageError::InvalidTransition {
                url: url.to_string(),
                from: ItemState::Discovered,
                to: state,
            });
        }

        let attempt = u32::from(state == ItemState::Fetching);
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO items (run_id, url, state, status_code, error_message, attempts, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(run_id, url) DO UPDATE SET
                state = excluded.state,
                status_code = excluded.status_code,
                error_message = excluded.error_message,
                attempts = attempts + excluded.attempts,
                updated_at = excluded.updated_at",
            params![
                run_id,
                url,
                state.to_db_string(),
                status_code,
                error_message,
                attempt,
                now
            ],
        )?;
        Ok(())
    }

    fn get_item_state(&self, run_id: i64, url: &str) -> StorageResult<Option<ItemState>> {
        self.conn
            .query_row(
                "SELECT state FROM items WHERE run_id = ?1 AND url = ?2",
                params![run_id, url],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(parse_item_state)
            .transpose()
    }

    // ===== Checkpoints =====

    fn save_checkpoint(&mut self, run_id: i64, checkpoint: Checkpoint) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO checkpoints (run_id, next_page, items_stored, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(run_id) DO UPDATE SET
                next_page = excluded.next_page,
                items_stored = excluded.items_stored,
                updated_at = excluded.updated_at",
            params![
                run_id,
                checkpoint.next_page,
                checkpoint.items_stored as i64,
                now
            ],
        )?;
        Ok(())
    }

    fn load_checkpoint(&self, run_id: i64) -> StorageResult<Option<Checkpoint>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT next_page, items_stored FROM checkpoints WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(Checkpoint {
                        next_page: row.get(0)?,
                        items_stored: row.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint)
    }

    // ===== Statistics =====

    fn count_fonts(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fonts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_items_by_state(&self, run_id: i64, state: ItemState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE run_id = ?1 AND state = ?2",
            params![run_id, state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn get_failures(&self, run_id: i64) -> StorageResult<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE run_id = ?1 ORDER BY id"
        ))?;

        let raw_items = stmt
            .query_map(params![run_id], RawItem::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut failures = Vec::new();
        for raw in raw_items {
            let item = raw.into_record()?;
            if item.state.is_error() {
                failures.push(item);
            }
        }
        Ok(failures)
    }

    fn count_fonts_by_license(&self) -> StorageResult<Vec<(Option<String>, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT license, COUNT(*) AS n FROM fonts
             GROUP BY license ORDER BY n DESC, license",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font(url: &str, name: &str, license: Option<&str>, tags: &[&str]) -> FontRecord {
        FontRecord {
            url: url.to_string(),
            name: name.to_string(),
            foundry: Some("Naver".to_string()),
            license: license.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.config_hash, "test_hash");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_get_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(42),
            Err(StorageError::RunNotFound(42))
        ));
    }

    #[test]
    fn test_latest_run_and_status_updates() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_run().unwrap().is_none());

        let first = storage.create_run("a").unwrap();
        let second = storage.create_run("b").unwrap();
        assert_eq!(storage.get_latest_run().unwrap().unwrap().id, second);

        storage
            .update_run_status(second, RunStatus::Interrupted)
            .unwrap();
        assert_eq!(
            storage.get_run(second).unwrap().status,
            RunStatus::Interrupted
        );

        storage.complete_run(first).unwrap();
        let run = storage.get_run(first).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_upsert_font_replaces_fields_and_tags() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        let url = "https://fonts.example.com/font/1";

        let id1 = storage
            .upsert_font(&font(url, "Nanum Gothic", Some("OFL"), &["고딕", "sans"]), run_id)
            .unwrap();
        let id2 = storage
            .upsert_font(&font(url, "Nanum Gothic Bold", None, &["bold"]), run_id)
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(storage.count_fonts().unwrap(), 1);

        let stored = storage.get_font_by_url(url).unwrap().unwrap();
        assert_eq!(stored.name, "Nanum Gothic Bold");
        assert_eq!(stored.license, None);
        assert_eq!(stored.tags, vec!["bold"]);
        assert_eq!(stored.first_seen_run, run_id);
    }

    #[test]
    fn test_get_missing_font() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage
            .get_font_by_url("https://fonts.example.com/none")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_fonts_sorted_with_tags() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        storage
            .upsert_font(&font("https://f.example/2", "pretendard", None, &["sans"]), run_id)
            .unwrap();
        storage
            .upsert_font(&font("https://f.example/1", "Nanum", None, &["b", "a"]), run_id)
            .unwrap();

        let fonts = storage.list_fonts().unwrap();
        let names: Vec<_> = fonts.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Nanum", "pretendard"]);
        assert_eq!(fonts[0].tags, vec!["b", "a"]);
    }

    #[test]
    fn test_item_state_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        let url = "https://fonts.example.com/font/1";

        assert_eq!(storage.get_item_state(run_id, url).unwrap(), None);

        storage
            .record_item_state(run_id, url, ItemState::Discovered, None, None)
            .unwrap();
        storage
            .record_item_state(run_id, url, ItemState::Fetching, None, None)
            .unwrap();
        storage
            .record_item_state(run_id, url, ItemState::Failed, Some(503), Some("HTTP 503"))
            .unwrap();
        storage
            .record_item_state(run_id, url, ItemState::Fetching, None, None)
            .unwrap();
        storage
            .record_item_state(run_id, url, ItemState::Failed, Some(500), Some("HTTP 500"))
            .unwrap();

        let failures = storage.get_failures(run_id).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].attempts, 2);
        assert_eq!(failures[0].status_code, Some(500));
        assert_eq!(failures[0].error_message.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn test_invalid_item_transition_rejected() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        let url = "https://fonts.example.com/font/1";

        let result = storage.record_item_state(run_id, url, ItemState::Stored, None, None);
        assert!(matches!(
            result,
            Err(StorageError::InvalidTransition {
                from: ItemState::Discovered,
                to: ItemState::Stored,
                ..
            })
        ));

        storage
            .record_item_state(run_id, url, ItemState::Fetching, None, None)
            .unwrap();
        storage
            .record_item_state(run_id, url, ItemState::Stored, Some(200), None)
            .unwrap();
        let result = storage.record_item_state(run_id, url, ItemState::NotFound, None, None);
        assert!(matches!(
            result,
            Err(StorageError::InvalidTransition { .. })
        ));
        assert_eq!(
            storage.get_item_state(run_id, url).unwrap(),
            Some(ItemState::Stored)
        );
    }

    #[test]
    fn test_item_states_are_per_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = storage.create_run("hash").unwrap();
        let second = storage.create_run("hash").unwrap();
        let url = "https://fonts.example.com/font/1";

        storage
            .record_item_state(first, url, ItemState::Fetching, None, None)
            .unwrap();
        storage
            .record_item_state(first, url, ItemState::Stored, Some(200), None)
            .unwrap();

        assert_eq!(storage.get_item_state(second, url).unwrap(), None);
        assert_eq!(
            storage
                .count_items_by_state(first, ItemState::Stored)
                .unwrap(),
            1
        );
        assert_eq!(
            storage
                .count_items_by_state(second, ItemState::Stored)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();

        assert_eq!(storage.load_checkpoint(run_id).unwrap(), None);

        storage
            .save_checkpoint(
                run_id,
                Checkpoint {
                    next_page: 2,
                    items_stored: 20,
                },
            )
            .unwrap();
        storage
            .save_checkpoint(
                run_id,
                Checkpoint {
                    next_page: 3,
                    items_stored: 41,
                },
            )
            .unwrap();

        assert_eq!(
            storage.load_checkpoint(run_id).unwrap(),
            Some(Checkpoint {
                next_page: 3,
                items_stored: 41
            })
        );
    }

    #[test]
    fn test_count_fonts_by_license() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        storage
            .upsert_font(&font("https://f.example/1", "A", Some("OFL"), &[]), run_id)
            .unwrap();
        storage
            .upsert_font(&font("https://f.example/2", "B", Some("OFL"), &[]), run_id)
            .unwrap();
        storage
            .upsert_font(&font("https://f.example/3", "C", None, &[]), run_id)
            .unwrap();

        let breakdown = storage.count_fonts_by_license().unwrap();
        assert_eq!(breakdown[0], (Some("OFL".to_string()), 2));
        assert_eq!(breakdown[1], (None, 1));
    }
}
