//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties the pieces together:
//! - Opening storage and creating or resuming a run
//! - Walking the listing pages from the last checkpoint
//! - Fetching, parsing and storing every font detail page
//! - Recording per-item failures without stopping the batch
//! - Marking the run interrupted when cancelled

use crate::config::Config;
use crate::crawler::{parse_font, parse_listing, Fetcher};
use crate::retry::RetryError;
use crate::state::ItemState;
use crate::storage::{Checkpoint, RunStatus, SqliteStorage, Storage};
use crate::url::normalize_url;
use crate::{Cancelled, CrawlerError, UrlError};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Outcome of one call to [`Coordinator::run_until_cancelled`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    pub run_id: i64,

    /// Listing pages fetched in this call
    pub pages_walked: u32,

    /// Fonts stored by the run, including those stored before a resume
    pub items_stored: u64,

    /// Items that ended in an error state in this call
    pub items_failed: u64,

    /// Whether the crawl stopped because it was cancelled
    pub interrupted: bool,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    storage: SqliteStorage,
    fetcher: Fetcher,
    run_id: i64,
    next_page: u32,
    items_stored: u64,
    items_failed: u64,
    items_processed: u64,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Unless `fresh` is set, the latest run is resumed from its checkpoint
    /// when it is still `running` or `interrupted`.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, recorded with new runs
    /// * `fresh` - Whether to start a new run regardless of previous state
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlerError)` - Failed to initialize
    pub fn new(config: Config, config_hash: &str, fresh: bool) -> Result<Self, CrawlerError> {
        let fetcher = Fetcher::from_config(&config)?;
        Self::with_fetcher(config, config_hash, fresh, fetcher)
    }

    /// Like [`new`](Self::new), using an already built fetcher
    pub fn with_fetcher(
        config: Config,
        config_hash: &str,
        fresh: bool,
        fetcher: Fetcher,
    ) -> Result<Self, CrawlerError> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

        let resumable = if fresh {
            None
        } else {
            storage
                .get_latest_run()?
                .filter(|run| run.status.is_resumable())
        };

        let (run_id, checkpoint) = match resumable {
            Some(run) => {
                if run.config_hash != config_hash {
                    tracing::warn!(
                        "Resuming run {} with a configuration that changed since it started",
                        run.id
                    );
                }
                storage.update_run_status(run.id, RunStatus::Running)?;
                let checkpoint = storage.load_checkpoint(run.id)?;
                tracing::info!("Resuming run {} ({:?} before)", run.id, run.status);
                (run.id, checkpoint)
            }
            None => {
                let run_id = storage.create_run(config_hash)?;
                tracing::info!("Starting new run {}", run_id);
                (run_id, None)
            }
        };

        let next_page = checkpoint.map_or(config.crawler.start_page, |c| c.next_page);
        // Items stored after the last checkpoint are counted here too
        let items_stored = storage.count_items_by_state(run_id, ItemState::Stored)?;
        if next_page != config.crawler.start_page || items_stored > 0 {
            tracing::info!(
                "Continuing from listing page {} ({} fonts stored so far)",
                next_page,
                items_stored
            );
        }

        Ok(Self {
            config,
            storage,
            fetcher,
            run_id,
            next_page,
            items_stored,
            items_failed: 0,
            items_processed: 0,
        })
    }

    /// ID of the run this coordinator drives
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs the crawl to completion
    pub async fn run(&mut self) -> Result<CrawlReport, CrawlerError> {
        self.run_until_cancelled(&CancellationToken::new()).await
    }

    /// Runs the crawl until it completes, fails or `cancel` fires
    ///
    /// Cancellation is not an error: the run is marked `interrupted`, its
    /// checkpoint is kept, and the report has `interrupted` set.
    pub async fn run_until_cancelled(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, CrawlerError> {
        tracing::info!("Starting crawl run {}", self.run_id);
        let start_time = Instant::now();

        let result = self.walk_listing_pages(cancel).await;

        let (pages_walked, interrupted) = match result {
            Ok(pages) => {
                self.storage.complete_run(self.run_id)?;
                tracing::info!(
                    "Crawl completed: {} listing pages, {} fonts stored, {} failures in {:?}",
                    pages,
                    self.items_stored,
                    self.items_failed,
                    start_time.elapsed()
                );
                (pages, false)
            }
            Err((pages, CrawlerError::Cancelled(_))) => {
                self.storage
                    .update_run_status(self.run_id, RunStatus::Interrupted)?;
                tracing::info!(
                    "Crawl interrupted on listing page {}; resume to continue",
                    self.next_page
                );
                (pages, true)
            }
            Err((_, e)) => {
                tracing::error!("Crawl run {} failed: {}", self.run_id, e);
                self.storage
                    .update_run_status(self.run_id, RunStatus::Failed)?;
                return Err(e);
            }
        };

        Ok(CrawlReport {
            run_id: self.run_id,
            pages_walked,
            items_stored: self.items_stored,
            items_failed: self.items_failed,
            interrupted,
        })
    }

    /// Walks listing pages from the checkpoint, returning how many were fetched
    async fn walk_listing_pages(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<u32, (u32, CrawlerError)> {
        let last_page = self.config.crawler.last_page();
        let mut pages_walked = 0;

        for page in self.next_page..=last_page {
            let has_next = self
                .process_listing_page(page, cancel)
                .await
                .map_err(|e| (pages_walked, e))?;
            pages_walked += 1;

            self.next_page = page.saturating_add(1);
            self.storage
                .save_checkpoint(
                    self.run_id,
                    Checkpoint {
                        next_page: self.next_page,
                        items_stored: self.items_stored,
                    },
                )
                .map_err(|e| (pages_walked, CrawlerError::from(e)))?;

            if !has_next {
                tracing::info!("Listing page {} is the last one", page);
                break;
            }
        }

        Ok(pages_walked)
    }

    /// Fetches one listing page and processes its items
    ///
    /// Returns whether another listing page should follow.
    async fn process_listing_page(
        &mut self,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<bool, CrawlerError> {
        let listing_url = self.config.crawler.listing_page_url(page);
        tracing::info!("Fetching listing page {}: {}", page, listing_url);

        let fetched = match self.fetcher.fetch_page_or_cancel(&listing_url, cancel).await {
            Ok(fetched) => fetched,
            Err(RetryError::Cancelled) => return Err(Cancelled.into()),
            Err(RetryError::Failed(e)) => {
                tracing::error!("Listing page {} could not be fetched: {}", page, e);
                return Err(e.into());
            }
        };

        let base_url = Url::parse(&fetched.final_url)
            .or_else(|_| Url::parse(&listing_url))
            .map_err(|e| UrlError::Parse(e.to_string()))?;
        let listing = parse_listing(&fetched.body, &base_url, &self.config.selectors)?;

        if listing.item_urls.is_empty() {
            tracing::info!("Listing page {} has no fonts, stopping", page);
            return Ok(false);
        }

        tracing::debug!(
            "Listing page {} links to {} fonts",
            page,
            listing.item_urls.len()
        );

        for item_url in &listing.item_urls {
            if cancel.is_cancelled() {
                return Err(Cancelled.into());
            }
            self.process_item(item_url, cancel).await?;
        }

        Ok(listing.has_next)
    }

    /// Fetches, parses and stores a single font page
    ///
    /// Fetch and parse failures are recorded against the item and do not
    /// stop the crawl; storage failures and cancellation do.
    async fn process_item(
        &mut self,
        raw_url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlerError> {
        let url = match normalize_url(raw_url) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::debug!("Skipping unusable font link {}: {}", raw_url, e);
                return Ok(());
            }
        };

        if self.storage.get_item_state(self.run_id, &url)? == Some(ItemState::Stored) {
            tracing::debug!("Already stored in this run: {}", url);
            return Ok(());
        }

        self.storage
            .record_item_state(self.run_id, &url, ItemState::Fetching, None, None)?;

        match self.fetcher.fetch_page_or_cancel(&url, cancel).await {
            Err(RetryError::Cancelled) => return Err(Cancelled.into()),
            Err(RetryError::Failed(e)) => {
                let state = ItemState::from_fetch_error(&e);
                tracing::warn!("Giving up on {} ({}): {}", url, state, e);
                self.storage.record_item_state(
                    self.run_id,
                    &url,
                    state,
                    e.status_code(),
                    Some(&e.to_string()),
                )?;
                self.items_failed += 1;
            }
            Ok(fetched) => match parse_font(&fetched.body, &url, &self.config.selectors) {
                Ok(font) => {
                    self.storage.upsert_font(&font, self.run_id)?;
                    self.storage.record_item_state(
                        self.run_id,
                        &url,
                        ItemState::Stored,
                        Some(fetched.status_code),
                        None,
                    )?;
                    self.items_stored += 1;
                    tracing::debug!("Stored font '{}' from {}", font.name, url);
                }
                Err(e) => {
                    tracing::warn!("Failed to parse font page {}: {}", url, e);
                    self.storage.record_item_state(
                        self.run_id,
                        &url,
                        ItemState::ParseFailed,
                        Some(fetched.status_code),
                        Some(&e.to_string()),
                    )?;
                    self.items_failed += 1;
                }
            },
        }

        self.items_processed += 1;
        if self.items_processed % u64::from(self.config.crawler.progress_every.max(1)) == 0 {
            self.log_progress();
        }

        Ok(())
    }

    fn log_progress(&self) {
        let stats = self.fetcher.limiter().stats();
        tracing::info!(
            "Progress: {} fonts processed this session, {} stored, {} failed; \
             limiter: {} acquired, {} waited ({:?} total), {} rate limit hits, backoff x{}",
            self.items_processed,
            self.items_stored,
            self.items_failed,
            stats.acquired,
            stats.waited,
            stats.total_wait,
            stats.rate_limit_hits,
            self.fetcher.limiter().backoff_multiplier()
        );
    }
}

/// Runs the main crawl operation
///
/// Resumes the latest unfinished run unless `fresh` is set, and stops early
/// when `cancel` fires.
///
/// # Example
///
/// ```no_run
/// use sense_crawler::config::load_config_with_hash;
/// use sense_crawler::crawler::run_crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("crawler.toml"))?;
/// let report = run_crawl(config, &hash, false, &CancellationToken::new()).await?;
/// println!("{} fonts stored", report.items_stored);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
    cancel: &CancellationToken,
) -> Result<CrawlReport, CrawlerError> {
    let mut coordinator = Coordinator::new(config, config_hash, fresh)?;
    coordinator.run_until_cancelled(cancel).await
}
