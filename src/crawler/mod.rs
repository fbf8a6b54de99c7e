//! Crawler module for listing and font page processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching through the shared rate limiter, with retries
//! - HTML parsing of listing and font detail pages
//! - Overall crawl coordination and resumption

mod coordinator;
mod fetcher;
mod parser;

pub use coordinator::{run_crawl, Coordinator, CrawlReport};
pub use fetcher::{build_http_client, FetchError, FetchedPage, Fetcher};
pub use parser::{parse_font, parse_listing, FontRecord, ListingPage, ParseError};
