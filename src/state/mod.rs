//! State module for tracking crawl progress
//!
//! `ItemState` tracks each font detail page from discovery on a listing page
//! to its stored record or terminal failure.

mod item_state;

pub use item_state::ItemState;
