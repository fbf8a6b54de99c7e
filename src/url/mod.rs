//! URL handling for the crawler
//!
//! Font detail links found on listing pages are normalized before they are
//! stored, so the same font reached through different links is fetched once.

mod normalize;

pub use normalize::normalize_url;
