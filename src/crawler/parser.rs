//! HTML parser for listing and font detail pages
//!
//! This module extracts:
//! - Font detail links and the "next page" marker from listing pages
//! - Font name, foundry, license text and tags from detail pages
//!
//! What to extract is driven by the `[selectors]` configuration section.

use crate::config::SelectorConfig;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors raised while parsing a fetched page
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid CSS selector '{0}'")]
    Selector(String),

    #[error("No font name found on {url}")]
    MissingName { url: String },
}

/// Links extracted from one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Absolute font detail URLs in page order, without duplicates
    pub item_urls: Vec<String>,

    /// Whether the page links to a following listing page
    pub has_next: bool,
}

/// Font data parsed from a detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRecord {
    /// Detail page URL (normalized)
    pub url: String,

    pub name: String,
    pub foundry: Option<String>,

    /// License text as displayed on the page
    pub license: Option<String>,

    pub tags: Vec<String>,
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector(css.to_string()))
}

/// Parses a listing page
///
/// # Link Extraction Rules
///
/// **Include:** elements matching `item-link` with an `href`, resolved
/// against `base_url`
///
/// **Exclude:** `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only
/// links, and anything that does not resolve to HTTP(S)
///
/// # Example
///
/// ```
/// use sense_crawler::config::SelectorConfig;
/// use sense_crawler::crawler::parse_listing;
/// use url::Url;
///
/// let html = r#"<a class="font-card" href="/font/1">Nanum</a>"#;
/// let base = Url::parse("https://fonts.example.com/list?page=1").unwrap();
/// let page = parse_listing(html, &base, &SelectorConfig::default()).unwrap();
/// assert_eq!(page.item_urls, vec!["https://fonts.example.com/font/1"]);
/// ```
pub fn parse_listing(
    html: &str,
    base_url: &Url,
    selectors: &SelectorConfig,
) -> Result<ListingPage, ParseError> {
    let item_selector = selector(&selectors.item_link)?;
    let next_selector = selector(&selectors.next_page)?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let item_urls = document
        .select(&item_selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .filter(|url| seen.insert(url.clone()))
        .collect();

    let has_next = document.select(&next_selector).next().is_some();

    Ok(ListingPage {
        item_urls,
        has_next,
    })
}

/// Parses a font detail page
///
/// The name comes from the `name` selector, falling back to the page
/// `<title>`; a page with neither is a [`ParseError::MissingName`].
pub fn parse_font(
    html: &str,
    url: &str,
    selectors: &SelectorConfig,
) -> Result<FontRecord, ParseError> {
    let document = Html::parse_document(html);

    let name = first_text(&document, &selector(&selectors.name)?)
        .or_else(|| extract_title(&document))
        .ok_or_else(|| ParseError::MissingName {
            url: url.to_string(),
        })?;

    let foundry = first_text(&document, &selector(&selectors.foundry)?);
    let license = first_text(&document, &selector(&selectors.license)?);

    let tag_selector = selector(&selectors.tag)?;
    let mut tags: Vec<String> = Vec::new();
    for tag in document.select(&tag_selector).filter_map(element_text) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    Ok(FontRecord {
        url: url.to_string(),
        name,
        foundry,
        license,
        tags,
    })
}

/// Collapsed, trimmed text content of an element; `None` when blank
fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(element_text)
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;
    first_text(document, &title_selector)
}

/// Resolves a link href to an absolute URL and validates it
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url.to_string())
    } else {
        None
    }
}
