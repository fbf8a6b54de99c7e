/// Font item state definitions for tracking crawl progress
///
/// Every font detail URL found on a listing page moves through these states.
use crate::crawler::FetchError;
use std::fmt;

/// Represents the current state of a font item in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    // ===== Active States =====
    /// Item link was found on a listing page
    Discovered,

    /// Item page is being fetched
    Fetching,

    // ===== Terminal Success States =====
    /// Item page was fetched, parsed and stored
    Stored,

    // ===== Terminal Error States =====
    /// Item page returned 404/410
    NotFound,

    /// Connection failed or timed out after all retries
    Unreachable,

    /// Still rate limited after all retries
    RateLimited,

    /// Any other fetch failure (other 4xx, exhausted 5xx, unexpected content)
    Failed,

    /// Page was fetched but no font could be parsed out of it
    ParseFailed,
}

impl ItemState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the item may still be processed in this run
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Discovered | Self::Fetching)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::Unreachable
                | Self::RateLimited
                | Self::Failed
                | Self::ParseFailed
        )
    }

    /// Checks whether moving from `self` to `next` is allowed
    ///
    /// Any item may be (re)fetched; terminal states are only reached from
    /// `Fetching`.
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        match (self, next) {
            (_, Self::Fetching) => true,
            (Self::Fetching, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Maps a terminal fetch failure to the state recorded for the item
    pub fn from_fetch_error(error: &FetchError) -> Self {
        match error {
            FetchError::RateLimited { .. } => Self::RateLimited,
            FetchError::Client { status, .. } if matches!(*status, 404 | 410) => Self::NotFound,
            FetchError::Timeout { .. } | FetchError::Connect { .. } => Self::Unreachable,
            _ => Self::Failed,
        }
    }

    /// Converts the item state to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Fetching => "fetching",
            Self::Stored => "stored",
            Self::NotFound => "not_found",
            Self::Unreachable => "unreachable",
            Self::RateLimited => "rate_limited",
            Self::Failed => "failed",
            Self::ParseFailed => "parse_failed",
        }
    }

    /// Parses an item state from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "fetching" => Some(Self::Fetching),
            "stored" => Some(Self::Stored),
            "not_found" => Some(Self::NotFound),
            "unreachable" => Some(Self::Unreachable),
            "rate_limited" => Some(Self::RateLimited),
            "failed" => Some(Self::Failed),
            "parse_failed" => Some(Self::ParseFailed),
            _ => None,
        }
    }

    /// Returns all possible item states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Discovered,
            Self::Fetching,
            Self::Stored,
            Self::NotFound,
            Self::Unreachable,
            Self::RateLimited,
            Self::Failed,
            Self::ParseFailed,
        ]
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
