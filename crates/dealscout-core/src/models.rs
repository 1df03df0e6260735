use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized marketplace listing - the star of the show
///
/// Identified by the upstream-assigned `item_id`; everything else is
/// best-effort metadata pulled from whatever the marketplace gives us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Upstream-assigned external id (unique per marketplace)
    pub item_id: String,
    pub title: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub condition: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub seller: Option<String>,
    /// When the listing was created upstream, if the API told us
    pub listed_at: Option<DateTime<Utc>>,
}

/// A saved search as sent to the marketplace API
///
/// Immutable per call; the crawler advances `offset` across pages by
/// cloning and rewriting it, never by mutating the caller's copy.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub category_id: Option<String>,
    /// Page size; 0 means "use the API default" (50)
    pub limit: u32,
    pub offset: u32,
    pub sort: Option<String>,
    /// Arbitrary filter key/value pairs passed through verbatim
    pub extra_filters: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_offset(&self, offset: u32) -> Self {
        let mut query = self.clone();
        query.offset = offset;
        query
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            category_id: None,
            limit: 0,
            offset: 0,
            sort: None,
            extra_filters: Vec::new(),
        }
    }
}

/// One page of search results, already normalized
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<Listing>,
    /// Nominal total reported by the API (often an estimate)
    pub total: u64,
    /// Derived from the presence of a next-page link, NOT from offset math.
    /// The API sometimes stops handing out next-links before `total` runs out.
    pub has_more: bool,
}

/// Why a crawl stopped walking pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Hit a listing we have already seen; everything after it is assumed old
    KnownItem,
    /// Ran out of page budget
    MaxPages,
    /// The API said there was nothing left
    NoMoreResults,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::KnownItem => write!(f, "known item"),
            StopReason::MaxPages => write!(f, "max pages"),
            StopReason::NoMoreResults => write!(f, "no more results"),
        }
    }
}

/// Outcome of one crawl over one saved query
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub new_items: Vec<Listing>,
    /// Every listing the crawl looked at, new or not
    pub total_seen: usize,
    pub pages_used: u32,
    pub stop_reason: StopReason,
}

/// Authoritative usage snapshot for one named API resource
///
/// Produced by the quota endpoint, consumed once by `RateGovernor::sync`.
#[derive(Debug, Clone)]
pub struct QuotaState {
    pub resource: String,
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    pub time_window_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_offset_leaves_original_untouched() {
        let query = SearchQuery::new("mechanical keyboard");
        let paged = query.with_offset(100);

        assert_eq!(query.offset, 0);
        assert_eq!(paged.offset, 100);
        assert_eq!(paged.text, "mechanical keyboard");
    }

    #[test]
    fn stop_reason_displays_human_readable() {
        assert_eq!(StopReason::KnownItem.to_string(), "known item");
        assert_eq!(StopReason::MaxPages.to_string(), "max pages");
        assert_eq!(StopReason::NoMoreResults.to_string(), "no more results");
    }
}
