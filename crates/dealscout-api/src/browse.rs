use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use dealscout_core::models::{Listing, SearchPage, SearchQuery};

use crate::{ApiError, CredentialCache, RateGovernor, Result};

/// API default page size, applied when the query leaves `limit` at zero
const DEFAULT_LIMIT: u32 = 50;

/// Upstream error bodies get truncated to this many chars before they end
/// up in an error message
const MAX_BODY_SNIPPET: usize = 2048;

/// Seam for the crawler: anything that can run one paged search call
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}

/// Browse API search client
///
/// Every call goes through the rate governor first (when one is wired in),
/// then attaches a cached bearer token and the marketplace header. The
/// upstream signals "more pages" via a next-link, which it sometimes stops
/// handing out well before `total` is exhausted - so we trust the link,
/// never offset arithmetic.
pub struct BrowseClient {
    client: reqwest::Client,
    credentials: Arc<CredentialCache>,
    governor: Option<Arc<RateGovernor>>,
    base_url: String,
    marketplace: String,
    calls_made: AtomicU64,
}

impl BrowseClient {
    pub fn new(
        credentials: Arc<CredentialCache>,
        base_url: impl Into<String>,
        marketplace: impl Into<String>,
    ) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("DealScout/0.1.0"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            credentials,
            governor: None,
            base_url: base_url.into(),
            marketplace: marketplace.into(),
            calls_made: AtomicU64::new(0),
        }
    }

    /// Wire in the shared governor; without one the client runs unthrottled
    /// (handy for sandbox keys)
    pub fn with_governor(mut self, governor: Arc<RateGovernor>) -> Self {
        self.governor = Some(governor);
        self
    }

    /// How many upstream calls this client has actually made
    pub fn calls_made(&self) -> u64 {
        self.calls_made.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl SearchApi for BrowseClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        // Admission first; a spent daily quota or a cancelled wait must
        // never turn into an HTTP call
        if let Some(governor) = &self.governor {
            governor.wait().await?;
        }
        self.calls_made.fetch_add(1, Ordering::Relaxed);

        let token = self.credentials.token().await?;
        let url = format!("{}/item_summary/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .header("X-EBAY-C-MARKETPLACE-ID", &self.marketplace)
            .query(&build_params(query))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = response.text().await?;
        parse_page(&body)
    }
}

/// Query parameters for one search call, defaults applied
fn build_params(query: &SearchQuery) -> Vec<(String, String)> {
    let mut params = vec![("q".to_string(), query.text.clone())];

    if let Some(category) = &query.category_id {
        params.push(("category_ids".to_string(), category.clone()));
    }

    let limit = if query.limit == 0 {
        DEFAULT_LIMIT
    } else {
        query.limit
    };
    params.push(("limit".to_string(), limit.to_string()));

    if query.offset > 0 {
        params.push(("offset".to_string(), query.offset.to_string()));
    }

    if let Some(sort) = &query.sort {
        params.push(("sort".to_string(), sort.clone()));
    }

    for (key, value) in &query.extra_filters {
        params.push((key.clone(), value.clone()));
    }

    params
}

/// Decode a search body into the normalized page shape.
/// The upstream occasionally serves HTML error pages with a 200, which is
/// why a decode failure gets its own error kind instead of blending into
/// network errors.
fn parse_page(body: &str) -> Result<SearchPage> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::Parse(format!("search response: {}", e)))?;

    let items = response
        .item_summaries
        .into_iter()
        .map(ItemSummary::into_listing)
        .collect();

    Ok(SearchPage {
        items,
        total: response.total,
        has_more: response.next.is_some(),
    })
}

pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_BODY_SNIPPET).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    /// Link to the next page; absence means the API is done with us
    next: Option<String>,
    #[serde(default)]
    item_summaries: Vec<ItemSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary {
    item_id: String,
    #[serde(default)]
    title: String,
    price: Option<PriceField>,
    condition: Option<String>,
    item_web_url: Option<String>,
    image: Option<ImageField>,
    seller: Option<SellerField>,
    item_creation_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PriceField {
    /// The API ships money as strings; tolerate garbage by dropping it
    #[serde(default)]
    value: String,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageField {
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SellerField {
    username: Option<String>,
}

impl ItemSummary {
    fn into_listing(self) -> Listing {
        let (price, currency) = match self.price {
            Some(p) => (p.value.parse::<f64>().ok(), p.currency),
            None => (None, None),
        };

        Listing {
            item_id: self.item_id,
            title: self.title,
            price,
            currency,
            condition: self.condition,
            url: self.item_web_url,
            image_url: self.image.and_then(|i| i.image_url),
            seller: self.seller.and_then(|s| s.username),
            listed_at: self.item_creation_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_applied_and_zero_offset_is_omitted() {
        let query = SearchQuery::new("gpu");
        let params = build_params(&query);

        assert!(params.contains(&("q".to_string(), "gpu".to_string())));
        assert!(params.contains(&("limit".to_string(), "50".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "offset"));
        assert!(!params.iter().any(|(k, _)| k == "category_ids"));
    }

    #[test]
    fn explicit_fields_and_extra_filters_pass_through_verbatim() {
        let mut query = SearchQuery::new("gpu");
        query.category_id = Some("27386".into());
        query.limit = 25;
        query.offset = 50;
        query.sort = Some("newlyListed".into());
        query
            .extra_filters
            .push(("filter".into(), "price:[100..500]".into()));

        let params = build_params(&query);
        assert!(params.contains(&("category_ids".to_string(), "27386".to_string())));
        assert!(params.contains(&("limit".to_string(), "25".to_string())));
        assert!(params.contains(&("offset".to_string(), "50".to_string())));
        assert!(params.contains(&("sort".to_string(), "newlyListed".to_string())));
        assert!(params.contains(&("filter".to_string(), "price:[100..500]".to_string())));
    }

    #[test]
    fn next_link_presence_drives_has_more() {
        let with_next = r#"{
            "total": 1500,
            "next": "https://api.ebay.com/buy/browse/v1/item_summary/search?q=gpu&offset=50",
            "itemSummaries": [
                {"itemId": "v1|111|0", "title": "Used GPU",
                 "price": {"value": "199.99", "currency": "USD"},
                 "condition": "Used",
                 "itemWebUrl": "https://www.ebay.com/itm/111",
                 "seller": {"username": "gpu_dealer"}}
            ]
        }"#;

        let page = parse_page(with_next).expect("page parses");
        assert!(page.has_more);
        assert_eq!(page.total, 1500);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].item_id, "v1|111|0");
        assert_eq!(page.items[0].price, Some(199.99));
        assert_eq!(page.items[0].seller.as_deref(), Some("gpu_dealer"));

        // Same page without the next link: total says more, the link says no.
        // The link wins.
        let without_next = r#"{"total": 1500, "itemSummaries": []}"#;
        let page = parse_page(without_next).expect("page parses");
        assert!(!page.has_more);
        assert!(page.items.is_empty());
    }

    #[test]
    fn html_masquerading_as_success_is_a_parse_error() {
        let err = parse_page("<html><body>Service Unavailable</body></html>")
            .expect_err("html must not parse");
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn unparseable_price_becomes_none_instead_of_failing_the_page() {
        let body = r#"{
            "total": 1,
            "itemSummaries": [
                {"itemId": "v1|222|0", "title": "Mystery box",
                 "price": {"value": "call for price", "currency": "USD"}}
            ]
        }"#;

        let page = parse_page(body).expect("page still parses");
        assert_eq!(page.items[0].price, None);
        assert_eq!(page.items[0].currency.as_deref(), Some("USD"));
    }

    #[test]
    fn oversized_error_bodies_are_truncated() {
        let big = "x".repeat(10_000);
        assert_eq!(truncate_body(&big).len(), 2048);
    }
}
