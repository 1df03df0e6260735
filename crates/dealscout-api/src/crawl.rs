use std::sync::Arc;

use tracing::{debug, warn};

use dealscout_core::models::{CrawlReport, SearchQuery, StopReason};
use dealscout_core::store::ListingStore;

use crate::{browse::SearchApi, Result};

/// Brand-new queries get a smaller page budget so the very first poll
/// doesn't burn the quota on back-catalog
const FIRST_RUN_MAX_PAGES: u32 = 5;

/// Walks search pages for one saved query and collects the listings we
/// have not seen before
///
/// Stops at the first already-known listing: pages are assumed sorted by
/// recency, so everything at and after a known item was processed on an
/// earlier poll. That assumption holds only while the upstream sort order
/// stays stable across polls; if it ever ties differently per call we may
/// stop early or let a listing slip through.
pub struct Crawler {
    api: Arc<dyn SearchApi>,
    store: Arc<dyn ListingStore>,
    page_size: u32,
    max_pages: u32,
}

impl Crawler {
    pub fn new(
        api: Arc<dyn SearchApi>,
        store: Arc<dyn ListingStore>,
        page_size: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            api,
            store,
            page_size,
            max_pages,
        }
    }

    /// Crawl one query. A search-client error aborts the whole crawl;
    /// the only soft failure is the existence check, which is logged and
    /// treated as "never seen it".
    pub async fn crawl(&self, query: &SearchQuery, first_run: bool) -> Result<CrawlReport> {
        let effective_max = if first_run {
            self.max_pages.min(FIRST_RUN_MAX_PAGES)
        } else {
            self.max_pages
        };

        let mut new_items = Vec::new();
        let mut total_seen = 0usize;
        let mut pages_used = 0u32;
        let mut stop_reason = StopReason::MaxPages;

        for page in 0..effective_max {
            let paged = query.with_offset(page * self.page_size);
            let result = self.api.search(&paged).await?;
            pages_used += 1;

            if result.items.is_empty() {
                stop_reason = StopReason::NoMoreResults;
                break;
            }

            let mut found_known = false;
            for listing in result.items {
                total_seen += 1;

                let known = match self.store.get_by_external_id(&listing.item_id).await {
                    Ok(existing) => existing.is_some(),
                    Err(e) => {
                        // A persistence hiccup must never halt ingestion;
                        // worst case we hand a duplicate downstream
                        warn!(
                            "Existence check failed for {}, treating as new: {}",
                            listing.item_id, e
                        );
                        false
                    }
                };

                if known {
                    debug!(
                        "Hit known listing {} on page {}, stopping crawl",
                        listing.item_id, page
                    );
                    found_known = true;
                    break;
                }

                new_items.push(listing);
            }

            if found_known {
                stop_reason = StopReason::KnownItem;
                break;
            }
            if !result.has_more {
                stop_reason = StopReason::NoMoreResults;
                break;
            }
        }

        debug!(
            "Crawl for {:?} finished: {} new, {} seen, {} pages, stopped on {}",
            query.text,
            new_items.len(),
            total_seen,
            pages_used,
            stop_reason
        );

        Ok(CrawlReport {
            new_items,
            total_seen,
            pages_used,
            stop_reason,
        })
    }
}
