use crate::{models::Listing, Result};

/// Existence-check collaborator the crawler consults once per candidate item
///
/// The crawler only ever asks "have I seen this external id before?" and
/// records what it collected. Whatever relational schema sits behind this
/// is somebody else's problem - that's the whole point of the trait.
#[async_trait::async_trait]
pub trait ListingStore: Send + Sync {
    /// Look up a listing by its upstream-assigned external id.
    /// `Ok(None)` means "never seen it".
    async fn get_by_external_id(&self, item_id: &str) -> Result<Option<Listing>>;

    /// Record a newly collected listing so the next poll dedupes against it.
    async fn insert(&self, listing: &Listing) -> Result<()>;
}
