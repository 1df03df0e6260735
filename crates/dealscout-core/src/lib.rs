// Shared domain types live here - everything else builds on this crate
pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use config::Config;
pub use error::Error;
pub use models::{CrawlReport, Listing, QuotaState, SearchPage, SearchQuery, StopReason};
pub use store::ListingStore;

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
