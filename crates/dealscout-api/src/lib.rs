// eBay ingestion client: auth, rate control, quota sync, paged crawling
pub mod auth;
pub mod browse;
pub mod crawl;
pub mod error;
pub mod quota;
pub mod rate;

// Re-export common types
pub use auth::{CredentialCache, TokenExchanger};
pub use browse::{BrowseClient, SearchApi};
pub use crawl::Crawler;
pub use error::ApiError;
pub use quota::RateLimitsClient;
pub use rate::RateGovernor;

pub type Result<T> = std::result::Result<T, ApiError>;
