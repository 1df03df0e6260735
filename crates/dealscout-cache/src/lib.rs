// SQLite-backed record of every listing we have ever collected
pub mod store;

pub use store::SeenListingStore;
