use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use dealscout_core::models::Listing;
use dealscout_core::store::ListingStore;
use dealscout_core::{Error, Result};

/// Seen-listings store backed by SQLite
///
/// SQLite was chosen because:
/// - Zero-config embedded database
/// - Battle-tested and reliable
/// - Doesn't require a separate process
///
/// Queries here are tiny point lookups, so holding a synchronous
/// connection behind a mutex inside async trait methods is fine.
pub struct SeenListingStore {
    conn: Mutex<Connection>,
}

impl SeenListingStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| Error::StoreError(format!("Failed to open database: {}", e)))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway store for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StoreError(format!("Failed to open in-memory db: {}", e)))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS listings (
                item_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                first_seen_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::StoreError(format!("Failed to init schema: {}", e)))?;

        Ok(())
    }

    /// How many listings we have ever recorded
    pub fn len(&self) -> Result<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::StoreError("connection lock poisoned".into()))?;

        conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))
            .map_err(|e| Error::StoreError(format!("Count failed: {}", e)))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait::async_trait]
impl ListingStore for SeenListingStore {
    async fn get_by_external_id(&self, item_id: &str) -> Result<Option<Listing>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::StoreError("connection lock poisoned".into()))?;

        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM listings WHERE item_id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::StoreError(format!("Lookup failed: {}", e)))?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, listing: &Listing) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::StoreError("connection lock poisoned".into()))?;

        let data = serde_json::to_string(listing)?;
        // INSERT OR IGNORE: racing crawls may collect the same listing,
        // first write wins and keeps first_seen_at honest
        conn.execute(
            "INSERT OR IGNORE INTO listings (item_id, data, first_seen_at) VALUES (?1, ?2, ?3)",
            params![listing.item_id, data, Utc::now().timestamp()],
        )
        .map_err(|e| Error::StoreError(format!("Insert failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str) -> Listing {
        Listing {
            item_id: id.to_string(),
            title: format!("Listing {}", id),
            price: Some(42.0),
            currency: Some("USD".into()),
            condition: Some("Used".into()),
            url: None,
            image_url: None,
            seller: Some("some_seller".into()),
            listed_at: None,
        }
    }

    #[tokio::test]
    async fn roundtrips_a_listing_by_external_id() {
        let store = SeenListingStore::in_memory().expect("in-memory store");

        assert!(store
            .get_by_external_id("v1|123|0")
            .await
            .expect("lookup works")
            .is_none());

        store.insert(&listing("v1|123|0")).await.expect("insert works");

        let found = store
            .get_by_external_id("v1|123|0")
            .await
            .expect("lookup works")
            .expect("listing is there");
        assert_eq!(found.title, "Listing v1|123|0");
        assert_eq!(found.price, Some(42.0));
    }

    #[tokio::test]
    async fn duplicate_inserts_are_ignored() {
        let store = SeenListingStore::in_memory().expect("in-memory store");

        store.insert(&listing("a")).await.expect("first insert");
        store.insert(&listing("a")).await.expect("second insert is a no-op");

        assert_eq!(store.len().expect("count"), 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seen.db");
        let path_str = path.to_str().expect("utf8 path");

        {
            let store = SeenListingStore::new(path_str).expect("open store");
            store.insert(&listing("kept")).await.expect("insert");
        }

        let reopened = SeenListingStore::new(path_str).expect("reopen store");
        assert!(reopened
            .get_by_external_id("kept")
            .await
            .expect("lookup")
            .is_some());
    }
}
