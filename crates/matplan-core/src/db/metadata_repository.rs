//! Metadata store implementation

use crate::error::Result;
use crate::models::Collection;
use libsql::Connection;

/// Trait for sync bookkeeping storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MetadataRepository {
    /// Get a metadata value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a metadata value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Last successful sync timestamp for a collection (Unix ms)
    async fn last_sync(&self, collection: Collection) -> Result<Option<i64>>;

    /// Record the last successful sync timestamp for a collection
    async fn set_last_sync(&self, collection: Collection, timestamp: i64) -> Result<()>;
}

/// libSQL implementation of `MetadataRepository`
pub struct LibSqlMetadataRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMetadataRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn last_sync_key(collection: Collection) -> String {
        format!("lastSync:{collection}")
    }
}

impl MetadataRepository for LibSqlMetadataRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM metadata WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn last_sync(&self, collection: Collection) -> Result<Option<i64>> {
        let value = self.get(&Self::last_sync_key(collection)).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    async fn set_last_sync(&self, collection: Collection, timestamp: i64) -> Result<()> {
        self.set(&Self::last_sync_key(collection), &timestamp.to_string())
            .await
    }
}
