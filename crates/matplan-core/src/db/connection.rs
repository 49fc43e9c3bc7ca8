//! Database connection management

use crate::error::{Error, Result};
use libsql::{Builder, Connection};
use std::path::Path;

use super::migrations;

/// Database wrapper for libSQL connections
///
/// Opening the database runs migrations; failures to open or migrate are
/// surfaced as [`Error::StorageUnavailable`] so callers can degrade to
/// online-only operation instead of silently dropping data.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str)
            .build()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("cannot open {path_str}: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        let database = Self { conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        let database = Self { conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        // WAL keeps readers unblocked while the sync engine writes
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("migration failed: {e}")))
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
