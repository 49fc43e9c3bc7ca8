//! Sync queue implementation
//!
//! The queue is the durability mechanism for offline writes: an optimistic
//! local mutation is only reported saved once its entry is on disk here.

use crate::error::Result;
use crate::models::{Collection, MutationKind, QueuedMutation};
use libsql::{params, Connection, Row};

/// Trait for sync queue operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncQueueRepository {
    /// Append a new entry, assigning it the next sequence id
    async fn enqueue(
        &self,
        kind: MutationKind,
        collection: Collection,
        record_key: &str,
        payload: &serde_json::Value,
    ) -> Result<QueuedMutation>;

    /// All entries not yet confirmed, oldest first
    async fn pending(&self) -> Result<Vec<QueuedMutation>>;

    /// Pending entries for one collection, oldest first (diagnostics)
    async fn pending_for(&self, collection: Collection) -> Result<Vec<QueuedMutation>>;

    /// Delete a confirmed entry. Idempotent.
    async fn remove(&self, seq: i64) -> Result<()>;

    /// Number of pending entries
    async fn count(&self) -> Result<usize>;

    /// Retarget queued entries after the server assigned a new record id
    async fn rekey(&self, collection: Collection, old_key: &str, new_key: &str) -> Result<()>;
}

/// libSQL implementation of `SyncQueueRepository`
pub struct LibSqlSyncQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue entry from a database row
    fn parse_entry(row: &Row) -> Result<QueuedMutation> {
        let kind: String = row.get(1)?;
        let collection: String = row.get(2)?;
        let payload: String = row.get(4)?;
        Ok(QueuedMutation {
            seq: row.get(0)?,
            kind: kind.parse()?,
            collection: collection.parse()?,
            record_key: row.get(3)?,
            payload: serde_json::from_str(&payload)?,
            created_at: row.get(5)?,
        })
    }

    async fn collect(&self, sql: &str, filter: Option<&str>) -> Result<Vec<QueuedMutation>> {
        let mut rows = match filter {
            Some(value) => self.conn.query(sql, [value]).await?,
            None => self.conn.query(sql, ()).await?,
        };

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

const QUEUE_COLUMNS: &str = "seq, kind, collection, record_key, payload, created_at";

impl SyncQueueRepository for LibSqlSyncQueueRepository<'_> {
    async fn enqueue(
        &self,
        kind: MutationKind,
        collection: Collection,
        record_key: &str,
        payload: &serde_json::Value,
    ) -> Result<QueuedMutation> {
        let created_at = chrono::Utc::now().timestamp_millis();
        self.conn
            .execute(
                "INSERT INTO sync_queue (kind, collection, record_key, payload, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    kind.as_str(),
                    collection.as_str(),
                    record_key,
                    serde_json::to_string(payload)?,
                    created_at
                ],
            )
            .await?;

        Ok(QueuedMutation {
            seq: self.conn.last_insert_rowid(),
            kind,
            collection,
            record_key: record_key.to_string(),
            payload: payload.clone(),
            created_at,
        })
    }

    async fn pending(&self) -> Result<Vec<QueuedMutation>> {
        self.collect(
            &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY seq ASC"),
            None,
        )
        .await
    }

    async fn pending_for(&self, collection: Collection) -> Result<Vec<QueuedMutation>> {
        self.collect(
            &format!(
                "SELECT {QUEUE_COLUMNS} FROM sync_queue
                 WHERE collection = ? ORDER BY seq ASC"
            ),
            Some(collection.as_str()),
        )
        .await
    }

    async fn remove(&self, seq: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_queue WHERE seq = ?", [seq])
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM sync_queue", ()).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn rekey(&self, collection: Collection, old_key: &str, new_key: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue SET record_key = ? WHERE collection = ? AND record_key = ?",
                params![new_key, collection.as_str(), old_key],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_assigns_increasing_seq() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let first = repo
            .enqueue(
                MutationKind::Create,
                Collection::Games,
                "g1",
                &serde_json::json!({"name": "Arm Drag"}),
            )
            .await
            .unwrap();
        let second = repo
            .enqueue(
                MutationKind::Update,
                Collection::Games,
                "g1",
                &serde_json::json!({"favorite": true}),
            )
            .await
            .unwrap();

        assert!(second.seq > first.seq);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_fifo_order() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        for n in 0..3 {
            repo.enqueue(
                MutationKind::Update,
                Collection::Games,
                "g1",
                &serde_json::json!({ "step": n }),
            )
            .await
            .unwrap();
        }

        let pending = repo.pending().await.unwrap();
        assert_eq!(pending.len(), 3);
        for (n, entry) in pending.iter().enumerate() {
            assert_eq!(entry.payload["step"], serde_json::json!(n));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_for_filters_collection() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        repo.enqueue(
            MutationKind::Create,
            Collection::Games,
            "g1",
            &serde_json::Value::Null,
        )
        .await
        .unwrap();
        repo.enqueue(
            MutationKind::Create,
            Collection::Sessions,
            "s1",
            &serde_json::Value::Null,
        )
        .await
        .unwrap();

        let games_only = repo.pending_for(Collection::Games).await.unwrap();
        assert_eq!(games_only.len(), 1);
        assert_eq!(games_only[0].record_key, "g1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_idempotent() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let entry = repo
            .enqueue(
                MutationKind::Delete,
                Collection::Games,
                "g1",
                &serde_json::Value::Null,
            )
            .await
            .unwrap();

        repo.remove(entry.seq).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        repo.remove(entry.seq).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rekey_retargets_entries() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        repo.enqueue(
            MutationKind::Update,
            Collection::Games,
            "temp-key",
            &serde_json::Value::Null,
        )
        .await
        .unwrap();
        repo.enqueue(
            MutationKind::Update,
            Collection::Sessions,
            "temp-key",
            &serde_json::Value::Null,
        )
        .await
        .unwrap();

        repo.rekey(Collection::Games, "temp-key", "server-key")
            .await
            .unwrap();

        let games = repo.pending_for(Collection::Games).await.unwrap();
        assert_eq!(games[0].record_key, "server-key");

        // Other collections are untouched
        let sessions = repo.pending_for(Collection::Sessions).await.unwrap();
        assert_eq!(sessions[0].record_key, "temp-key");
    }
}
