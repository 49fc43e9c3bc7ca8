//! Shared offline store facade used across clients.
//!
//! All record, queue, and metadata access flows through this service; the
//! inner mutex is the serialized operation queue, so UI writes and the sync
//! engine never interleave mid-operation. Optimistic write methods
//! (`create_*`, `update_*`, `delete_*`) apply the mutation locally and append
//! it to the sync queue under one lock acquisition; the mutation is only
//! reported saved once both are on disk.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, GameRepository, LibSqlGameRepository, LibSqlMetadataRepository,
    LibSqlSessionRepository, LibSqlSyncQueueRepository, MetadataRepository, SessionRepository,
    SyncQueueRepository,
};
use crate::models::{
    wire_payload, Collection, Game, GameId, MutationKind, QueuedMutation, Session, SessionId,
};
use crate::{Error, Result};

/// Thread-safe service for record store, sync queue, and metadata operations.
#[derive(Clone)]
pub struct StoreService {
    db: Arc<Mutex<Database>>,
}

impl StoreService {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    // ===== Games: optimistic writes =====

    /// Create a game locally and queue the create for the remote service.
    pub async fn create_game(&self, mut game: Game) -> Result<Game> {
        if game.is_unnamed() {
            return Err(Error::InvalidInput("game name cannot be empty".into()));
        }
        game.pending = true;

        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection()).put(&game).await?;
        LibSqlSyncQueueRepository::new(db.connection())
            .enqueue(
                MutationKind::Create,
                Collection::Games,
                &game.id.as_str(),
                &wire_payload(&game)?,
            )
            .await?;
        Ok(game)
    }

    /// Update a game locally and queue the update for the remote service.
    pub async fn update_game(&self, mut game: Game) -> Result<Game> {
        game.updated_at = chrono::Utc::now().timestamp_millis();
        game.pending = true;

        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection()).put(&game).await?;
        LibSqlSyncQueueRepository::new(db.connection())
            .enqueue(
                MutationKind::Update,
                Collection::Games,
                &game.id.as_str(),
                &wire_payload(&game)?,
            )
            .await?;
        Ok(game)
    }

    /// Delete a game locally and queue the delete for the remote service.
    pub async fn delete_game(&self, id: &GameId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection()).delete(id).await?;
        LibSqlSyncQueueRepository::new(db.connection())
            .enqueue(
                MutationKind::Delete,
                Collection::Games,
                &id.as_str(),
                &serde_json::Value::Null,
            )
            .await?;
        Ok(())
    }

    // ===== Games: reads =====

    /// Fetch a game by id.
    pub async fn get_game(&self, id: &GameId) -> Result<Option<Game>> {
        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection()).get(id).await
    }

    /// List games in insertion order.
    pub async fn list_games(&self) -> Result<Vec<Game>> {
        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection()).list().await
    }

    /// List games by topic.
    pub async fn list_games_by_topic(&self, topic: &str) -> Result<Vec<Game>> {
        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection())
            .list_by_topic(topic)
            .await
    }

    /// List favorite games.
    pub async fn list_favorite_games(&self) -> Result<Vec<Game>> {
        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection())
            .list_favorites()
            .await
    }

    // ===== Sessions: optimistic writes =====

    /// Create a session locally and queue the create for the remote service.
    pub async fn create_session(&self, mut session: Session) -> Result<Session> {
        if session.title.trim().is_empty() {
            return Err(Error::InvalidInput("session title cannot be empty".into()));
        }
        session.pending = true;

        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .put(&session)
            .await?;
        LibSqlSyncQueueRepository::new(db.connection())
            .enqueue(
                MutationKind::Create,
                Collection::Sessions,
                &session.id.as_str(),
                &wire_payload(&session)?,
            )
            .await?;
        Ok(session)
    }

    /// Update a session locally and queue the update for the remote service.
    pub async fn update_session(&self, mut session: Session) -> Result<Session> {
        session.updated_at = chrono::Utc::now().timestamp_millis();
        session.pending = true;

        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .put(&session)
            .await?;
        LibSqlSyncQueueRepository::new(db.connection())
            .enqueue(
                MutationKind::Update,
                Collection::Sessions,
                &session.id.as_str(),
                &wire_payload(&session)?,
            )
            .await?;
        Ok(session)
    }

    /// Delete a session locally and queue the delete for the remote service.
    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .delete(id)
            .await?;
        LibSqlSyncQueueRepository::new(db.connection())
            .enqueue(
                MutationKind::Delete,
                Collection::Sessions,
                &id.as_str(),
                &serde_json::Value::Null,
            )
            .await?;
        Ok(())
    }

    // ===== Sessions: reads =====

    /// Fetch a session by id.
    pub async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection()).get(id).await
    }

    /// List sessions in insertion order.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection()).list().await
    }

    /// List sessions scheduled at or after the given time, soonest first.
    pub async fn list_upcoming_sessions(&self, after: i64) -> Result<Vec<Session>> {
        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .list_upcoming(after)
            .await
    }

    // ===== Engine-side cache access (no queue append) =====

    /// Store an authoritative game record from the remote service.
    pub async fn cache_game(&self, game: &Game) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection()).put(game).await
    }

    /// Drop a cached game without queueing a remote delete.
    pub async fn evict_game(&self, id: &GameId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlGameRepository::new(db.connection()).delete(id).await
    }

    /// Store an authoritative session record from the remote service.
    pub async fn cache_session(&self, session: &Session) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .put(session)
            .await
    }

    /// Drop a cached session without queueing a remote delete.
    pub async fn evict_session(&self, id: &SessionId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .delete(id)
            .await
    }

    // ===== Queue and metadata =====

    /// All pending mutations, oldest first.
    pub async fn pending_mutations(&self) -> Result<Vec<QueuedMutation>> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection()).pending().await
    }

    /// Pending mutations for one collection, oldest first.
    pub async fn pending_mutations_for(
        &self,
        collection: Collection,
    ) -> Result<Vec<QueuedMutation>> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .pending_for(collection)
            .await
    }

    /// Remove a confirmed queue entry.
    pub async fn remove_mutation(&self, seq: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection()).remove(seq).await
    }

    /// Number of pending queue entries.
    pub async fn queue_len(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection()).count().await
    }

    /// Retarget queued entries after the server assigned a new record id.
    pub async fn rekey_queue(
        &self,
        collection: Collection,
        old_key: &str,
        new_key: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .rekey(collection, old_key, new_key)
            .await
    }

    /// Last successful sync timestamp for a collection.
    pub async fn last_sync(&self, collection: Collection) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        LibSqlMetadataRepository::new(db.connection())
            .last_sync(collection)
            .await
    }

    /// Record the last successful sync timestamp for a collection.
    pub async fn set_last_sync(&self, collection: Collection, timestamp: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlMetadataRepository::new(db.connection())
            .set_last_sync(collection, timestamp)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn optimistic_create_puts_and_enqueues() {
        let store = StoreService::open_in_memory().await.unwrap();

        let game = store
            .create_game(Game::new("Leg Drag Entry", "guard passing"))
            .await
            .unwrap();

        // Record landed locally, marked pending
        let cached = store.get_game(&game.id).await.unwrap().unwrap();
        assert!(cached.pending);

        // Queue holds exactly the create, with the wire payload
        let pending = store.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::Create);
        assert_eq!(pending[0].collection, Collection::Games);
        assert_eq!(pending[0].record_key, game.id.as_str());
        assert!(pending[0].payload.get("pending").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_rejects_empty_name_without_queueing() {
        let store = StoreService::open_in_memory().await.unwrap();

        let result = store.create_game(Game::new("  ", "anything")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.queue_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_evicts_and_queues() {
        let store = StoreService::open_in_memory().await.unwrap();

        let game = store
            .create_game(Game::new("Snap Down", "takedowns"))
            .await
            .unwrap();
        store.delete_game(&game.id).await.unwrap();

        assert!(store.get_game(&game.id).await.unwrap().is_none());
        let pending = store.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].kind, MutationKind::Delete);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_game_does_not_enqueue() {
        let store = StoreService::open_in_memory().await.unwrap();

        let game = Game::new("Knee Cut", "guard passing");
        store.cache_game(&game).await.unwrap();

        assert!(store.get_game(&game.id).await.unwrap().is_some());
        assert_eq!(store.queue_len().await.unwrap(), 0);
    }
}
