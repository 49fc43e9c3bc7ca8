//! Sync engine: drains the sync queue against the remote data service.
//!
//! One drain pass replays pending mutations oldest-first. Remote state is
//! authoritative: successful responses are adopted into the local record
//! store, permanent rejections drop the queue entry and reconcile the cache,
//! transient failures end the pass and leave the remainder queued for the
//! next trigger. At most one drain runs at a time; triggers arriving during
//! a pass are coalesced into at most one follow-up pass.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{Collection, Game, MutationKind, QueuedMutation, Session};
use crate::services::StoreService;
use crate::sync::remote::{RemoteDataService, RemoteError};
use crate::{Error, Result};

/// Engine state visible to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Draining,
}

/// How a drain pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every pending entry was applied or dropped
    Complete,
    /// A transient failure stopped the pass; the remainder stays queued
    Interrupted,
}

/// Classification of a dropped queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFailureKind {
    /// The remote rejected the operation as submitted
    Permanent,
    /// Remote state diverged (e.g. the record was deleted by another client)
    Conflict,
}

impl std::fmt::Display for SyncFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permanent => f.write_str("permanent"),
            Self::Conflict => f.write_str("conflict"),
        }
    }
}

/// A queue entry dropped during a drain pass, surfaced for the UI
#[derive(Debug, Clone)]
pub struct SyncIssue {
    pub seq: i64,
    pub collection: Collection,
    pub record_key: String,
    pub kind: SyncFailureKind,
    pub message: String,
}

/// Summary of one drain pass
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: DrainOutcome,
    /// Entries confirmed by the remote service and removed from the queue
    pub applied: usize,
    /// Entries dropped with a surfaced error
    pub dropped: Vec<SyncIssue>,
    /// Entries still queued after the pass
    pub remaining: usize,
    /// Pass start (Unix ms)
    pub started_at: i64,
    /// Pass end (Unix ms)
    pub finished_at: i64,
}

/// Per-entry result inside a pass
enum EntryOutcome {
    Applied,
    Retry(String),
    Rejected(SyncFailureKind, String),
}

/// Per-entry failure raised by the apply helpers
enum EntryFailure {
    Transient(String),
    Permanent(String),
    Conflict(String),
    Storage(Error),
}

impl From<RemoteError> for EntryFailure {
    fn from(err: RemoteError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

impl From<Error> for EntryFailure {
    fn from(err: Error) -> Self {
        Self::Storage(err)
    }
}

type EntryResult = std::result::Result<(), EntryFailure>;

/// The sync engine. Cheap to share behind an `Arc`.
pub struct SyncEngine<R> {
    store: StoreService,
    remote: R,
    draining: AtomicBool,
    queued_trigger: AtomicBool,
}

impl<R: RemoteDataService> SyncEngine<R> {
    pub fn new(store: StoreService, remote: R) -> Self {
        Self {
            store,
            remote,
            draining: AtomicBool::new(false),
            queued_trigger: AtomicBool::new(false),
        }
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        if self.draining.load(Ordering::SeqCst) {
            EngineState::Draining
        } else {
            EngineState::Idle
        }
    }

    /// Handle a sync trigger.
    ///
    /// Runs a drain pass unless one is already in flight, in which case the
    /// trigger is coalesced (the in-flight drain runs at most one follow-up
    /// pass after it completes) and `Ok(None)` is returned. The returned
    /// report describes the last pass run for this trigger.
    pub async fn trigger(&self) -> Result<Option<SyncReport>> {
        if self.draining.swap(true, Ordering::SeqCst) {
            self.queued_trigger.store(true, Ordering::SeqCst);
            tracing::debug!("drain in progress, trigger coalesced");
            return Ok(None);
        }
        // This trigger absorbs any trigger queued before it
        self.queued_trigger.store(false, Ordering::SeqCst);

        let result = self.run_passes().await;
        self.draining.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn run_passes(&self) -> Result<SyncReport> {
        let mut report = self.drain_once().await?;
        while report.outcome == DrainOutcome::Complete
            && self.queued_trigger.swap(false, Ordering::SeqCst)
        {
            report = self.drain_once().await?;
        }
        Ok(report)
    }

    /// One complete drain pass over the currently pending queue entries.
    async fn drain_once(&self) -> Result<SyncReport> {
        let started_at = chrono::Utc::now().timestamp_millis();
        let entries = self.store.pending_mutations().await?;
        tracing::debug!(pending = entries.len(), "sync drain started");

        let mut applied = 0usize;
        let mut dropped: Vec<SyncIssue> = Vec::new();
        let mut touched: BTreeSet<Collection> = BTreeSet::new();
        let mut outcome = DrainOutcome::Complete;
        // Server-assigned ids observed this pass; later snapshot entries
        // against the old key are retargeted before replay
        let mut rekeys: HashMap<(Collection, String), String> = HashMap::new();

        for mut entry in entries {
            if let Some(new_key) = rekeys.get(&(entry.collection, entry.record_key.clone())) {
                entry.record_key.clone_from(new_key);
                if let Some(map) = entry.payload.as_object_mut() {
                    map.insert("_id".to_string(), serde_json::json!(new_key));
                }
            }

            match self.apply_entry(&entry, &mut rekeys).await? {
                EntryOutcome::Applied => {
                    self.store.remove_mutation(entry.seq).await?;
                    touched.insert(entry.collection);
                    applied += 1;
                }
                EntryOutcome::Retry(reason) => {
                    tracing::debug!(
                        seq = entry.seq,
                        reason = %reason,
                        "transient sync failure, pass interrupted"
                    );
                    outcome = DrainOutcome::Interrupted;
                    break;
                }
                EntryOutcome::Rejected(kind, message) => {
                    // A bad entry must not block the rest of the queue
                    self.store.remove_mutation(entry.seq).await?;
                    touched.insert(entry.collection);
                    tracing::warn!(
                        seq = entry.seq,
                        collection = %entry.collection,
                        record_key = %entry.record_key,
                        kind = %kind,
                        message = %message,
                        "queue entry dropped"
                    );
                    dropped.push(SyncIssue {
                        seq: entry.seq,
                        collection: entry.collection,
                        record_key: entry.record_key.clone(),
                        kind,
                        message,
                    });
                }
            }
        }

        let finished_at = chrono::Utc::now().timestamp_millis();
        for collection in touched {
            self.store.set_last_sync(collection, finished_at).await?;
        }

        let remaining = self.store.queue_len().await?;
        tracing::info!(
            applied,
            dropped = dropped.len(),
            remaining,
            interrupted = outcome == DrainOutcome::Interrupted,
            "sync drain finished"
        );

        Ok(SyncReport {
            outcome,
            applied,
            dropped,
            remaining,
            started_at,
            finished_at,
        })
    }

    async fn apply_entry(
        &self,
        entry: &QueuedMutation,
        rekeys: &mut HashMap<(Collection, String), String>,
    ) -> Result<EntryOutcome> {
        let result = match entry.kind {
            MutationKind::Create => self.apply_create(entry, rekeys).await,
            MutationKind::Update => self.apply_update(entry, rekeys).await,
            MutationKind::Delete => self.apply_delete(entry).await,
        };

        match result {
            Ok(()) => Ok(EntryOutcome::Applied),
            Err(EntryFailure::Transient(reason)) => Ok(EntryOutcome::Retry(reason)),
            Err(EntryFailure::Permanent(message)) => {
                Ok(EntryOutcome::Rejected(SyncFailureKind::Permanent, message))
            }
            Err(EntryFailure::Conflict(message)) => {
                Ok(EntryOutcome::Rejected(SyncFailureKind::Conflict, message))
            }
            Err(EntryFailure::Storage(err)) => Err(err),
        }
    }

    async fn apply_create(
        &self,
        entry: &QueuedMutation,
        rekeys: &mut HashMap<(Collection, String), String>,
    ) -> EntryResult {
        let record = self.remote.create(entry.collection, &entry.payload).await?;
        self.adopt(entry, record, rekeys).await
    }

    async fn apply_update(
        &self,
        entry: &QueuedMutation,
        rekeys: &mut HashMap<(Collection, String), String>,
    ) -> EntryResult {
        match self
            .remote
            .update(entry.collection, &entry.record_key, &entry.payload)
            .await
        {
            Ok(record) => self.adopt(entry, record, rekeys).await,
            Err(RemoteError::NotFound(_)) => {
                // Remote wins: the record is gone, converge by dropping ours
                self.evict(entry).await?;
                Err(EntryFailure::Conflict(format!(
                    "record {} was deleted remotely, local update dropped",
                    entry.record_key
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_delete(&self, entry: &QueuedMutation) -> EntryResult {
        match self
            .remote
            .delete(entry.collection, &entry.record_key)
            .await
        {
            Ok(()) => Ok(()),
            Err(RemoteError::NotFound(_)) => {
                self.evict(entry).await?;
                Err(EntryFailure::Conflict(format!(
                    "record {} was already deleted remotely",
                    entry.record_key
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Adopt an authoritative response into the local record store.
    ///
    /// When the server assigned a different id than the local temporary key,
    /// the cached copy is moved under the new key and remaining queue entries
    /// for the record are retargeted so per-record order survives.
    async fn adopt(
        &self,
        entry: &QueuedMutation,
        record: serde_json::Value,
        rekeys: &mut HashMap<(Collection, String), String>,
    ) -> EntryResult {
        match entry.collection {
            Collection::Games => {
                let game: Game = serde_json::from_value(record).map_err(|e| {
                    EntryFailure::Permanent(format!("invalid games record from server: {e}"))
                })?;
                let new_key = game.id.as_str();
                if new_key != entry.record_key {
                    self.rekey(entry, &new_key, rekeys).await?;
                    if let Ok(old_id) = entry.record_key.parse() {
                        self.store.evict_game(&old_id).await?;
                    }
                }
                self.store.cache_game(&game).await?;
            }
            Collection::Sessions => {
                let session: Session = serde_json::from_value(record).map_err(|e| {
                    EntryFailure::Permanent(format!("invalid sessions record from server: {e}"))
                })?;
                let new_key = session.id.as_str();
                if new_key != entry.record_key {
                    self.rekey(entry, &new_key, rekeys).await?;
                    if let Ok(old_id) = entry.record_key.parse() {
                        self.store.evict_session(&old_id).await?;
                    }
                }
                self.store.cache_session(&session).await?;
            }
        }
        Ok(())
    }

    async fn rekey(
        &self,
        entry: &QueuedMutation,
        new_key: &str,
        rekeys: &mut HashMap<(Collection, String), String>,
    ) -> std::result::Result<(), Error> {
        tracing::debug!(
            collection = %entry.collection,
            old_key = %entry.record_key,
            new_key = %new_key,
            "server assigned new record id"
        );
        self.store
            .rekey_queue(entry.collection, &entry.record_key, new_key)
            .await?;
        rekeys.insert(
            (entry.collection, entry.record_key.clone()),
            new_key.to_string(),
        );
        Ok(())
    }

    /// Drop the local cached copy of the entry's record, if any.
    async fn evict(&self, entry: &QueuedMutation) -> std::result::Result<(), Error> {
        match entry.collection {
            Collection::Games => {
                if let Ok(id) = entry.record_key.parse() {
                    self.store.evict_game(&id).await?;
                }
            }
            Collection::Sessions => {
                if let Ok(id) = entry.record_key.parse() {
                    self.store.evict_session(&id).await?;
                }
            }
        }
        Ok(())
    }

    /// Pull the remote collection and hydrate the local cache.
    ///
    /// Upsert-only: records with queued local mutations are skipped so an
    /// optimistic write is never clobbered by a concurrent pull. Returns the
    /// number of records stored.
    pub async fn refresh(&self, collection: Collection) -> Result<usize> {
        let records = self
            .remote
            .list(collection)
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;

        let locally_dirty: std::collections::HashSet<String> = self
            .store
            .pending_mutations_for(collection)
            .await?
            .into_iter()
            .map(|m| m.record_key)
            .collect();

        let mut stored = 0usize;
        for record in records {
            let key = record
                .get("_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if locally_dirty.contains(&key) {
                continue;
            }
            match collection {
                Collection::Games => match serde_json::from_value::<Game>(record) {
                    Ok(game) => {
                        self.store.cache_game(&game).await?;
                        stored += 1;
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "skipping malformed games record");
                    }
                },
                Collection::Sessions => match serde_json::from_value::<Session>(record) {
                    Ok(session) => {
                        self.store.cache_session(&session).await?;
                        stored += 1;
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "skipping malformed sessions record");
                    }
                },
            }
        }

        self.store
            .set_last_sync(collection, chrono::Utc::now().timestamp_millis())
            .await?;
        tracing::debug!(collection = %collection, stored, "cache refreshed from remote");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{wire_payload, GameId};
    use crate::sync::remote::RemoteResult;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct MockState {
        /// Call log: "op collection key"
        calls: Vec<String>,
        /// 1-based remote call number that fails transiently, once
        fail_transient_at: Option<usize>,
        /// Record keys that answer NotFound on update/delete
        missing: std::collections::HashSet<String>,
        /// Payload _id values the server rejects on create
        reject_creates: std::collections::HashSet<String>,
        /// Local id -> server-assigned id applied on create
        assign_ids: HashMap<String, String>,
        /// Records served by list()
        listing: Vec<serde_json::Value>,
        call_count: usize,
    }

    #[derive(Clone, Default)]
    struct MockRemote {
        state: Arc<Mutex<MockState>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        delay_ms: u64,
    }

    impl MockRemote {
        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        /// Record the call and decide whether it fails transiently.
        fn admit(&self, op: &str, collection: Collection, key: &str) -> RemoteResult<()> {
            let mut state = self.state.lock().unwrap();
            state.call_count += 1;
            state.calls.push(format!("{op} {collection} {key}"));
            if state.fail_transient_at == Some(state.call_count) {
                state.fail_transient_at = None;
                return Err(RemoteError::Unavailable("connection refused".into()));
            }
            Ok(())
        }

        async fn pace(&self) {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RemoteDataService for MockRemote {
        async fn list(&self, collection: Collection) -> RemoteResult<Vec<serde_json::Value>> {
            self.admit("list", collection, "*")?;
            self.pace().await;
            Ok(self.state.lock().unwrap().listing.clone())
        }

        async fn get(&self, collection: Collection, id: &str) -> RemoteResult<serde_json::Value> {
            self.admit("get", collection, id)?;
            self.pace().await;
            Err(RemoteError::NotFound(id.to_string()))
        }

        async fn create(
            &self,
            collection: Collection,
            payload: &serde_json::Value,
        ) -> RemoteResult<serde_json::Value> {
            let local_id = payload["_id"].as_str().unwrap_or_default().to_string();
            self.admit("create", collection, &local_id)?;
            self.pace().await;

            let mut state = self.state.lock().unwrap();
            if state.reject_creates.contains(&local_id) {
                return Err(RemoteError::Rejected("payload rejected".into()));
            }
            let mut record = payload.clone();
            if let Some(server_id) = state.assign_ids.remove(&local_id) {
                record["_id"] = serde_json::json!(server_id);
            }
            Ok(record)
        }

        async fn update(
            &self,
            collection: Collection,
            id: &str,
            payload: &serde_json::Value,
        ) -> RemoteResult<serde_json::Value> {
            self.admit("update", collection, id)?;
            self.pace().await;
            if self.state.lock().unwrap().missing.contains(id) {
                return Err(RemoteError::NotFound(id.to_string()));
            }
            Ok(payload.clone())
        }

        async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()> {
            self.admit("delete", collection, id)?;
            self.pace().await;
            if self.state.lock().unwrap().missing.contains(id) {
                return Err(RemoteError::NotFound(id.to_string()));
            }
            Ok(())
        }
    }

    async fn setup() -> (StoreService, MockRemote) {
        let store = StoreService::open_in_memory().await.unwrap();
        (store, MockRemote::default())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_record_mutations_drain_in_enqueue_order() {
        let (store, remote) = setup().await;

        let mut game = store
            .create_game(crate::Game::new("Leg Drag Entry", "guard passing"))
            .await
            .unwrap();
        game.favorite = true;
        game = store.update_game(game).await.unwrap();
        game.top = true;
        store.update_game(game.clone()).await.unwrap();

        let engine = SyncEngine::new(store.clone(), remote.clone());
        let report = engine.trigger().await.unwrap().unwrap();

        assert_eq!(report.outcome, DrainOutcome::Complete);
        assert_eq!(report.applied, 3);
        assert!(report.dropped.is_empty());

        let key = game.id.as_str();
        assert_eq!(
            remote.calls(),
            vec![
                format!("create games {key}"),
                format!("update games {key}"),
                format!("update games {key}"),
            ]
        );

        // Confirmed record is no longer pending
        let cached = store.get_game(&game.id).await.unwrap().unwrap();
        assert!(!cached.pending);
        assert_eq!(store.queue_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failure_stops_pass_and_resumes_in_order() {
        let (store, remote) = setup().await;

        let mut keys = Vec::new();
        for n in 0..3 {
            let game = store
                .create_game(crate::Game::new(format!("Game {n}"), "topic"))
                .await
                .unwrap();
            keys.push(game.id.as_str());
        }
        remote.state.lock().unwrap().fail_transient_at = Some(2);

        let engine = SyncEngine::new(store.clone(), remote.clone());
        let report = engine.trigger().await.unwrap().unwrap();

        assert_eq!(report.outcome, DrainOutcome::Interrupted);
        assert_eq!(report.applied, 1);
        assert_eq!(report.remaining, 2);

        // Entries before the failure are confirmed, the rest stay queued
        let pending = store.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].record_key, keys[1]);
        assert_eq!(pending[1].record_key, keys[2]);

        // A later trigger completes them in original order
        let report = engine.trigger().await.unwrap().unwrap();
        assert_eq!(report.outcome, DrainOutcome::Complete);
        assert_eq!(report.applied, 2);
        assert_eq!(store.queue_len().await.unwrap(), 0);

        assert_eq!(
            remote.calls(),
            vec![
                format!("create games {}", keys[0]),
                format!("create games {}", keys[1]), // transient failure
                format!("create games {}", keys[1]),
                format!("create games {}", keys[2]),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permanent_failure_drops_only_that_entry() {
        let (store, remote) = setup().await;

        let mut keys = Vec::new();
        for n in 0..3 {
            let game = store
                .create_game(crate::Game::new(format!("Game {n}"), "topic"))
                .await
                .unwrap();
            keys.push(game.id.as_str());
        }
        remote
            .state
            .lock()
            .unwrap()
            .reject_creates
            .insert(keys[1].clone());

        let engine = SyncEngine::new(store.clone(), remote.clone());
        let report = engine.trigger().await.unwrap().unwrap();

        // The bad entry is dropped, the rest of the pass continues
        assert_eq!(report.outcome, DrainOutcome::Complete);
        assert_eq!(report.applied, 2);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].kind, SyncFailureKind::Permanent);
        assert_eq!(report.dropped[0].record_key, keys[1]);
        assert_eq!(store.queue_len().await.unwrap(), 0);
        assert_eq!(remote.calls().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_racing_remote_delete_is_a_conflict() {
        let (store, remote) = setup().await;

        // A confirmed record is updated locally while the remote copy is
        // deleted by another client
        let game = crate::Game::new("Knee Cut", "guard passing");
        store.cache_game(&game).await.unwrap();

        let mut edited = game.clone();
        edited.favorite = true;
        store.update_game(edited).await.unwrap();

        remote
            .state
            .lock()
            .unwrap()
            .missing
            .insert(game.id.as_str());

        let engine = SyncEngine::new(store.clone(), remote.clone());
        let report = engine.trigger().await.unwrap().unwrap();

        assert_eq!(report.outcome, DrainOutcome::Complete);
        assert_eq!(report.applied, 0);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].kind, SyncFailureKind::Conflict);

        // Local cache converged to server truth
        assert!(store.get_game(&game.id).await.unwrap().is_none());
        assert_eq!(store.queue_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_triggers_run_one_drain_at_a_time() {
        let (store, _) = setup().await;
        let remote = MockRemote {
            delay_ms: 50,
            ..MockRemote::default()
        };

        store
            .create_game(crate::Game::new("Arm Drag", "takedowns"))
            .await
            .unwrap();

        let engine = Arc::new(SyncEngine::new(store.clone(), remote.clone()));
        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.trigger().await.unwrap() }
        });
        // Give the first trigger a head start so it owns the drain
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.trigger().await.unwrap() }
        });

        let (first, second) = (first.await.unwrap(), second.await.unwrap());

        // Exactly one trigger ran the drain, the other was coalesced
        assert_eq!(
            usize::from(first.is_some()) + usize::from(second.is_some()),
            1
        );
        assert_eq!(remote.max_active.load(Ordering::SeqCst), 1);
        // One mutation, one remote call: the coalesced follow-up pass found
        // an empty queue
        assert_eq!(remote.calls().len(), 1);
        assert_eq!(store.queue_len().await.unwrap(), 0);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_drain_updates_last_sync() {
        let (store, remote) = setup().await;

        store
            .create_game(crate::Game::new("Snap Down", "takedowns"))
            .await
            .unwrap();
        store
            .create_session(crate::Session::new("Monday gi", 1_700_000_000_000))
            .await
            .unwrap();

        let before = chrono::Utc::now().timestamp_millis();
        let engine = SyncEngine::new(store.clone(), remote);
        let report = engine.trigger().await.unwrap().unwrap();

        assert_eq!(report.outcome, DrainOutcome::Complete);
        assert_eq!(store.queue_len().await.unwrap(), 0);

        for collection in [Collection::Games, Collection::Sessions] {
            let last = store.last_sync(collection).await.unwrap().unwrap();
            assert!(last >= before);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_assigned_id_replaces_temporary_key() {
        let (store, remote) = setup().await;

        // Offline create followed by an update to the same (temporary) key
        let mut game = store
            .create_game(crate::Game::new("Leg Drag Entry", "guard passing"))
            .await
            .unwrap();
        game.favorite = true;
        store.update_game(game.clone()).await.unwrap();

        let temp_key = game.id.as_str();
        let server_id = GameId::new();
        remote
            .state
            .lock()
            .unwrap()
            .assign_ids
            .insert(temp_key.clone(), server_id.as_str());

        let engine = SyncEngine::new(store.clone(), remote.clone());
        let report = engine.trigger().await.unwrap().unwrap();

        assert_eq!(report.outcome, DrainOutcome::Complete);
        assert_eq!(report.applied, 2);

        // The cached copy moved under the server-assigned id
        assert!(store.get_game(&game.id).await.unwrap().is_none());
        let adopted = store.get_game(&server_id).await.unwrap().unwrap();
        assert!(adopted.favorite);
        assert!(!adopted.pending);

        // The queued update was replayed against the server id
        assert_eq!(
            remote.calls(),
            vec![
                format!("create games {temp_key}"),
                format!("update games {server_id}"),
            ]
        );
        assert_eq!(store.queue_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_hydrates_cache_without_clobbering_pending() {
        let (store, remote) = setup().await;

        // One record only exists remotely; another has a queued local edit
        let remote_only = crate::Game::new("Berimbolo", "back takes");
        let mut locally_edited = store
            .create_game(crate::Game::new("Knee Cut", "guard passing"))
            .await
            .unwrap();
        locally_edited.favorite = true;
        locally_edited = store.update_game(locally_edited).await.unwrap();

        let mut stale = locally_edited.clone();
        stale.favorite = false;
        remote.state.lock().unwrap().listing = vec![
            wire_payload(&remote_only).unwrap(),
            wire_payload(&stale).unwrap(),
        ];

        let engine = SyncEngine::new(store.clone(), remote);
        let stored = engine.refresh(Collection::Games).await.unwrap();

        assert_eq!(stored, 1);
        assert!(store.get_game(&remote_only.id).await.unwrap().is_some());

        // The pending local edit survived the pull
        let cached = store.get_game(&locally_edited.id).await.unwrap().unwrap();
        assert!(cached.favorite);
        assert!(cached.pending);
        assert!(store
            .last_sync(Collection::Games)
            .await
            .unwrap()
            .is_some());
    }
}
