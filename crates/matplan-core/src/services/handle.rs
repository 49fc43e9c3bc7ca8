//! Process-wide store lifecycle.
//!
//! Long-lived clients share one [`StoreService`] per process. The slot is
//! initialized lazily through [`init`]; the mutex around it guarantees only
//! one initialization attempt runs at a time, and [`get`] before [`init`]
//! surfaces [`crate::Error::StorageUnavailable`] so callers can degrade to
//! online-only operation.

use std::path::PathBuf;
use std::sync::OnceLock;

use tokio::sync::Mutex;

use crate::services::StoreService;
use crate::{Error, Result};

static STORE: OnceLock<Mutex<Option<StoreService>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<StoreService>> {
    STORE.get_or_init(|| Mutex::new(None))
}

/// Initialize the process-wide store, opening the database at `db_path`.
///
/// Returns the existing service if already initialized; concurrent callers
/// serialize on the slot so the database is opened at most once.
pub async fn init(db_path: impl Into<PathBuf>) -> Result<StoreService> {
    let mut guard = slot().lock().await;
    if let Some(existing) = guard.as_ref() {
        return Ok(existing.clone());
    }

    let service = StoreService::open_path(db_path).await?;
    *guard = Some(service.clone());
    tracing::info!("offline store initialized");
    Ok(service)
}

/// Get the process-wide store, failing if [`init`] has not completed.
pub async fn get() -> Result<StoreService> {
    slot()
        .lock()
        .await
        .as_ref()
        .cloned()
        .ok_or_else(|| Error::StorageUnavailable("store not initialized".into()))
}

/// Whether the process-wide store is ready.
pub async fn is_ready() -> bool {
    slot().lock().await.is_some()
}

/// Drop the process-wide store. Clones handed out earlier stay usable until
/// released; new [`get`] calls fail until the next [`init`].
pub async fn shutdown() {
    let mut guard = slot().lock().await;
    if guard.take().is_some() {
        tracing::info!("offline store shut down");
    }
}
