//! Sync layer: remote data service client, drain engine, and trigger source.

mod engine;
mod remote;
mod scheduler;

pub use engine::{
    DrainOutcome, EngineState, SyncEngine, SyncFailureKind, SyncIssue, SyncReport,
};
pub use remote::{HttpDataService, RemoteDataService, RemoteError, RemoteResult};
pub use scheduler::{RetryPolicy, SyncScheduler, SyncTrigger};
