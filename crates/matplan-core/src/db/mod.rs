//! Database layer for matplan

mod connection;
mod game_repository;
mod metadata_repository;
mod migrations;
mod queue_repository;
mod session_repository;

pub use connection::Database;
pub use game_repository::{GameRepository, LibSqlGameRepository};
pub use metadata_repository::{LibSqlMetadataRepository, MetadataRepository};
pub use queue_repository::{LibSqlSyncQueueRepository, SyncQueueRepository};
pub use session_repository::{LibSqlSessionRepository, SessionRepository};
