//! matplan-core - Core library for matplan
//!
//! This crate contains the shared models, the offline record store, the sync
//! queue, and the sync engine used by all matplan clients. Reads and writes
//! land in the local store first; mutations are queued and replayed against
//! the remote data service when connectivity allows.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Collection, Game, GameId, MutationKind, QueuedMutation, Session, SessionId};
