//! Data models for matplan

mod game;
mod mutation;
mod session;

pub use game::{Game, GameId};
pub use mutation::{wire_payload, Collection, MutationKind, QueuedMutation};
pub use session::{Session, SessionId};
