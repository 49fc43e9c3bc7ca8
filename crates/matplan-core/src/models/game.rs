//! Training game model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a game, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(Uuid);

impl GameId {
    /// Create a new unique game ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GameId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A training game (drill) in the catalog
///
/// On the wire the id travels under the `_id` key, matching the remote data
/// service. `pending` is local-only bookkeeping: true while a mutation for
/// this record sits unconfirmed in the sync queue. It is stripped from
/// outgoing payloads and defaults to false when parsing server responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    /// Unique identifier
    #[serde(rename = "_id")]
    pub id: GameId,
    /// Game name, e.g. "Leg Drag Entry"
    pub name: String,
    /// Topic the game trains, e.g. "guard passing"
    pub topic: String,
    /// Playable from the top position
    pub top: bool,
    /// Playable from the bottom position
    pub bottom: bool,
    /// Marked as a favorite
    pub favorite: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Local-only: a queued mutation for this record is unconfirmed
    #[serde(default)]
    pub pending: bool,
}

impl Game {
    /// Create a new game with the given name and topic
    #[must_use]
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: GameId::new(),
            name: name.into(),
            topic: topic.into(),
            top: false,
            bottom: false,
            favorite: false,
            created_at: now,
            updated_at: now,
            pending: false,
        }
    }

    /// Check if the game name is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_unnamed(&self) -> bool {
        self.name.trim().is_empty()
    }
}
