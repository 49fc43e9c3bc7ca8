//! Class session model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::GameId;

/// A unique identifier for a session, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID using UUID v7
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

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A class session: an ordered plan of games for one training slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    #[serde(rename = "_id")]
    pub id: SessionId,
    /// Session title, e.g. "Monday no-gi fundamentals"
    pub title: String,
    /// Scheduled class time (Unix ms)
    pub scheduled_for: i64,
    /// Games planned for this session, in teaching order
    pub game_ids: Vec<GameId>,
    /// Free-form coach notes
    pub notes: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Local-only: a queued mutation for this record is unconfirmed
    #[serde(default)]
    pub pending: bool,
}

impl Session {
    /// Create a new session with the given title and scheduled time
    #[must_use]
    pub fn new(title: impl Into<String>, scheduled_for: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: SessionId::new(),
            title: title.into(),
            scheduled_for,
            game_ids: Vec::new(),
            notes: String::new(),
            created_at: now,
            updated_at: now,
            pending: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_session_new() {
        let session = Session::new("Monday fundamentals", 1_700_000_000_000);
        assert_eq!(session.title, "Monday fundamentals");
        assert_eq!(session.scheduled_for, 1_700_000_000_000);
        assert!(session.game_ids.is_empty());
        assert!(!session.pending);
    }

    #[test]
    fn test_session_wire_roundtrip() {
        let mut session = Session::new("Open mat prep", 1_700_000_000_000);
        session.game_ids.push(GameId::new());
        session.game_ids.push(GameId::new());

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["_id"], serde_json::json!(session.id.as_str()));

        let parsed: Session = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.game_ids, session.game_ids);
    }
}
