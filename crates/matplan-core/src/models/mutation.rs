//! Sync queue entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A collection cached in the local record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Games,
    Sessions,
}

impl Collection {
    /// Collection name as used in queue rows, metadata keys, and remote paths
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Games => "games",
            Self::Sessions => "sessions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "games" => Ok(Self::Games),
            "sessions" => Ok(Self::Sessions),
            other => Err(Error::InvalidInput(format!("unknown collection: {other}"))),
        }
    }
}

/// The kind of a pending mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown mutation kind: {other}"))),
        }
    }
}

/// One pending mutation recorded in the sync queue
///
/// Entries are replayed against the remote service in ascending `seq` order,
/// which preserves causal order of mutations against the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Monotonically increasing sequence id, assigned by the store
    pub seq: i64,
    /// Mutation type
    pub kind: MutationKind,
    /// Target collection
    pub collection: Collection,
    /// Target record key (the local key until the server confirms a create)
    pub record_key: String,
    /// Wire payload: the record for create/update, null for delete
    pub payload: serde_json::Value,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

/// Serialize a record into its wire payload, stripping the local-only
/// `pending` marker.
pub fn wire_payload<T: Serialize>(record: &T) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(record)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("pending");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Game;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collection_roundtrip() {
        assert_eq!("games".parse::<Collection>().unwrap(), Collection::Games);
        assert_eq!(
            "sessions".parse::<Collection>().unwrap(),
            Collection::Sessions
        );
        assert!("classPreps".parse::<Collection>().is_err());
        assert_eq!(Collection::Games.to_string(), "games");
    }

    #[test]
    fn test_mutation_kind_roundtrip() {
        for kind in [
            MutationKind::Create,
            MutationKind::Update,
            MutationKind::Delete,
        ] {
            assert_eq!(kind.as_str().parse::<MutationKind>().unwrap(), kind);
        }
        assert!("upsert".parse::<MutationKind>().is_err());
    }

    #[test]
    fn test_wire_payload_strips_pending() {
        let mut game = Game::new("Arm Drag", "takedowns");
        game.pending = true;

        let payload = wire_payload(&game).unwrap();
        assert!(payload.get("pending").is_none());
        assert_eq!(payload["name"], serde_json::json!("Arm Drag"));
    }
}
