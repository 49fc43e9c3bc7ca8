//! Session record store implementation

use crate::error::Result;
use crate::models::{Session, SessionId};
use libsql::{params, Connection, Row};

/// Trait for session record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SessionRepository {
    /// Insert or overwrite a session keyed by its id. Idempotent.
    async fn put(&self, session: &Session) -> Result<()>;

    /// Get a session by ID
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// List sessions in insertion order
    async fn list(&self) -> Result<Vec<Session>>;

    /// List sessions scheduled at or after the given time, soonest first
    async fn list_upcoming(&self, after: i64) -> Result<Vec<Session>>;

    /// Remove a session; idempotent if already absent
    async fn delete(&self, id: &SessionId) -> Result<()>;
}

/// libSQL implementation of `SessionRepository`
pub struct LibSqlSessionRepository<'a> {
    conn: &'a Connection,
}

const SESSION_COLUMNS: &str =
    "id, title, scheduled_for, game_ids, notes, created_at, updated_at, pending";

impl<'a> LibSqlSessionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a session from a database row
    fn parse_session(row: &Row) -> Result<Session> {
        let id: String = row.get(0)?;
        let game_ids: String = row.get(3)?;
        Ok(Session {
            id: id
                .parse()
                .map_err(|_| crate::Error::InvalidInput(format!("invalid session id: {id}")))?,
            title: row.get(1)?,
            scheduled_for: row.get(2)?,
            game_ids: serde_json::from_str(&game_ids)?,
            notes: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            pending: row.get::<i32>(7)? != 0,
        })
    }

    async fn collect(&self, sql: &str) -> Result<Vec<Session>> {
        let mut rows = self.conn.query(sql, ()).await?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(Self::parse_session(&row)?);
        }
        Ok(sessions)
    }
}

impl SessionRepository for LibSqlSessionRepository<'_> {
    async fn put(&self, session: &Session) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sessions
                 (id, title, scheduled_for, game_ids, notes, created_at, updated_at, pending)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    session.id.as_str(),
                    session.title.clone(),
                    session.scheduled_for,
                    serde_json::to_string(&session.game_ids)?,
                    session.notes.clone(),
                    session.created_at,
                    session.updated_at,
                    i32::from(session.pending)
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Session>> {
        self.collect(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at ASC, id ASC"
        ))
        .await
    }

    async fn list_upcoming(&self, after: i64) -> Result<Vec<Session>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE scheduled_for >= ? ORDER BY scheduled_for ASC"
                ),
                [after],
            )
            .await?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(Self::parse_session(&row)?);
        }
        Ok(sessions)
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE id = ?", [id.as_str()])
            .await?;
        Ok(())
    }
}
