//! Game record store implementation

use crate::error::Result;
use crate::models::{Game, GameId};
use libsql::{params, Connection, Row};

/// Trait for game record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait GameRepository {
    /// Insert or overwrite a game keyed by its id. Idempotent.
    async fn put(&self, game: &Game) -> Result<()>;

    /// Get a game by ID
    async fn get(&self, id: &GameId) -> Result<Option<Game>>;

    /// List games in insertion order
    async fn list(&self) -> Result<Vec<Game>>;

    /// List games filtered by topic
    async fn list_by_topic(&self, topic: &str) -> Result<Vec<Game>>;

    /// List favorite games
    async fn list_favorites(&self) -> Result<Vec<Game>>;

    /// Remove a game; idempotent if already absent
    async fn delete(&self, id: &GameId) -> Result<()>;
}

/// libSQL implementation of `GameRepository`
pub struct LibSqlGameRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlGameRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a game from a database row
    fn parse_game(row: &Row) -> Result<Game> {
        let id: String = row.get(0)?;
        Ok(Game {
            id: id
                .parse()
                .map_err(|_| crate::Error::InvalidInput(format!("invalid game id: {id}")))?,
            name: row.get(1)?,
            topic: row.get(2)?,
            top: row.get::<i32>(3)? != 0,
            bottom: row.get::<i32>(4)? != 0,
            favorite: row.get::<i32>(5)? != 0,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            pending: row.get::<i32>(8)? != 0,
        })
    }

    async fn collect(&self, sql: &str, filter: Option<&str>) -> Result<Vec<Game>> {
        let mut rows = match filter {
            Some(value) => self.conn.query(sql, [value]).await?,
            None => self.conn.query(sql, ()).await?,
        };

        let mut games = Vec::new();
        while let Some(row) = rows.next().await? {
            games.push(Self::parse_game(&row)?);
        }
        Ok(games)
    }
}

const GAME_COLUMNS: &str =
    "id, name, topic, top, bottom, favorite, created_at, updated_at, pending";

impl GameRepository for LibSqlGameRepository<'_> {
    async fn put(&self, game: &Game) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO games
                 (id, name, topic, top, bottom, favorite, created_at, updated_at, pending)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    game.id.as_str(),
                    game.name.clone(),
                    game.topic.clone(),
                    i32::from(game.top),
                    i32::from(game.bottom),
                    i32::from(game.favorite),
                    game.created_at,
                    game.updated_at,
                    i32::from(game.pending)
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &GameId) -> Result<Option<Game>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_game(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Game>> {
        self.collect(
            &format!("SELECT {GAME_COLUMNS} FROM games ORDER BY created_at ASC, id ASC"),
            None,
        )
        .await
    }

    async fn list_by_topic(&self, topic: &str) -> Result<Vec<Game>> {
        self.collect(
            &format!(
                "SELECT {GAME_COLUMNS} FROM games WHERE topic = ?
                 ORDER BY created_at ASC, id ASC"
            ),
            Some(topic),
        )
        .await
    }

    async fn list_favorites(&self) -> Result<Vec<Game>> {
        self.collect(
            &format!(
                "SELECT {GAME_COLUMNS} FROM games WHERE favorite = 1
                 ORDER BY created_at ASC, id ASC"
            ),
            None,
        )
        .await
    }

    async fn delete(&self, id: &GameId) -> Result<()> {
        self.conn
            .execute("DELETE FROM games WHERE id = ?", [id.as_str()])
            .await?;
        Ok(())
    }
}
