//! Score store - SQLite-backed leaderboard persistence.
//!
//! Every operation opens its own connection and drops it before returning.
//! Writes commit immediately (autocommit).

use crate::error::StoreError;
use chrono::{NaiveDateTime, Timelike, Utc};
use rusqlite::{Connection, OpenFlags, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Upper bound applied to `top_scores` limits.
pub const MAX_TOP_LIMIT: i64 = 100;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scores (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    player_name TEXT    NOT NULL,
    score       INTEGER NOT NULL,
    game_date   TEXT    NOT NULL,
    created_at  TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scores_player_name ON scores (player_name);
";

const SELECT_COLUMNS: &str = "SELECT id, player_name, score, game_date, created_at FROM scores";
const ORDERING: &str = "ORDER BY score DESC, game_date DESC, id DESC";

/// One submitted score. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: i64,
    pub player_name: String,
    pub score: i64,
    #[serde(with = "sql_timestamp")]
    pub game_date: NaiveDateTime,
    #[serde(with = "sql_timestamp")]
    pub created_at: NaiveDateTime,
}

/// `YYYY-MM-DD HH:MM:SS` on the wire and in the table.
pub(crate) mod sql_timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

struct RawRow {
    id: i64,
    player_name: String,
    score: i64,
    game_date: String,
    created_at: String,
}

impl TryFrom<RawRow> for ScoreRecord {
    type Error = StoreError;

    fn try_from(row: RawRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            player_name: row.player_name,
            score: row.score,
            game_date: parse_timestamp("game_date", row.game_date)?,
            created_at: parse_timestamp("created_at", row.created_at)?,
        })
    }
}

fn parse_timestamp(column: &'static str, value: String) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(&value, TIMESTAMP_FORMAT)
        .map_err(|_| StoreError::Timestamp { column, value })
}

/// Handle to the score database. Cheap to clone; holds no open connection.
#[derive(Debug, Clone)]
pub struct ScoreStore {
    path: PathBuf,
}

impl ScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open an existing database. A missing file is a connectivity failure.
    pub(crate) fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Open the database, creating the file if needed.
    pub(crate) fn connect_or_create(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Create the database file and schema if missing.
    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.connect_or_create()?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %self.path.display(), "Schema ready");
        Ok(())
    }

    /// Connectivity check used by the health endpoint.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Insert a score stamped with the current time. Returns the new id.
    pub fn submit_score(&self, player_name: &str, score: i64) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        let now = Utc::now()
            .naive_utc()
            .with_nanosecond(0)
            .unwrap_or_else(|| Utc::now().naive_utc());
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        conn.execute(
            "INSERT INTO scores (player_name, score, game_date, created_at) VALUES (?1, ?2, ?3, ?3)",
            params![player_name, score, stamp],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, player = %player_name, score, "Score stored");
        Ok(id)
    }

    /// Best scores first. Non-positive limits yield nothing; large ones are clamped.
    pub fn top_scores(&self, limit: i64) -> Result<Vec<ScoreRecord>, StoreError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(MAX_TOP_LIMIT);
        self.query(&format!("{SELECT_COLUMNS} {ORDERING} LIMIT ?1"), params![limit])
    }

    /// All scores for an exact player name, best first.
    pub fn scores_for_player(&self, player_name: &str) -> Result<Vec<ScoreRecord>, StoreError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE player_name = ?1 {ORDERING}"),
            params![player_name],
        )
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ScoreRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    player_name: row.get(1)?,
                    score: row.get(2)?,
                    game_date: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ScoreRecord::try_from).collect()
    }

    /// Run blocking store work off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&ScoreStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ScoreStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScoreStore::new(dir.path().join("scores.db"));
        store.init().unwrap();
        (dir, store)
    }

    fn insert_at(store: &ScoreStore, name: &str, score: i64, game_date: &str) -> i64 {
        let conn = store.connect().unwrap();
        conn.execute(
            "INSERT INTO scores (player_name, score, game_date, created_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, score, game_date],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn summary(records: &[ScoreRecord]) -> Vec<(String, i64)> {
        records
            .iter()
            .map(|r| (r.player_name.clone(), r.score))
            .collect()
    }

    #[test]
    fn submit_returns_increasing_ids() {
        let (_dir, store) = store();
        let a = store.submit_score("alice", 10).unwrap();
        let b = store.submit_score("bob", 20).unwrap();
        assert!(b > a);
    }

    #[test]
    fn top_scores_orders_by_score_descending() {
        let (_dir, store) = store();
        store.submit_score("A", 10).unwrap();
        store.submit_score("B", 30).unwrap();
        store.submit_score("C", 20).unwrap();
        let top = store.top_scores(3).unwrap();
        assert_eq!(
            summary(&top),
            vec![("B".into(), 30), ("C".into(), 20), ("A".into(), 10)]
        );
    }

    #[test]
    fn ties_break_on_most_recent_game_date() {
        let (_dir, store) = store();
        insert_at(&store, "old", 50, "2024-01-01 10:00:00");
        insert_at(&store, "new", 50, "2024-06-01 10:00:00");
        let top = store.top_scores(2).unwrap();
        assert_eq!(top[0].player_name, "new");
        assert_eq!(top[1].player_name, "old");
    }

    #[test]
    fn limit_truncates_results() {
        let (_dir, store) = store();
        for i in 0..5 {
            store.submit_score("p", i).unwrap();
        }
        assert_eq!(store.top_scores(2).unwrap().len(), 2);
    }

    #[test]
    fn non_positive_limit_is_empty() {
        let (_dir, store) = store();
        store.submit_score("p", 1).unwrap();
        assert!(store.top_scores(0).unwrap().is_empty());
        assert!(store.top_scores(-5).unwrap().is_empty());
    }

    #[test]
    fn huge_limit_is_clamped() {
        let (_dir, store) = store();
        for i in 0..(MAX_TOP_LIMIT + 5) {
            insert_at(&store, "p", i, "2024-01-01 00:00:00");
        }
        assert_eq!(store.top_scores(i64::MAX).unwrap().len() as i64, MAX_TOP_LIMIT);
    }

    #[test]
    fn player_filter_is_exact() {
        let (_dir, store) = store();
        store.submit_score("ana", 5).unwrap();
        store.submit_score("ana", 15).unwrap();
        store.submit_score("anabel", 99).unwrap();
        let scores = store.scores_for_player("ana").unwrap();
        assert_eq!(summary(&scores), vec![("ana".into(), 15), ("ana".into(), 5)]);
    }

    #[test]
    fn unknown_player_is_empty_not_error() {
        let (_dir, store) = store();
        store.submit_score("ana", 5).unwrap();
        assert!(store.scores_for_player("nobody").unwrap().is_empty());
    }

    #[test]
    fn records_carry_timestamps() {
        let (_dir, store) = store();
        insert_at(&store, "t", 1, "2024-03-04 05:06:07");
        let record = &store.top_scores(1).unwrap()[0];
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["gameDate"], "2024-03-04 05:06:07");
        assert_eq!(json["playerName"], "t");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn ping_fails_when_database_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScoreStore::new(dir.path().join("absent.db"));
        assert!(store.ping().is_err());
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn ping_succeeds_after_init() {
        let (_dir, store) = store();
        store.ping().unwrap();
    }

    #[test]
    fn corrupt_timestamp_surfaces_as_store_error() {
        let (_dir, store) = store();
        insert_at(&store, "x", 1, "yesterday");
        let err = store.top_scores(1).unwrap_err();
        assert!(matches!(err, StoreError::Timestamp { column: "game_date", .. }));
    }

    #[tokio::test]
    async fn blocking_runs_on_worker_thread() {
        let (_dir, store) = store();
        let id = store
            .blocking(|s| s.submit_score("async", 7))
            .await
            .unwrap();
        let scores = store
            .blocking(|s| s.scores_for_player("async"))
            .await
            .unwrap();
        assert_eq!(scores[0].id, id);
    }
}
