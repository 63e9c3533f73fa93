use chrono::{DateTime, Duration, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool};
use tracing::{error, info};

use crate::config::Config;
use crate::error::Result;
use crate::types::FlatRecord;

/// Column list shared by every query that returns `FlatRecord`s.
pub(crate) const RECORD_COLUMNS: &str = "event_id, sport_key, sport_title, home_team, away_team, commence_time, \
     subject, prop_type, outcome_name, price, line, bookmaker_key, bookmaker_title, last_update, ingested_at";

/// Deterministic order for record queries: subject, prop type, bookmaker,
/// outcome. Commence time breaks ties so the latest game comes last.
pub(crate) const RECORD_ORDER: &str = "ORDER BY subject, prop_type, bookmaker_title, bookmaker_key, outcome_name, \
     commence_time, event_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub persisted: usize,
    pub failed: usize,
}

/// SQLite-backed store for flattened quotes. One table, natural-keyed.
#[derive(Clone)]
pub struct PropStore {
    pool: SqlitePool,
}

impl PropStore {
    /// Open (creating if needed) the database at `cfg.db_path` and run migrations.
    pub async fn open(cfg: &Config) -> Result<Self> {
        if let Some(parent) = cfg.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&cfg.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!("Database ready at {}", cfg.db_path.display());
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Borrow one pooled connection for the duration of an operation.
    /// Dropping the guard returns it to the pool on every path, errors included.
    pub(crate) async fn conn(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Insert or replace each record by natural key. A failing record is
    /// logged and skipped; `persisted` counts only successful writes.
    pub async fn upsert(&self, records: &[FlatRecord]) -> Result<UpsertOutcome> {
        let mut conn = self.conn().await?;
        let mut outcome = UpsertOutcome::default();

        for r in records {
            let res = sqlx::query(
                r#"
                INSERT INTO player_props (
                    event_id, sport_key, sport_title, home_team, away_team, commence_time,
                    subject, prop_type, outcome_name, price, line,
                    bookmaker_key, bookmaker_title, last_update, ingested_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(event_id, subject, prop_type, bookmaker_key, outcome_name) DO UPDATE SET
                    sport_key = excluded.sport_key,
                    sport_title = excluded.sport_title,
                    home_team = excluded.home_team,
                    away_team = excluded.away_team,
                    commence_time = excluded.commence_time,
                    price = excluded.price,
                    line = excluded.line,
                    bookmaker_title = excluded.bookmaker_title,
                    last_update = excluded.last_update,
                    ingested_at = excluded.ingested_at
                "#,
            )
            .bind(&r.event_id)
            .bind(&r.sport_key)
            .bind(&r.sport_title)
            .bind(&r.home_team)
            .bind(&r.away_team)
            .bind(r.commence_time)
            .bind(&r.subject)
            .bind(&r.prop_type)
            .bind(&r.outcome_name)
            .bind(r.price)
            .bind(r.line)
            .bind(&r.bookmaker_key)
            .bind(&r.bookmaker_title)
            .bind(r.last_update)
            .bind(r.ingested_at)
            .execute(&mut *conn)
            .await;

            match res {
                Ok(_) => outcome.persisted += 1,
                Err(e) => {
                    outcome.failed += 1;
                    error!(key = ?r.natural_key(), "DB write error: {e}");
                }
            }
        }

        Ok(outcome)
    }

    /// Every quote for `subject`, optionally limited to one sport.
    pub async fn query_by_subject(&self, subject: &str, sport_key: Option<&str>) -> Result<Vec<FlatRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM player_props \
             WHERE subject = ? AND (? IS NULL OR sport_key = ?) {RECORD_ORDER}"
        );
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, FlatRecord>(&sql)
            .bind(subject)
            .bind(sport_key)
            .bind(sport_key)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    pub async fn query_by_event(&self, event_id: &str) -> Result<Vec<FlatRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM player_props WHERE event_id = ? {RECORD_ORDER}");
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, FlatRecord>(&sql)
            .bind(event_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    pub async fn query_by_event_subject(&self, event_id: &str, subject: &str) -> Result<Vec<FlatRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM player_props WHERE event_id = ? AND subject = ? {RECORD_ORDER}"
        );
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, FlatRecord>(&sql)
            .bind(event_id)
            .bind(subject)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Quotes for one subject + prop type in one game, for cross-bookmaker comparison.
    pub async fn query_compare(&self, event_id: &str, subject: &str, prop_type: &str) -> Result<Vec<FlatRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM player_props \
             WHERE event_id = ? AND subject = ? AND prop_type = ? {RECORD_ORDER}"
        );
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, FlatRecord>(&sql)
            .bind(event_id)
            .bind(subject)
            .bind(prop_type)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Quotes ingested within `window` of now.
    pub async fn query_recent(&self, window: Duration) -> Result<Vec<FlatRecord>> {
        self.query_ingested_since(Utc::now() - window).await
    }

    pub async fn query_ingested_since(&self, since: DateTime<Utc>) -> Result<Vec<FlatRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM player_props WHERE ingested_at >= ? {RECORD_ORDER}");
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, FlatRecord>(&sql)
            .bind(since)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        let mut conn = self.conn().await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM player_props")
            .fetch_one(&mut *conn)
            .await?;
        Ok(n)
    }

    pub async fn last_ingested_at(&self) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.conn().await?;
        let ts: Option<DateTime<Utc>> = sqlx::query_scalar("SELECT MAX(ingested_at) FROM player_props")
            .fetch_one(&mut *conn)
            .await?;
        Ok(ts)
    }
}
