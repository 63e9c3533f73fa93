use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{HISTORY_LIMIT, MIN_SEARCH_LEN, SEARCH_LIMIT};
use crate::db::models::{GameHitRow, GameRow, HistoryRow, NameHitRow, SportRow, StatsRow};
use crate::db::store::PropStore;
use crate::error::Result;
use crate::transform::sheet::bookmaker_labels;
use crate::transform::{build_sheets, PlayerPropSheet};
use crate::types::FlatRecord;

/// Game listing window, by commence time in UTC days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateWindow {
    Today,
    Tomorrow,
    Week,
    #[default]
    Upcoming,
}

impl DateWindow {
    /// Unknown values fall back to `Upcoming`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "today" => Self::Today,
            "tomorrow" => Self::Tomorrow,
            "week" => Self::Week,
            _ => Self::Upcoming,
        }
    }

    /// `[start, end)`; `Upcoming` is open-ended.
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let today = start_of_day(now);
        match self {
            Self::Today => (today, Some(today + Duration::days(1))),
            Self::Tomorrow => (today + Duration::days(1), Some(today + Duration::days(2))),
            Self::Week => (today, Some(today + Duration::days(7))),
            Self::Upcoming => (today, None),
        }
    }
}

pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchKind {
    #[default]
    All,
    Player,
    Team,
    Game,
}

impl SearchKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "player" | "players" => Self::Player,
            "team" | "teams" => Self::Team,
            "game" | "games" => Self::Game,
            _ => Self::All,
        }
    }

    fn wants(self, other: SearchKind) -> bool {
        self == Self::All || self == other
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub players: Vec<NameHitRow>,
    pub teams: Vec<NameHitRow>,
    pub games: Vec<GameHitRow>,
}

/// Everything quoted for one game, regrouped per subject.
#[derive(Debug, Clone, Serialize)]
pub struct GameDetail {
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub bookmakers: Vec<String>,
    pub prop_types: Vec<String>,
    pub total_quotes: usize,
    pub subjects: Vec<PlayerPropSheet>,
}

impl GameDetail {
    /// `None` when there are no rows.
    pub fn from_rows(rows: &[FlatRecord]) -> Option<Self> {
        let first = rows.first()?;

        let bookmakers: BTreeSet<String> = bookmaker_labels(rows).into_values().collect();
        let prop_types: BTreeSet<&str> = rows.iter().map(|r| r.prop_type.as_str()).collect();

        Some(Self {
            event_id: first.event_id.clone(),
            sport_key: first.sport_key.clone(),
            sport_title: first.sport_title.clone(),
            home_team: first.home_team.clone(),
            away_team: first.away_team.clone(),
            commence_time: first.commence_time,
            bookmakers: bookmakers.into_iter().collect(),
            prop_types: prop_types.into_iter().map(str::to_string).collect(),
            total_quotes: rows.len(),
            subjects: build_sheets(rows),
        })
    }
}

/// `%` and `_` in user input match literally.
fn like_pattern(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len() + 2);
    escaped.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl PropStore {
    /// Sports with games commencing today or later.
    pub async fn list_sports(&self, now: DateTime<Utc>) -> Result<Vec<SportRow>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, SportRow>(
            r#"
            SELECT sport_key,
                   MAX(sport_title) AS sport_title,
                   COUNT(DISTINCT event_id) AS game_count
            FROM player_props
            WHERE commence_time >= ?
            GROUP BY sport_key
            ORDER BY sport_key
            "#,
        )
        .bind(start_of_day(now))
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    pub async fn list_games(
        &self,
        sport_key: Option<&str>,
        window: DateWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameRow>> {
        let (start, end) = window.bounds(now);
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, GameRow>(
            r#"
            SELECT event_id,
                   MAX(sport_key) AS sport_key,
                   MAX(sport_title) AS sport_title,
                   MAX(home_team) AS home_team,
                   MAX(away_team) AS away_team,
                   MIN(commence_time) AS commence_time,
                   COUNT(DISTINCT subject) AS subject_count,
                   COUNT(DISTINCT bookmaker_key) AS bookmaker_count,
                   MAX(ingested_at) AS last_ingested
            FROM player_props
            WHERE (? IS NULL OR sport_key = ?)
              AND commence_time >= ?
              AND (? IS NULL OR commence_time < ?)
            GROUP BY event_id
            ORDER BY commence_time, event_id
            "#,
        )
        .bind(sport_key)
        .bind(sport_key)
        .bind(start)
        .bind(end)
        .bind(end)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    pub async fn game_detail(&self, event_id: &str) -> Result<Option<GameDetail>> {
        let rows = self.query_by_event(event_id).await?;
        Ok(GameDetail::from_rows(&rows))
    }

    /// Case-insensitive (ASCII) substring search. Queries shorter than the
    /// minimum length return nothing.
    pub async fn search(&self, q: &str, kind: SearchKind) -> Result<SearchResults> {
        let q = q.trim();
        let mut results = SearchResults::default();
        if q.chars().count() < MIN_SEARCH_LEN {
            return Ok(results);
        }
        let pattern = like_pattern(q);
        let mut conn = self.conn().await?;

        if kind.wants(SearchKind::Player) {
            // Team names are subjects on h2h/spreads; keep them out of player hits.
            results.players = sqlx::query_as::<_, NameHitRow>(
                r#"
                SELECT subject AS name, COUNT(DISTINCT event_id) AS game_count
                FROM player_props
                WHERE subject LIKE ? ESCAPE '\'
                  AND subject <> home_team AND subject <> away_team
                GROUP BY subject
                ORDER BY game_count DESC, subject
                LIMIT ?
                "#,
            )
            .bind(&pattern)
            .bind(SEARCH_LIMIT)
            .fetch_all(&mut *conn)
            .await?;
        }

        if kind.wants(SearchKind::Team) {
            results.teams = sqlx::query_as::<_, NameHitRow>(
                r#"
                SELECT team AS name, COUNT(DISTINCT event_id) AS game_count
                FROM (
                    SELECT home_team AS team, event_id FROM player_props
                    UNION ALL
                    SELECT away_team AS team, event_id FROM player_props
                )
                WHERE team LIKE ? ESCAPE '\'
                GROUP BY team
                ORDER BY game_count DESC, team
                LIMIT ?
                "#,
            )
            .bind(&pattern)
            .bind(SEARCH_LIMIT)
            .fetch_all(&mut *conn)
            .await?;
        }

        if kind.wants(SearchKind::Game) {
            results.games = sqlx::query_as::<_, GameHitRow>(
                r#"
                SELECT event_id,
                       MAX(home_team) AS home_team,
                       MAX(away_team) AS away_team,
                       MIN(commence_time) AS commence_time
                FROM player_props
                WHERE home_team LIKE ? ESCAPE '\' OR away_team LIKE ? ESCAPE '\'
                GROUP BY event_id
                ORDER BY commence_time DESC, event_id
                LIMIT ?
                "#,
            )
            .bind(&pattern)
            .bind(&pattern)
            .bind(SEARCH_LIMIT)
            .fetch_all(&mut *conn)
            .await?;
        }

        Ok(results)
    }

    /// Most recent games first; one entry per (game, prop type, line).
    pub async fn subject_history(&self, subject: &str) -> Result<Vec<HistoryRow>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT event_id,
                   MAX(home_team) AS home_team,
                   MAX(away_team) AS away_team,
                   MAX(commence_time) AS commence_time,
                   prop_type,
                   line,
                   COUNT(DISTINCT bookmaker_key) AS bookmaker_count,
                   AVG(CASE WHEN outcome_name = 'Over' THEN price END) AS avg_over_price,
                   AVG(CASE WHEN outcome_name = 'Under' THEN price END) AS avg_under_price
            FROM player_props
            WHERE subject = ?
            GROUP BY event_id, prop_type, line
            ORDER BY commence_time DESC, event_id, prop_type, line
            LIMIT ?
            "#,
        )
        .bind(subject)
        .bind(HISTORY_LIMIT)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<StatsRow> {
        let (start, end) = DateWindow::Today.bounds(now);
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT COUNT(*) AS total_props,
                   COUNT(DISTINCT subject) AS unique_subjects,
                   COUNT(DISTINCT event_id) AS total_games,
                   COUNT(DISTINCT CASE WHEN commence_time >= ? AND commence_time < ? THEN event_id END) AS today_games,
                   COUNT(DISTINCT bookmaker_key) AS unique_bookmakers,
                   MAX(ingested_at) AS last_update
            FROM player_props
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }
}
