//! Row types for the aggregate dashboard queries in `queries.rs`.
//! Flat quote rows decode straight into `types::FlatRecord`.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SportRow {
    pub sport_key: String,
    pub sport_title: String,
    pub game_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GameRow {
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    /// Distinct subjects quoted for this game.
    pub subject_count: i64,
    pub bookmaker_count: i64,
    pub last_ingested: Option<DateTime<Utc>>,
}

/// A name matched by search with how many games it appears in.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NameHitRow {
    pub name: String,
    pub game_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GameHitRow {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
}

/// One (game, prop type, line) entry in a subject's history.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HistoryRow {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub prop_type: String,
    pub line: Option<f64>,
    pub bookmaker_count: i64,
    pub avg_over_price: Option<f64>,
    pub avg_under_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatsRow {
    pub total_props: i64,
    pub unique_subjects: i64,
    pub total_games: i64,
    pub today_games: i64,
    pub unique_bookmakers: i64,
    pub last_update: Option<DateTime<Utc>>,
}
