use std::collections::BTreeMap;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror api/routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatsResponse {
    pub total_props: i64,
    pub unique_subjects: i64,
    pub total_games: i64,
    pub today_games: i64,
    pub unique_bookmakers: i64,
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameSummary {
    pub event_id: String,
    #[serde(default)]
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<String>,
    pub subject_count: i64,
    pub bookmaker_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct GamesResponse {
    games: Vec<GameSummary>,
}

pub type OutcomePrices = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, Deserialize)]
pub struct LineQuotes {
    pub line: Option<f64>,
    pub bookmakers: BTreeMap<String, OutcomePrices>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropLines {
    pub prop_type: String,
    pub lines: Vec<LineQuotes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sheet {
    pub subject: String,
    pub props: Vec<PropLines>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameDetail {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<String>,
    pub total_quotes: usize,
    pub subjects: Vec<Sheet>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthResponse {
    pub status: Option<String>,
    pub records: Option<i64>,
    pub server_errors: Option<u64>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// One rendered row of the quotes pane.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRow {
    pub subject: String,
    pub prop_type: String,
    pub line: String,
    pub bookmaker: String,
    pub prices: String,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub stats: StatsResponse,
    pub games: Vec<GameSummary>,
    pub detail: Option<GameDetail>,
    pub health: HealthResponse,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            stats: StatsResponse::default(),
            games: Vec::new(),
            detail: None,
            health: HealthResponse::default(),
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    /// Fetch the sheets for one game into `detail`.
    pub async fn fetch_game(&mut self, client: &reqwest::Client, event_id: &str) {
        let url = format!("{}/api/game/{}", self.base_url, event_id);
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(detail) = resp.json::<GameDetail>().await {
                    self.detail = Some(detail);
                }
            }
            Ok(_) => self.detail = None,
            Err(e) => self.status = ConnectionStatus::Error(format!("{e}")),
        }
    }

    pub fn selected_game(&self, index: Option<usize>) -> Option<&GameSummary> {
        index.and_then(|i| self.games.get(i))
    }

    /// Quote rows for the selected game, or empty.
    pub fn quote_rows(&self) -> Vec<QuoteRow> {
        self.detail
            .as_ref()
            .map(|d| d.subjects.iter().flat_map(sheet_rows).collect())
            .unwrap_or_default()
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let stats_url = format!("{}/api/stats", self.base_url);
        let games_url = format!("{}/api/games?date=upcoming", self.base_url);
        let health_url = format!("{}/health", self.base_url);

        let (stats_res, games_res, health_res) = tokio::join!(
            client.get(&stats_url).send(),
            client.get(&games_url).send(),
            client.get(&health_url).send(),
        );

        let (stats_resp, games_resp) = match (stats_res, games_res) {
            (Ok(s), Ok(g)) => (s, g),
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        let (stats, games) = tokio::join!(
            stats_resp.json::<StatsResponse>(),
            games_resp.json::<GamesResponse>(),
        );

        match (stats, games) {
            (Ok(s), Ok(g)) => {
                self.stats = s;
                self.games = g.games;
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();

                if let Ok(h) = health_res {
                    if let Ok(health) = h.json::<HealthResponse>().await {
                        self.health = health;
                    }
                }

                if let Some(event_id) = self.detail.as_ref().map(|d| d.event_id.clone()) {
                    self.fetch_game(client, &event_id).await;
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// One row per (prop, line, bookmaker); outcomes joined as "Over 1.90 / Under 1.95".
pub fn sheet_rows(sheet: &Sheet) -> Vec<QuoteRow> {
    let mut rows = Vec::new();
    for prop in &sheet.props {
        for line in &prop.lines {
            for (bookmaker, outcomes) in &line.bookmakers {
                let prices = outcomes
                    .iter()
                    .map(|(name, price)| format!("{} {}", name, format_price(*price)))
                    .collect::<Vec<_>>()
                    .join(" / ");
                rows.push(QuoteRow {
                    subject: sheet.subject.clone(),
                    prop_type: short_prop(&prop.prop_type).to_string(),
                    line: format_line(line.line),
                    bookmaker: bookmaker.clone(),
                    prices,
                });
            }
        }
    }
    rows
}

pub fn format_price(p: Option<f64>) -> String {
    p.map_or("—".to_string(), |v| format!("{v:.2}"))
}

pub fn format_line(l: Option<f64>) -> String {
    l.map_or("—".to_string(), |v| format!("{v}"))
}

/// `player_points` → `points`.
pub fn short_prop(prop_type: &str) -> &str {
    prop_type
        .strip_prefix("player_")
        .or_else(|| prop_type.strip_prefix("batter_"))
        .or_else(|| prop_type.strip_prefix("pitcher_"))
        .unwrap_or(prop_type)
}

/// RFC 3339 timestamp → "MM-DD HH:MM" (UTC); anything else is shown as-is.
pub fn format_kickoff(t: Option<&str>) -> String {
    match t.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) {
        Some(dt) => dt.with_timezone(&chrono::Utc).format("%m-%d %H:%M").to_string(),
        None => t.unwrap_or("—").to_string(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
