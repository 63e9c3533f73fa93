use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const ODDS_API_URL: &str = "https://api.the-odds-api.com/v4";

/// Sent with every upstream request.
pub const USER_AGENT: &str = concat!("odds-props/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_SPORT: &str = "basketball_nba";

/// Full-game markets requested in odds mode unless overridden.
pub const DEFAULT_MARKETS: &str = "h2h,spreads";

/// Short names accepted on the command line.
pub const SPORT_SHORTCUTS: &[(&str, &str)] = &[
    ("nba", "basketball_nba"),
    ("nfl", "americanfootball_nfl"),
    ("mlb", "baseball_mlb"),
    ("nhl", "icehockey_nhl"),
    ("ncaab", "basketball_ncaab"),
    ("ncaaf", "americanfootball_ncaaf"),
    ("soccer", "soccer_epl"),
];

/// Minimum length of a dashboard search query.
pub const MIN_SEARCH_LEN: usize = 2;

/// Rows returned per search category.
pub const SEARCH_LIMIT: i64 = 10;

/// Upper bound for PROPS_LOOKAHEAD_HOURS (one year).
pub const MAX_LOOKAHEAD_HOURS: i64 = 24 * 365;

/// Games returned by the player history endpoint.
pub const HISTORY_LIMIT: i64 = 20;

/// Map a shortcut like `nba` to its upstream sport key. Unknown values pass through.
pub fn resolve_sport_key(arg: &str) -> String {
    let lower = arg.trim().to_lowercase();
    SPORT_SHORTCUTS
        .iter()
        .find(|(short, _)| *short == lower)
        .map(|(_, key)| key.to_string())
        .unwrap_or(lower)
}

/// Player prop markets requested per event when none are configured.
pub fn default_prop_markets(sport_key: &str) -> &'static str {
    match sport_key {
        "americanfootball_nfl" | "americanfootball_ncaaf" => {
            "player_pass_yds,player_pass_tds,player_rush_yds,player_reception_yds,player_receptions,player_anytime_td"
        }
        "baseball_mlb" => "batter_hits,batter_total_bases,batter_home_runs,pitcher_strikeouts",
        "icehockey_nhl" => "player_points,player_goals,player_assists,player_shots_on_goal",
        _ => "player_points,player_assists,player_rebounds,player_threes,player_steals,player_blocks",
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// ODDS_API_KEY; only required by commands that call upstream.
    pub odds_api_key: Option<String>,
    pub odds_api_url: String,
    /// Comma-separated bookmaker regions (ODDS_API_REGIONS)
    pub regions: String,
    /// Full-game markets for odds mode (ODDS_API_MARKETS)
    pub markets: String,
    /// "decimal" or "american" (ODDS_API_ODDS_FORMAT)
    pub odds_format: String,
    /// Upstream request timeout (ODDS_API_TIMEOUT, seconds)
    pub request_timeout: Duration,
    /// Overrides the per-sport prop market list (ODDS_PROP_MARKETS)
    pub prop_markets: Option<String>,
    /// Props mode only fetches events starting within this many hours (PROPS_LOOKAHEAD_HOURS)
    pub props_lookahead_hours: i64,
    /// Upper bound on per-event calls in one props run (PROPS_MAX_EVENTS)
    pub props_max_events: usize,
    pub db_path: PathBuf,
    pub api_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup. `from_env` passes the process environment.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            odds_api_key: var("ODDS_API_KEY")
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            odds_api_url: get("ODDS_API_URL", ODDS_API_URL)
                .trim_end_matches('/')
                .to_string(),
            regions: get("ODDS_API_REGIONS", "us"),
            markets: get("ODDS_API_MARKETS", DEFAULT_MARKETS),
            odds_format: get("ODDS_API_ODDS_FORMAT", "decimal"),
            request_timeout: Duration::from_secs(
                get("ODDS_API_TIMEOUT", "30")
                    .parse::<u64>()
                    .map_err(|_| AppError::Config("ODDS_API_TIMEOUT must be a whole number of seconds".to_string()))?,
            ),
            prop_markets: var("ODDS_PROP_MARKETS").filter(|m| !m.trim().is_empty()),
            props_lookahead_hours: get("PROPS_LOOKAHEAD_HOURS", "24")
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|h| (1..=MAX_LOOKAHEAD_HOURS).contains(h))
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "PROPS_LOOKAHEAD_HOURS must be a whole number of hours between 1 and {MAX_LOOKAHEAD_HOURS}"
                    ))
                })?,
            props_max_events: get("PROPS_MAX_EVENTS", "20")
                .trim()
                .parse::<usize>()
                .map_err(|_| AppError::Config("PROPS_MAX_EVENTS must be a non-negative whole number".to_string()))?,
            db_path: PathBuf::from(get("PLAYER_PROPS_DB", "data/player_props.db")),
            api_port: get("API_PORT", "5000")
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: get("LOG_LEVEL", "info"),
        })
    }

    /// The API key, rejecting missing keys and obvious placeholders.
    pub fn require_api_key(&self) -> Result<&str> {
        let key = self
            .odds_api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("ODDS_API_KEY is not set".to_string()))?;

        let lower = key.to_lowercase();
        if lower.contains("your_api_key") || lower.contains("change_me") || lower.starts_with("sample") {
            return Err(AppError::Config(
                "ODDS_API_KEY appears to be a placeholder value; replace it with your real key".to_string(),
            ));
        }
        Ok(key)
    }

    /// Prop markets to request for `sport_key`.
    pub fn prop_markets_for(&self, sport_key: &str) -> String {
        self.prop_markets
            .clone()
            .unwrap_or_else(|| default_prop_markets(sport_key).to_string())
    }
}
