use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Count of upstream JSON branches (events, bookmakers, markets, outcomes)
/// dropped during decode because they did not have the expected shape.
static SKIPPED_BRANCHES: AtomicU64 = AtomicU64::new(0);

pub fn skipped_branches() -> u64 {
    SKIPPED_BRANCHES.load(Ordering::Relaxed)
}

fn note_skipped(what: &str, reason: &str) {
    let count = SKIPPED_BRANCHES.fetch_add(1, Ordering::Relaxed) + 1;
    if count <= 10 || count % 1000 == 0 {
        warn!(count, "[DECODE] skipping malformed {what}: {reason}");
    }
}

// ---------------------------------------------------------------------------
// Upstream shapes (The Odds API v4)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sport_key: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sport_title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub home_team: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub away_team: String,
    #[serde(default, deserialize_with = "lenient_time")]
    pub commence_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub bookmakers: Vec<RawBookmakerQuote>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBookmakerQuote {
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_time")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub markets: Vec<RawMarket>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMarket {
    /// Market code, e.g. `h2h`, `spreads`, `player_points`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient_time")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOutcome {
    /// "Over"/"Under" on player props, a team name on h2h/spreads.
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    /// Player name on prop markets; absent on standard markets.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub point: Option<f64>,
}

impl RawEvent {
    /// Decode a top-level event array element by element.
    /// Returns the decoded events and how many were skipped.
    pub fn decode_list(value: Value) -> (Vec<RawEvent>, usize) {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => return (Vec::new(), 0),
            other => {
                note_skipped("event list", &format!("expected an array, got {}", json_kind(&other)));
                return (Vec::new(), 1);
            }
        };

        let mut events = Vec::with_capacity(items.len());
        let mut skipped = 0;
        for item in items {
            match serde_json::from_value::<RawEvent>(item) {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped += 1;
                    note_skipped("event", &e.to_string());
                }
            }
        }
        (events, skipped)
    }

    /// Number of outcomes reachable from this event.
    pub fn outcome_count(&self) -> usize {
        self.bookmakers
            .iter()
            .flat_map(|b| &b.markets)
            .map(|m| m.outcomes.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Missing or non-list values become an empty list; elements that fail to
/// decode are dropped and counted.
fn lenient_seq<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            note_skipped("list", &format!("expected an array, got {}", json_kind(&other)));
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(v) => Some(v),
            Err(e) => {
                note_skipped("list element", &e.to_string());
                None
            }
        })
        .collect())
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts a JSON number or a numeric string.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

/// RFC 3339 strings or unix seconds; anything else is `None`.
fn lenient_time<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Flat record (the persisted unit)
// ---------------------------------------------------------------------------

/// One (event, bookmaker, market, outcome) quote.
/// Natural key: (event_id, subject, prop_type, bookmaker_key, outcome_name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FlatRecord {
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    /// Player name for props, the outcome name otherwise.
    pub subject: String,
    /// Market key.
    pub prop_type: String,
    /// Comparison side ("Over"/"Under") for props, the outcome name otherwise.
    pub outcome_name: String,
    pub price: Option<f64>,
    pub line: Option<f64>,
    pub bookmaker_key: String,
    pub bookmaker_title: String,
    /// Market-level freshness, falling back to the bookmaker's.
    pub last_update: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
}

impl FlatRecord {
    pub fn natural_key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.event_id,
            &self.subject,
            &self.prop_type,
            &self.bookmaker_key,
            &self.outcome_name,
        )
    }
}

// ---------------------------------------------------------------------------
// Ingestion mode / upstream metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// One `/odds` call for full-game markets.
    Odds,
    /// Events listing, then one `/events/{id}/odds` call per event.
    PlayerProps,
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestMode::Odds => write!(f, "odds"),
            IngestMode::PlayerProps => write!(f, "player_props"),
        }
    }
}

/// Usage counters from the `x-requests-*` response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApiQuota {
    pub requests_remaining: Option<u64>,
    pub requests_used: Option<u64>,
    /// Cost of the most recent call.
    pub requests_last: Option<u64>,
}

impl std::fmt::Display for ApiQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: Option<u64>| v.map_or_else(|| "N/A".to_string(), |n| n.to_string());
        write!(
            f,
            "remaining={} used={} last={}",
            show(self.requests_remaining),
            show(self.requests_used),
            show(self.requests_last),
        )
    }
}

/// Entry from `GET /sports`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SportInfo {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub has_outrights: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_full_event() {
        let v = json!({
            "id": "ev1",
            "sport_key": "basketball_nba",
            "sport_title": "NBA",
            "commence_time": "2026-10-19T23:30:00Z",
            "home_team": "Boston Celtics",
            "away_team": "New York Knicks",
            "bookmakers": [{
                "key": "draftkings",
                "title": "DraftKings",
                "last_update": "2026-10-19T18:00:00Z",
                "markets": [{
                    "key": "player_points",
                    "last_update": "2026-10-19T18:01:00Z",
                    "outcomes": [
                        {"name": "Over", "description": "J. Smith", "price": 1.9, "point": 24.5},
                        {"name": "Under", "description": "J. Smith", "price": 1.95, "point": 24.5}
                    ]
                }]
            }]
        });
        let event: RawEvent = serde_json::from_value(v).unwrap();
        assert_eq!(event.id, "ev1");
        assert!(event.commence_time.is_some());
        assert_eq!(event.bookmakers[0].markets[0].outcomes[1].price, Some(1.95));
        assert_eq!(event.bookmakers[0].markets[0].outcomes[0].description.as_deref(), Some("J. Smith"));
        assert_eq!(event.outcome_count(), 2);
    }

    #[test]
    fn missing_lists_decode_as_empty() {
        let event: RawEvent = serde_json::from_value(json!({"id": "ev2"})).unwrap();
        assert!(event.bookmakers.is_empty());

        let event: RawEvent =
            serde_json::from_value(json!({"id": "ev3", "bookmakers": "oops"})).unwrap();
        assert!(event.bookmakers.is_empty());
    }

    #[test]
    fn malformed_branch_is_dropped_and_siblings_survive() {
        let v = json!({
            "id": "ev4",
            "bookmakers": [
                42,
                {"key": "fanduel", "title": "FanDuel", "markets": [
                    {"key": "h2h", "outcomes": [{"name": "Team A", "price": "2.10"}, "garbage"]}
                ]}
            ]
        });
        let before = skipped_branches();
        let event: RawEvent = serde_json::from_value(v).unwrap();
        assert_eq!(event.bookmakers.len(), 1);
        assert_eq!(event.bookmakers[0].markets[0].outcomes.len(), 1);
        assert_eq!(event.bookmakers[0].markets[0].outcomes[0].price, Some(2.10));
        assert!(skipped_branches() >= before + 2);
    }

    #[test]
    fn unparseable_price_and_time_become_none() {
        let v = json!({"name": "Over", "price": "n/a", "point": null});
        let outcome: RawOutcome = serde_json::from_value(v).unwrap();
        assert_eq!(outcome.price, None);
        assert_eq!(outcome.point, None);

        let m: RawMarket =
            serde_json::from_value(json!({"key": "h2h", "last_update": "yesterday"})).unwrap();
        assert!(m.last_update.is_none());
    }

    #[test]
    fn decode_list_skips_bad_events_only() {
        let (events, skipped) = RawEvent::decode_list(json!([
            {"id": "a"},
            {"id": "b", "home_team": {"nested": true}},
            {"id": "c"}
        ]));
        // A non-string team name decodes as empty rather than failing the event.
        assert_eq!(events.len(), 3);
        assert_eq!(skipped, 0);
        assert_eq!(events[1].home_team, "");

        let (events, skipped) = RawEvent::decode_list(json!([{"id": "a"}, 7, "x"]));
        assert_eq!(events.len(), 1);
        assert_eq!(skipped, 2);

        let (events, skipped) = RawEvent::decode_list(json!({"message": "not a list"}));
        assert!(events.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn quota_display_marks_missing_counters() {
        let q = ApiQuota {
            requests_remaining: Some(480),
            requests_used: None,
            requests_last: Some(3),
        };
        assert_eq!(q.to_string(), "remaining=480 used=N/A last=3");
    }
}
