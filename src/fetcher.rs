use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, USER_AGENT};
use crate::error::{AppError, Result};
use crate::types::{ApiQuota, RawEvent, SportInfo};

/// Client for The Odds API v4. Every call is a single GET with the key as a
/// query parameter; usage counters from the response headers are kept.
pub struct OddsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    quota: ApiQuota,
}

fn parse_quota_header(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

/// Upstream error bodies are `{"message": ...}`; fall back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

impl OddsClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let api_key = cfg.require_api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.odds_api_url.clone(),
            api_key,
            quota: ApiQuota::default(),
        })
    }

    /// Counters from the most recent response that carried them.
    pub fn last_quota(&self) -> ApiQuota {
        self.quota
    }

    /// `GET /sports`. In-season sports only unless `all`.
    pub async fn sports(&mut self, all: bool) -> Result<Vec<SportInfo>> {
        let mut query = Vec::new();
        if all {
            query.push(("all", "true"));
        }
        let body = self.get_json("/sports", &query).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// `GET /sports/{sport}/events`: upcoming events without odds.
    pub async fn events(&mut self, sport: &str) -> Result<Vec<RawEvent>> {
        let body = self
            .get_json(&format!("/sports/{sport}/events"), &[("dateFormat", "iso")])
            .await?;
        let (events, skipped) = RawEvent::decode_list(body);
        debug!(sport, events = events.len(), skipped, "fetched events");
        Ok(events)
    }

    /// `GET /sports/{sport}/odds` for full-game markets.
    pub async fn odds(&mut self, sport: &str, regions: &str, markets: &str, odds_format: &str) -> Result<Vec<RawEvent>> {
        let body = self
            .get_json(
                &format!("/sports/{sport}/odds"),
                &[
                    ("regions", regions),
                    ("markets", markets),
                    ("oddsFormat", odds_format),
                    ("dateFormat", "iso"),
                ],
            )
            .await?;
        let (events, skipped) = RawEvent::decode_list(body);
        info!(sport, events = events.len(), skipped, "Fetched odds");
        Ok(events)
    }

    /// `GET /sports/{sport}/events/{event_id}/odds`: one event, any markets
    /// (player props are only served here).
    pub async fn event_odds(
        &mut self,
        sport: &str,
        event_id: &str,
        regions: &str,
        markets: &str,
        odds_format: &str,
    ) -> Result<RawEvent> {
        let body = self
            .get_json(
                &format!("/sports/{sport}/events/{event_id}/odds"),
                &[
                    ("regions", regions),
                    ("markets", markets),
                    ("oddsFormat", odds_format),
                    ("dateFormat", "iso"),
                ],
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn get_json(&mut self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        // Read usage counters before consuming the body.
        let headers = resp.headers();
        let quota = ApiQuota {
            requests_remaining: parse_quota_header(headers, "x-requests-remaining"),
            requests_used: parse_quota_header(headers, "x-requests-used"),
            requests_last: parse_quota_header(headers, "x-requests-last"),
        };
        if quota != ApiQuota::default() {
            self.quota = quota;
            info!("[QUOTA] {path}: {quota}");
        }

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<Value>().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(status = status.as_u16(), path, "Odds API error: {message}");
        Err(match status {
            StatusCode::UNAUTHORIZED => AppError::UpstreamAuth(message),
            StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(message),
            _ => AppError::UpstreamStatus {
                status: status.as_u16(),
                body: message,
            },
        })
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::test_support::{spawn_stub, stub_config};
    use super::*;

    const QUOTA: [(&str, &str); 3] = [
        ("x-requests-remaining", "480"),
        ("x-requests-used", "20"),
        ("x-requests-last", "3"),
    ];

    async fn odds_handler(Path(sport): Path<String>, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
        if q.get("apiKey").map(String::as_str) != Some("test-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid API key"}))).into_response();
        }
        let markets = q.get("markets").cloned().unwrap_or_default();
        (
            QUOTA,
            Json(json!([
                {
                    "id": "ev1",
                    "sport_key": sport,
                    "home_team": "Boston Celtics",
                    "away_team": "New York Knicks",
                    "commence_time": "2026-10-19T23:30:00Z",
                    "bookmakers": [{"key": "dk", "title": "DK", "markets": [
                        {"key": markets, "outcomes": [{"name": "Boston Celtics", "price": 1.6}]}
                    ]}]
                },
                "not an event"
            ])),
        )
            .into_response()
    }

    async fn event_odds_handler(Path((_sport, event_id)): Path<(String, String)>) -> impl IntoResponse {
        Json(json!({
            "id": event_id,
            "bookmakers": [{"key": "dk", "title": "DK", "markets": [{"key": "player_points", "outcomes": [
                {"name": "Over", "description": "J. Smith", "price": 1.9, "point": 24.5}
            ]}]}]
        }))
    }

    async fn events_handler(Path(sport): Path<String>) -> impl IntoResponse {
        match sport.as_str() {
            "limited" => (StatusCode::TOO_MANY_REQUESTS, "Usage quota has been reached").into_response(),
            "broken" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "boom"}))).into_response(),
            _ => Json(json!([])).into_response(),
        }
    }

    fn stub_app() -> Router {
        Router::new()
            .route("/sports", get(|| async { Json(json!([{"key": "basketball_nba", "group": "Basketball", "title": "NBA", "active": true}])) }))
            .route("/sports/:sport/odds", get(odds_handler))
            .route("/sports/:sport/events/:event_id/odds", get(event_odds_handler))
            .route("/sports/:sport/events", get(events_handler))
    }

    #[tokio::test]
    async fn odds_decodes_events_and_records_quota() {
        let base = spawn_stub(stub_app()).await;
        let mut client = OddsClient::new(&stub_config(&base)).unwrap();

        let events = client.odds("basketball_nba", "us", "h2h", "decimal").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sport_key, "basketball_nba");
        assert_eq!(events[0].bookmakers[0].markets[0].key, "h2h");

        let quota = client.last_quota();
        assert_eq!(quota.requests_remaining, Some(480));
        assert_eq!(quota.requests_used, Some(20));
        assert_eq!(quota.requests_last, Some(3));
    }

    #[tokio::test]
    async fn event_odds_returns_one_event() {
        let base = spawn_stub(stub_app()).await;
        let mut client = OddsClient::new(&stub_config(&base)).unwrap();
        let event = client
            .event_odds("basketball_nba", "ev42", "us", "player_points", "decimal")
            .await
            .unwrap();
        assert_eq!(event.id, "ev42");
        assert_eq!(event.outcome_count(), 1);
        // No quota headers on this route; counters stay unset.
        assert_eq!(client.last_quota(), ApiQuota::default());
    }

    #[tokio::test]
    async fn sports_listing_decodes() {
        let base = spawn_stub(stub_app()).await;
        let mut client = OddsClient::new(&stub_config(&base)).unwrap();
        let sports = client.sports(false).await.unwrap();
        assert_eq!(sports[0].key, "basketball_nba");
        assert!(sports[0].active);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let base = spawn_stub(stub_app()).await;
        let mut cfg = stub_config(&base);
        cfg.odds_api_key = Some("wrong-key".to_string());
        let mut client = OddsClient::new(&cfg).unwrap();

        let err = client.odds("basketball_nba", "us", "h2h", "decimal").await.unwrap_err();
        match err {
            AppError::UpstreamAuth(msg) => assert_eq!(msg, "Invalid API key"),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let base = spawn_stub(stub_app()).await;
        let mut client = OddsClient::new(&stub_config(&base)).unwrap();

        let err = client.events("limited").await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited(ref m) if m.contains("quota")));
        assert!(err.is_run_fatal());

        let err = client.events("broken").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamStatus { status: 500, ref body } if body == "boom"));
        assert!(!err.is_run_fatal());
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let mut cfg = stub_config("http://127.0.0.1:9");
        cfg.odds_api_key = None;
        assert!(matches!(OddsClient::new(&cfg), Err(AppError::Config(_))));
    }

    #[test]
    fn quota_header_parsing_tolerates_junk() {
        let mut headers = HeaderMap::new();
        headers.insert("x-requests-remaining", "12.0".parse().unwrap());
        headers.insert("x-requests-used", "lots".parse().unwrap());
        assert_eq!(parse_quota_header(&headers, "x-requests-remaining"), Some(12));
        assert_eq!(parse_quota_header(&headers, "x-requests-used"), None);
        assert_eq!(parse_quota_header(&headers, "x-requests-last"), None);
    }
}
