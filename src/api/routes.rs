use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::api::health::{track_requests, HealthState};
use crate::config::{resolve_sport_key, MIN_SEARCH_LEN};
use crate::db::models::{GameRow, HistoryRow, SportRow, StatsRow};
use crate::db::{DateWindow, GameDetail, PropStore, SearchKind, SearchResults};
use crate::error::AppError;
use crate::transform::sheet::BookmakerLines;
use crate::transform::{build_sheet, build_sheets, compare_lines, PlayerPropSheet};

const DASHBOARD_HTML: &str = include_str!("../../static/dashboard.html");

/// Shown when a subject has no stored quotes.
pub const NO_DATA_MESSAGE: &str = "no data for this subject yet";

#[derive(Clone)]
pub struct ApiState {
    pub store: PropStore,
    pub health: Arc<HealthState>,
}

impl ApiState {
    pub fn new(store: PropStore) -> Self {
        Self {
            store,
            health: Arc::new(HealthState::new()),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(get_health))
        .route("/api/sports", get(get_sports))
        .route("/api/games", get(get_games))
        .route("/api/game/:event_id", get(get_game))
        .route("/api/game/:event_id/player/:name", get(get_game_player))
        .route("/api/player/:name", get(get_player))
        .route("/api/player/:name/history", get(get_player_history))
        .route("/api/search", get(search))
        .route("/api/compare", get(compare))
        .route("/api/recent", get(get_recent))
        .route("/api/stats", get(get_stats))
        .layer(middleware::from_fn_with_state(Arc::clone(&state.health), track_requests))
        .with_state(state)
        .layer(cors)
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message, "success": false })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct GamesQuery {
    pub sport: Option<String>,
    pub date: Option<String>,
}

#[derive(Deserialize)]
pub struct PlayerQuery {
    pub sport: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
pub struct CompareQuery {
    pub event_id: Option<String>,
    pub player: Option<String>,
    pub prop_type: Option<String>,
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub hours: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store_reachable: bool,
    pub records: Option<i64>,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub requests_served: u64,
    pub server_errors: u64,
}

#[derive(Serialize)]
pub struct SportsResponse {
    pub sports: Vec<SportRow>,
    pub success: bool,
}

#[derive(Serialize)]
pub struct GamesResponse {
    pub games: Vec<GameRow>,
    pub sport: Option<String>,
    pub date: DateWindow,
    pub success: bool,
}

#[derive(Serialize)]
pub struct GameResponse {
    #[serde(flatten)]
    pub game: GameDetail,
    pub success: bool,
}

#[derive(Serialize)]
pub struct SheetResponse {
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub has_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub sheet: PlayerPropSheet,
    pub success: bool,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub player_name: String,
    pub history: Vec<HistoryRow>,
    pub success: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: SearchResults,
    pub query: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Serialize)]
pub struct CompareResponse {
    pub event_id: String,
    pub player: String,
    pub prop_type: String,
    pub comparison: Vec<BookmakerLines>,
    pub success: bool,
}

#[derive(Serialize)]
pub struct RecentResponse {
    pub hours: i64,
    pub records: usize,
    pub sheets: Vec<PlayerPropSheet>,
    pub success: bool,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: StatsRow,
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn get_health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let count = state.store.count().await;
    let last = state.store.last_ingested_at().await.ok().flatten();
    let reachable = count.is_ok();

    let status = if reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            status: if reachable { "ok" } else { "degraded" },
            store_reachable: reachable,
            records: count.ok(),
            last_ingested_at: last,
            uptime_secs: state.health.uptime_secs(),
            requests_served: state.health.requests_served(),
            server_errors: state.health.server_errors(),
        }),
    )
}

async fn get_sports(State(state): State<ApiState>) -> Result<Json<SportsResponse>, AppError> {
    let sports = state.store.list_sports(Utc::now()).await?;
    Ok(Json(SportsResponse { sports, success: true }))
}

async fn get_games(
    State(state): State<ApiState>,
    Query(params): Query<GamesQuery>,
) -> Result<Json<GamesResponse>, AppError> {
    let window = params.date.as_deref().map(DateWindow::parse).unwrap_or_default();
    let sport = params
        .sport
        .filter(|s| !s.trim().is_empty() && s != "all")
        .map(|s| resolve_sport_key(&s));

    let games = state
        .store
        .list_games(sport.as_deref(), window, Utc::now())
        .await?;

    Ok(Json(GamesResponse {
        games,
        sport,
        date: window,
        success: true,
    }))
}

async fn get_game(
    State(state): State<ApiState>,
    Path(event_id): Path<String>,
) -> Result<Response, AppError> {
    match state.store.game_detail(&event_id).await? {
        Some(game) => Ok(Json(GameResponse { game, success: true }).into_response()),
        None => Ok(not_found("Game not found")),
    }
}

async fn get_game_player(
    State(state): State<ApiState>,
    Path((event_id, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let rows = state.store.query_by_event_subject(&event_id, &name).await?;
    if rows.is_empty() {
        return Ok(not_found("Player not found in this game"));
    }

    let sheet = build_sheet(&name, &rows);
    Ok(Json(SheetResponse {
        player_name: name,
        event_id: Some(event_id),
        has_data: true,
        message: None,
        sheet,
        success: true,
    })
    .into_response())
}

/// Always 200: an unknown subject gets an empty sheet and a message.
async fn get_player(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(params): Query<PlayerQuery>,
) -> Result<Json<SheetResponse>, AppError> {
    let sport = params
        .sport
        .filter(|s| !s.trim().is_empty())
        .map(|s| resolve_sport_key(&s));
    let rows = state.store.query_by_subject(&name, sport.as_deref()).await?;
    let sheet = build_sheet(&name, &rows);
    let has_data = sheet.has_data();

    Ok(Json(SheetResponse {
        player_name: name,
        event_id: None,
        has_data,
        message: (!has_data).then_some(NO_DATA_MESSAGE),
        sheet,
        success: true,
    }))
}

async fn get_player_history(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = state.store.subject_history(&name).await?;
    Ok(Json(HistoryResponse {
        player_name: name,
        history,
        success: true,
    }))
}

async fn search(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.unwrap_or_default().trim().to_string();
    if query.chars().count() < MIN_SEARCH_LEN {
        return Ok(Json(SearchResponse {
            results: SearchResults::default(),
            query,
            success: false,
            error: Some("Query too short"),
        }));
    }

    let kind = params.kind.as_deref().map(SearchKind::parse).unwrap_or_default();
    let results = state.store.search(&query, kind).await?;
    Ok(Json(SearchResponse {
        results,
        query,
        success: true,
        error: None,
    }))
}

async fn compare(
    State(state): State<ApiState>,
    Query(params): Query<CompareQuery>,
) -> Result<Response, AppError> {
    let (Some(event_id), Some(player), Some(prop_type)) = (params.event_id, params.player, params.prop_type) else {
        return Err(AppError::BadRequest(
            "missing required parameters: event_id, player, prop_type".to_string(),
        ));
    };

    let rows = state.store.query_compare(&event_id, &player, &prop_type).await?;
    if rows.is_empty() {
        return Ok(not_found("No data found"));
    }

    Ok(Json(CompareResponse {
        comparison: compare_lines(&rows),
        event_id,
        player,
        prop_type,
        success: true,
    })
    .into_response())
}

async fn get_recent(
    State(state): State<ApiState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<RecentResponse>, AppError> {
    let hours = params.hours.unwrap_or(24).clamp(1, 24 * 30);
    let rows = state.store.query_recent(Duration::hours(hours)).await?;

    Ok(Json(RecentResponse {
        hours,
        records: rows.len(),
        sheets: build_sheets(&rows),
        success: true,
    }))
}

async fn get_stats(State(state): State<ApiState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.store.stats(Utc::now()).await?;
    Ok(Json(StatsResponse { stats, success: true }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::db::store::test_support::{memory_store, record};

    async fn app() -> Router {
        let store = memory_store().await;
        store
            .upsert(&[
                record("ev1", "J. Smith", "player_points", "DK", "Over", 1.9, Some(24.5)),
                record("ev1", "J. Smith", "player_points", "DK", "Under", 1.95, Some(24.5)),
                record("ev1", "J. Smith", "player_points", "FD", "Over", 1.87, Some(25.5)),
                record("ev1", "Boston Celtics", "h2h", "DK", "Boston Celtics", 1.6, None),
            ])
            .await
            .unwrap();
        router(ApiState::new(store))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn player_sheet_nests_by_prop_line_and_bookmaker() {
        let (status, body) = get_json(app().await, "/api/player/J.%20Smith").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_data"], true);

        let lines = &body["sheet"]["props"][0]["lines"];
        assert_eq!(body["sheet"]["props"][0]["prop_type"], "player_points");
        assert_eq!(lines[0]["line"], 24.5);
        assert_eq!(lines[0]["bookmakers"]["DK"]["Over"], 1.9);
        assert_eq!(lines[0]["bookmakers"]["DK"]["Under"], 1.95);
        assert_eq!(lines[1]["bookmakers"]["FD"]["Over"], 1.87);
    }

    #[tokio::test]
    async fn unknown_player_gets_empty_sheet_and_message() {
        let (status, body) = get_json(app().await, "/api/player/Nobody").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_data"], false);
        assert_eq!(body["message"], NO_DATA_MESSAGE);
        assert_eq!(body["sheet"]["props"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn missing_game_is_404_json() {
        let (status, body) = get_json(app().await, "/api/game/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = get_json(app().await, "/api/game/ev1/player/Nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn game_detail_lists_subjects() {
        let (status, body) = get_json(app().await, "/api/game/ev1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event_id"], "ev1");
        assert_eq!(body["total_quotes"], 4);
        assert_eq!(body["subjects"].as_array().unwrap().len(), 2);
        assert_eq!(body["bookmakers"], serde_json::json!(["DK", "FD"]));
    }

    #[tokio::test]
    async fn games_and_sports_list_upcoming() {
        let (status, body) = get_json(app().await, "/api/games?sport=basketball_nba&date=week").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date"], "week");
        assert_eq!(body["games"][0]["event_id"], "ev1");

        let (_, body) = get_json(app().await, "/api/sports").await;
        assert_eq!(body["sports"][0]["sport_key"], "basketball_nba");
    }

    #[tokio::test]
    async fn compare_requires_all_params() {
        let (status, body) = get_json(app().await, "/api/compare?event_id=ev1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "missing required parameters: event_id, player, prop_type");

        let (status, body) = get_json(
            app().await,
            "/api/compare?event_id=ev1&player=J.%20Smith&prop_type=player_points",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comparison"][0]["bookmaker"], "DK");
        assert_eq!(body["comparison"][1]["lines"][0]["line"], 25.5);

        let (status, _) = get_json(
            app().await,
            "/api/compare?event_id=ev1&player=J.%20Smith&prop_type=player_assists",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn short_search_is_rejected_softly() {
        let (status, body) = get_json(app().await, "/api/search?q=j").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);

        let (_, body) = get_json(app().await, "/api/search?q=smith&type=player").await;
        assert_eq!(body["results"]["players"][0]["name"], "J. Smith");
    }

    #[tokio::test]
    async fn recent_and_stats_cover_the_table() {
        let (_, body) = get_json(app().await, "/api/recent?hours=1").await;
        assert_eq!(body["records"], 4);
        assert_eq!(body["sheets"].as_array().unwrap().len(), 2);

        let (_, body) = get_json(app().await, "/api/stats").await;
        assert_eq!(body["total_props"], 4);
        assert_eq!(body["unique_bookmakers"], 2);
    }

    #[tokio::test]
    async fn health_reports_store_and_dashboard_is_served() {
        let (status, body) = get_json(app().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["records"], 4);

        let response = app()
            .await
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("<html"));
    }
}
