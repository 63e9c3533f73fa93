use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed client request to the HTTP API.
    #[error("{0}")]
    BadRequest(String),

    /// 401 from the odds provider. Fatal to the run.
    #[error("Odds API rejected the API key: {0}")]
    UpstreamAuth(String),

    /// 429 from the odds provider. Aborts the run, not the process.
    #[error("Odds API rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Odds API error (status {status}): {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// True for errors that must stop an ingestion run instead of being
    /// skipped per event.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, AppError::UpstreamAuth(_) | AppError::RateLimited(_))
    }

    /// Operator-facing hint printed next to run-level failures.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            AppError::UpstreamAuth(_) => {
                Some("check ODDS_API_KEY (get a key at https://the-odds-api.com/)")
            }
            AppError::RateLimited(_) => {
                Some("wait before making more requests; usage is shown in the x-requests-* counters")
            }
            AppError::Config(_) => Some("check your environment or .env file"),
            AppError::Database(_) | AppError::Migration(_) => {
                Some("check PLAYER_PROPS_DB points at a writable location")
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Config(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamAuth(_)
            | AppError::RateLimited(_)
            | AppError::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string(), "success": false });
        (status, Json(body)).into_response()
    }
}
