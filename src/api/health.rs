//! Shared health state for the /health endpoint.
//! Updated by the request-tracking middleware, read by the handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Request counters for the running server.
pub struct HealthState {
    started_at: Instant,
    requests_served: AtomicU64,
    /// Responses with a 5xx status.
    server_errors: AtomicU64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            requests_served: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
        }
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_response(&self, status: u16) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        if status >= 500 {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn server_errors(&self) -> u64 {
        self.server_errors.load(Ordering::Relaxed)
    }
}

/// Counts every response by status.
pub async fn track_requests(State(health): State<Arc<HealthState>>, req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    health.record_response(resp.status().as_u16());
    resp
}
