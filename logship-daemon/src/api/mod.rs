//! HTTP server: log ingest and the management API.
//!
//! # Routes
//!
//! - `POST /ingest`: JSON object or array of objects
//! - `GET /api/events`, `GET /api/stats`, `GET /api/drops`
//! - `GET /api/rules`, `POST /api/rules`, `POST /api/rules/test`
//! - `GET /api/settings`, `PUT /api/settings/{key}`
//! - `GET /api/health`: per-module health, 503 when unhealthy
//! - `GET /healthz`

pub mod error;
mod events;
mod ingest;
mod rules;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use logship_core::config::ServerConfig;
use logship_pipeline::{Ingestor, RuleEngine};
use logship_store::Store;

use crate::health::{self, DaemonHealth, HealthReader};

pub use error::ApiError;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Classifies and stores ingested events.
    pub ingestor: Ingestor,
    /// Event, rule and settings storage.
    pub store: Store,
    /// Active rule set.
    pub rules: Arc<RuleEngine>,
    /// Maximum accepted `/ingest` body size in bytes.
    pub max_body_bytes: usize,
    /// Deadline for reading an `/ingest` body.
    pub body_timeout: Duration,
    /// Latest published daemon health.
    pub health: HealthReader,
}

impl AppState {
    /// Build handler state from an ingestor and the server settings.
    pub fn new(ingestor: Ingestor, server: &ServerConfig) -> Self {
        Self {
            store: ingestor.store().clone(),
            rules: Arc::clone(ingestor.rules()),
            ingestor,
            max_body_bytes: server.max_body_bytes,
            body_timeout: Duration::from_secs(server.body_timeout_secs),
            health: health::channel().1,
        }
    }

    /// Serve health snapshots from `reader` instead of the `starting` placeholder.
    pub fn with_health(mut self, reader: HealthReader) -> Self {
        self.health = reader;
        self
    }
}

/// Build the HTTP router.
///
/// `/ingest` needs the peer address, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest::ingest_handler))
        .route("/api/events", get(events::events_handler))
        .route("/api/stats", get(events::stats_handler))
        .route("/api/drops", get(events::drops_handler))
        .route("/api/rules", get(rules::list_handler).post(rules::create_handler))
        .route("/api/rules/test", post(rules::test_handler))
        .route("/api/settings", get(settings::list_handler))
        .route("/api/settings/{key}", put(settings::put_handler))
        .route("/api/health", get(health_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<DaemonHealth>) {
    let report = state.health.borrow().clone();
    let status = if report.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
