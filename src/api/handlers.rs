use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

const SLOW_DATABASE: Duration = Duration::from_secs(1);

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let response = RootResponse {
        message: state.settings().api().project_name.clone(),
        version: state.settings().api().version.clone(),
    };

    Json(response)
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    let started = Instant::now();
    match sqlx::query("SELECT 1").execute(state.db()).await {
        Ok(_) if started.elapsed() > SLOW_DATABASE => {
            components.insert("database".to_string(), "slow".to_string());
            status = "degraded".to_string();
        }
        Ok(_) => {
            components.insert("database".to_string(), "healthy".to_string());
        }
        Err(err) => {
            tracing::warn!(error = %err, "Database health check failed");
            components.insert("database".to_string(), format!("unhealthy: {err}"));
            status = "unhealthy".to_string();
        }
    }

    Json(HealthResponse { service: "quiz-attempts".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
