use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/info", get(info))
        .route("/live", get(live))
}

async fn root(State(state): State<AppState>) -> Response {
    let db_status = database_check(&state).await;
    let ok = matches!(db_status, DbCheckStatus::Connected { .. });

    let response = CompatHealthResponse {
        database: if ok { "connected" } else { "disconnected" },
        timestamp: now_iso(),
        status: if ok { "ok" } else { "degraded" },
    };

    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn info(State(state): State<AppState>) -> Response {
    let response = HealthInfoResponse {
        service: "eduaccess-backend",
        version: std::env::var("APP_VERSION")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        environment: std::env::var("APP_ENV")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "development".to_string()),
        start_time: system_time_iso(state.started_at_system()),
        uptime: state.uptime_seconds(),
    };

    Json(response).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    let process_healthy = std::process::id() > 0;

    let response = LivenessResponse {
        status: if process_healthy { "healthy" } else { "unhealthy" },
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        checks: LivenessChecks {
            process: process_healthy,
        },
    };

    let status_code = if process_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response)).into_response()
}

#[derive(Debug)]
enum DbCheckStatus {
    Connected { latency_ms: Option<u64> },
    Disconnected,
}

async fn database_check(state: &AppState) -> DbCheckStatus {
    let Some(db) = state.db() else {
        return DbCheckStatus::Disconnected;
    };

    let health = db.health_status().await;
    if health.healthy {
        return DbCheckStatus::Connected {
            latency_ms: health.latency_ms,
        };
    }
    DbCheckStatus::Disconnected
}

fn system_time_iso(time: std::time::SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Serialize)]
struct CompatHealthResponse {
    database: &'static str,
    timestamp: String,
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthInfoResponse {
    service: &'static str,
    version: String,
    environment: String,
    start_time: String,
    uptime: u64,
}

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    checks: LivenessChecks,
}

#[derive(Serialize)]
struct LivenessChecks {
    process: bool,
}
