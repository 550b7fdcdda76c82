use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::{json_error, AppError};
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    days: Option<i64>,
}

const DEFAULT_ACTIVITY_DAYS: i64 = 30;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/overview", get(get_overview))
        .route("/activity", get(get_activity))
        .route("/quiz-performance", get(get_quiz_performance))
        .route("/notes-analytics", get(get_notes_analytics))
        .route("/achievements", get(get_achievements))
        .route("/goals", get(get_goals))
}

async fn get_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (engine, user) = require_user(&state, &headers).await?;
    let overview = engine.overview(user.id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: overview,
    }))
}

async fn get_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (engine, user) = require_user(&state, &headers).await?;
    let days = query.days.unwrap_or(DEFAULT_ACTIVITY_DAYS);
    let timeline = engine.activity_timeline(user.id, days).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: timeline,
    }))
}

async fn get_quiz_performance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (engine, user) = require_user(&state, &headers).await?;
    let performance = engine.quiz_performance(user.id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: performance,
    }))
}

async fn get_notes_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (engine, user) = require_user(&state, &headers).await?;
    let analytics = engine.notes_analytics(user.id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: analytics,
    }))
}

async fn get_achievements(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (engine, user) = require_user(&state, &headers).await?;
    let achievements = engine.achievements(user.id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: achievements,
    }))
}

async fn get_goals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (engine, user) = require_user(&state, &headers).await?;
    let goals = engine.goals(user.id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: goals,
    }))
}

async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<
    (
        std::sync::Arc<crate::services::engine::LeaderboardEngine>,
        crate::auth::AuthUser,
    ),
    AppError,
> {
    let token = crate::auth::extract_token(headers).ok_or_else(|| {
        json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing auth token")
    })?;

    let db = state.db().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "service unavailable",
        )
    })?;
    let engine = state.engine().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "service unavailable",
        )
    })?;

    let user = crate::auth::verify_request_token(db.as_ref(), &token)
        .await
        .map_err(|_| {
            json_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "authentication failed, please log in again",
            )
        })?;

    Ok((engine, user))
}
