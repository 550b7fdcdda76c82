use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::{json_error, AppError};
use crate::services::stats::Summary;
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageData {
    leaderboard: Vec<Summary>,
    pagination: Pagination,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: i64,
    per_page: i64,
    total: i64,
    pages: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TopData {
    top_users: Vec<Summary>,
    count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MyRankData {
    my_stats: Summary,
    nearby_users: Vec<Summary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    total_users: usize,
    skipped_user_ids: Vec<i64>,
    version: u64,
}

const NEARBY_RADIUS: i64 = 2;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_leaderboard))
        .route("/top/:limit", get(get_top))
        .route("/user/:id", get(get_user_rank))
        .route("/my-rank", get(get_my_rank))
        .route("/stats", get(get_stats))
        .route("/refresh", post(refresh))
}

async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let engine = require_engine(&state)?;
    let page = engine
        .page(query.page.unwrap_or(1), query.per_page.unwrap_or(20))
        .await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: PageData {
            pagination: Pagination {
                page: page.current_page,
                per_page: page.per_page,
                total: page.total,
                pages: page.pages,
            },
            leaderboard: page.entries,
        },
    }))
}

async fn get_top(
    State(state): State<AppState>,
    Path(limit): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let engine = require_engine(&state)?;
    let entries = engine.top(limit).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: TopData {
            count: entries.len(),
            top_users: entries,
        },
    }))
}

async fn get_user_rank(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let engine = require_engine(&state)?;
    let entry = engine.user_rank(user_id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: entry,
    }))
}

async fn get_my_rank(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (engine, user) = require_user(&state, &headers).await?;
    let (me, nearby) = engine.my_rank(user.id, NEARBY_RADIUS).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: MyRankData {
            my_stats: me,
            nearby_users: nearby,
        },
    }))
}

async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let engine = require_engine(&state)?;
    let stats = engine.leaderboard_stats().await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: stats,
    }))
}

async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (engine, _user) = require_user(&state, &headers).await?;
    let snapshot = engine.refresh().await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: RefreshData {
            total_users: snapshot.entries.len(),
            skipped_user_ids: snapshot.skipped_user_ids.clone(),
            version: snapshot.version,
        },
    }))
}

fn require_engine(
    state: &AppState,
) -> Result<std::sync::Arc<crate::services::engine::LeaderboardEngine>, AppError> {
    state.engine().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "service unavailable",
        )
    })
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
    let engine = require_engine(state)?;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_payload_reports_users_and_count() {
        let entry = Summary {
            user_id: 1,
            username: "amina".to_string(),
            first_name: "Amina".to_string(),
            last_name: "Yusuf".to_string(),
            total_points: 120,
            quizzes_completed: 4,
            notes_uploaded: 2,
            average_score: 75.0,
            rank: Some(1),
        };
        let data = TopData {
            count: 1,
            top_users: vec![entry],
        };

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["topUsers"][0]["userId"], 1);
        assert_eq!(json["topUsers"][0]["rank"], 1);
    }
}
