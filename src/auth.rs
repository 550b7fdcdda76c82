use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::db::Database;

const AUTH_COOKIE_NAME: &str = "auth_token";

/// Caller resolved from an authenticated session. Session issuance is owned
/// by the auth collaborator; this module only verifies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("missing JWT_SECRET")]
    MissingSecret,
    #[error("database error: {0}")]
    Database(String),
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.to_string())
}

pub async fn verify_request_token(db: &Database, token: &str) -> Result<AuthUser, AuthError> {
    let secret = std::env::var("JWT_SECRET").map_err(|_| AuthError::MissingSecret)?;
    let user_id = verify_jwt_hs256(token, &secret)?;
    let token_hash = hash_token(token);

    verify_session(db.pool(), user_id, &token_hash).await
}

fn verify_jwt_hs256(token: &str, secret: &str) -> Result<i64, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;

    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidToken)?;
    let alg = header_json
        .get("alg")
        .and_then(|value| value.as_str())
        .ok_or(AuthError::InvalidToken)?;
    if alg != "HS256" {
        return Err(AuthError::InvalidToken);
    }

    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidToken)?;

    let now = Utc::now().timestamp();
    if let Some(exp) = payload_json.get("exp").and_then(|value| value.as_i64()) {
        if now >= exp {
            return Err(AuthError::InvalidToken);
        }
    }
    if let Some(nbf) = payload_json.get("nbf").and_then(|value| value.as_i64()) {
        if now < nbf {
            return Err(AuthError::InvalidToken);
        }
    }

    // The identity claim arrives either as a JSON number or a numeric string.
    let sub = payload_json
        .get("sub")
        .or_else(|| payload_json.get("userId"))
        .ok_or(AuthError::InvalidToken)?;

    match sub {
        serde_json::Value::Number(n) => n.as_i64().ok_or(AuthError::InvalidToken),
        serde_json::Value::String(s) => s.parse::<i64>().map_err(|_| AuthError::InvalidToken),
        _ => Err(AuthError::InvalidToken),
    }
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

async fn verify_session(
    pool: &PgPool,
    expected_user_id: i64,
    token_hash: &str,
) -> Result<AuthUser, AuthError> {
    let session_row = sqlx::query(
        r#"
        SELECT "userId", "expiresAt"
        FROM "sessions"
        WHERE "token" = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .map_err(|err| AuthError::Database(err.to_string()))?;

    let Some(session_row) = session_row else {
        return Err(AuthError::InvalidToken);
    };

    let session_user_id: i64 = session_row
        .try_get("userId")
        .map_err(|err| AuthError::Database(err.to_string()))?;
    let session_expires_at: NaiveDateTime = session_row
        .try_get("expiresAt")
        .map_err(|err| AuthError::Database(err.to_string()))?;

    if session_user_id != expected_user_id {
        return Err(AuthError::InvalidToken);
    }
    if session_expires_at < Utc::now().naive_utc() {
        return Err(AuthError::InvalidToken);
    }

    let user_row = sqlx::query(
        r#"
        SELECT "id", "username", "firstName", "lastName"
        FROM "users"
        WHERE "id" = $1
        "#,
    )
    .bind(expected_user_id)
    .fetch_optional(pool)
    .await
    .map_err(|err| AuthError::Database(err.to_string()))?;

    let Some(user_row) = user_row else {
        return Err(AuthError::InvalidToken);
    };

    Ok(AuthUser {
        id: user_row
            .try_get("id")
            .map_err(|err| AuthError::Database(err.to_string()))?,
        username: user_row
            .try_get("username")
            .map_err(|err| AuthError::Database(err.to_string()))?,
        first_name: user_row
            .try_get("firstName")
            .map_err(|err| AuthError::Database(err.to_string()))?,
        last_name: user_row
            .try_get("lastName")
            .map_err(|err| AuthError::Database(err.to_string()))?,
    })
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let trimmed = part.trim();
        let (key, value) = trimmed.split_once('=')?;
        if key == name {
            return Some(value.to_string());
        }
    }
    None
}
