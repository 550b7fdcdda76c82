use chrono::Utc;
use serde::Serialize;
use sqlx::Row;

use crate::db::Database;
use crate::services::error::EngineError;

/// Per-user cached aggregate, one row in the `leaderboard` table.
///
/// `rank` is owned by the rank assigner: `recompute` never touches it, and a
/// freshly created summary carries `None` until the next ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub total_points: i64,
    pub quizzes_completed: i64,
    pub notes_uploaded: i64,
    pub average_score: f64,
    pub rank: Option<i64>,
}

/// Recomputes one user's summary from current activity records and upserts
/// the `leaderboard` row. Always a full recompute; the average is never
/// carried forward incrementally.
pub async fn recompute(db: &Database, user_id: i64) -> Result<Summary, EngineError> {
    let pool = db.pool();

    let user_row = sqlx::query(
        r#"
        SELECT "username", "firstName", "lastName", "points"
        FROM "users"
        WHERE "id" = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(user_row) = user_row else {
        return Err(EngineError::NotFound(user_id));
    };

    let username: String = user_row.try_get("username")?;
    let first_name: String = user_row.try_get("firstName")?;
    let last_name: String = user_row.try_get("lastName")?;
    let total_points: i64 = user_row.try_get("points")?;

    let quizzes_completed: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "userId" = $1"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    let notes_uploaded: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "notes" WHERE "userId" = $1"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    let attempts: Vec<(i64, i64)> = sqlx::query(
        r#"SELECT "score", "totalQuestions" FROM "quiz_attempts" WHERE "userId" = $1"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| {
        Ok::<_, sqlx::Error>((
            row.try_get::<i64, _>("score")?,
            row.try_get::<i64, _>("totalQuestions")?,
        ))
    })
    .collect::<Result<_, _>>()?;

    let average_score = average_percent(&attempts);

    let rank: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO "leaderboard"
          ("userId", "totalPoints", "quizzesCompleted", "notesUploaded", "averageScore", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT ("userId") DO UPDATE SET
          "totalPoints" = EXCLUDED."totalPoints",
          "quizzesCompleted" = EXCLUDED."quizzesCompleted",
          "notesUploaded" = EXCLUDED."notesUploaded",
          "averageScore" = EXCLUDED."averageScore",
          "updatedAt" = EXCLUDED."updatedAt"
        RETURNING "rank"
        "#,
    )
    .bind(user_id)
    .bind(total_points)
    .bind(quizzes_completed)
    .bind(notes_uploaded)
    .bind(average_score)
    .bind(Utc::now().naive_utc())
    .fetch_one(pool)
    .await?;

    Ok(Summary {
        user_id,
        username,
        first_name,
        last_name,
        total_points,
        quizzes_completed,
        notes_uploaded,
        average_score,
        rank,
    })
}

/// Unweighted mean of per-attempt percentage scores, rounded half-up to two
/// decimals. An attempt with zero questions counts as 0% instead of dividing
/// by zero; no attempts at all yields 0.0.
pub fn average_percent(attempts: &[(i64, i64)]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }

    let sum: f64 = attempts
        .iter()
        .map(|&(score, total)| attempt_percent(score, total))
        .sum();

    round2(sum / attempts.len() as f64)
}

pub fn attempt_percent(score: i64, total_questions: i64) -> f64 {
    if total_questions <= 0 {
        return 0.0;
    }
    (score as f64 / total_questions as f64) * 100.0
}

/// Half-up rounding to two decimals (scores are non-negative, so
/// `f64::round` is half-up here).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_no_attempts_is_zero() {
        assert_eq!(average_percent(&[]), 0.0);
    }

    #[test]
    fn average_is_unweighted_mean_of_percentages() {
        // 50% and 100% average to 75 regardless of quiz length.
        assert_eq!(average_percent(&[(5, 10), (2, 2)]), 75.0);
    }

    #[test]
    fn zero_question_attempt_counts_as_zero_percent() {
        assert_eq!(average_percent(&[(3, 0), (10, 10)]), 50.0);
    }

    #[test]
    fn rounding_is_half_up_to_two_decimals() {
        // 1/3 of 100 -> 33.333... -> 33.33
        assert_eq!(average_percent(&[(1, 3)]), 33.33);
        // 2/3 of 100 -> 66.666... -> 66.67
        assert_eq!(average_percent(&[(2, 3)]), 66.67);
        // exact half rounds up (0.125 is representable exactly)
        assert_eq!(round2(0.125), 0.13);
    }

    #[test]
    fn average_is_deterministic_for_same_input() {
        let attempts = vec![(7, 9), (3, 4), (0, 5)];
        let first = average_percent(&attempts);
        let second = average_percent(&attempts);
        assert_eq!(first.to_bits(), second.to_bits());
    }
}
