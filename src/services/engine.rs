use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::Row;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::db::Database;
use crate::services::achievements::{self, Achievement};
use crate::services::error::EngineError;
use crate::services::goals::{self, Goal};
use crate::services::rank;
use crate::services::stats::{self, Summary};
use crate::services::timeline::{self, DayBucket};
use crate::services::window;

/// Immutable result of one ranking pass. Reads serve from the latest
/// snapshot instead of recomputing the world per request; `version`
/// increments monotonically with every published pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSnapshot {
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub entries: Vec<Summary>,
    /// Users whose aggregation failed during the pass; they keep their
    /// previous summary and are retried on the next refresh.
    pub skipped_user_ids: Vec<i64>,
}

/// The leaderboard and gamification engine. One instance per process, held
/// in `AppState` and passed by reference to handlers; there is no hidden
/// global state.
pub struct LeaderboardEngine {
    db: Arc<Database>,
    /// Serializes ranking passes; rank assignment is a global
    /// read-then-write-all operation.
    refresh_lock: Mutex<()>,
    snapshot: RwLock<Option<Arc<RankingSnapshot>>>,
    version: AtomicU64,
    snapshot_max_age: Duration,
    query_timeout: Duration,
}

impl LeaderboardEngine {
    pub fn new(db: Arc<Database>) -> Self {
        let snapshot_max_age = db.config().snapshot_max_age;
        let query_timeout = db.config().query_timeout;
        Self {
            db,
            refresh_lock: Mutex::new(()),
            snapshot: RwLock::new(None),
            version: AtomicU64::new(0),
            snapshot_max_age,
            query_timeout,
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout),
        }
    }

    /// Full pass: recompute every user's summary, then re-rank, then publish
    /// a new snapshot. A failing user is skipped and logged rather than
    /// aborting the pass.
    pub async fn refresh(&self) -> Result<Arc<RankingSnapshot>, EngineError> {
        let _guard = self.refresh_lock.lock().await;
        self.with_timeout(self.refresh_inner()).await
    }

    async fn refresh_inner(&self) -> Result<Arc<RankingSnapshot>, EngineError> {
        let user_ids: Vec<i64> = sqlx::query_scalar(r#"SELECT "id" FROM "users" ORDER BY "id""#)
            .fetch_all(self.db.pool())
            .await?;

        let mut skipped = Vec::new();
        for user_id in user_ids {
            if let Err(err) = stats::recompute(&self.db, user_id).await {
                warn!(user_id, error = %err, "summary recompute failed, skipping user");
                skipped.push(user_id);
            }
        }

        let entries = rank::recompute_all_ranks(&self.db).await?;
        let snapshot = self.publish(entries, skipped).await;
        info!(
            version = snapshot.version,
            users = snapshot.entries.len(),
            skipped = snapshot.skipped_user_ids.len(),
            "leaderboard refreshed"
        );
        Ok(snapshot)
    }

    /// Ranks-only pass over existing summaries; used after a single-user
    /// recompute where re-aggregating everyone would be wasted work.
    pub async fn rerank(&self) -> Result<Arc<RankingSnapshot>, EngineError> {
        let _guard = self.refresh_lock.lock().await;
        self.with_timeout(async {
            let entries = rank::recompute_all_ranks(&self.db).await?;
            Ok(self.publish(entries, Vec::new()).await)
        })
        .await
    }

    async fn publish(&self, entries: Vec<Summary>, skipped: Vec<i64>) -> Arc<RankingSnapshot> {
        let snapshot = Arc::new(RankingSnapshot {
            version: self.version.fetch_add(1, Ordering::SeqCst) + 1,
            computed_at: Utc::now(),
            entries,
            skipped_user_ids: skipped,
        });
        *self.snapshot.write().await = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Returns the current snapshot, refreshing first when it is missing or
    /// older than the configured max age.
    pub async fn ensure_fresh(&self) -> Result<Arc<RankingSnapshot>, EngineError> {
        if let Some(snapshot) = self.snapshot.read().await.clone() {
            let age = Utc::now() - snapshot.computed_at;
            if age.to_std().map(|a| a <= self.snapshot_max_age).unwrap_or(true) {
                return Ok(snapshot);
            }
        }
        self.refresh().await
    }

    pub async fn current_snapshot(&self) -> Option<Arc<RankingSnapshot>> {
        self.snapshot.read().await.clone()
    }

    pub async fn page(&self, page: i64, per_page: i64) -> Result<LeaderboardPage, EngineError> {
        if page < 1 {
            return Err(EngineError::Invalid(format!("page must be >= 1, got {page}")));
        }
        let per_page = per_page.clamp(1, 100);

        let snapshot = self.ensure_fresh().await?;
        let total = snapshot.entries.len() as i64;
        let pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };

        let start = page_offset(page, per_page);
        let entries: Vec<Summary> = snapshot
            .entries
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect();

        Ok(LeaderboardPage {
            entries,
            total,
            pages,
            current_page: page,
            per_page,
            version: snapshot.version,
        })
    }

    pub async fn top(&self, limit: i64) -> Result<Vec<Summary>, EngineError> {
        let limit = limit.clamp(1, 50) as usize;
        let snapshot = self.ensure_fresh().await?;
        Ok(snapshot.entries.iter().take(limit).cloned().collect())
    }

    /// Recomputes one user's summary, re-ranks, and returns the user's entry
    /// from the fresh snapshot. A caller never observes a summary without a
    /// rank.
    pub async fn user_rank(&self, user_id: i64) -> Result<Summary, EngineError> {
        self.with_timeout(stats::recompute(&self.db, user_id)).await?;
        let snapshot = self.rerank().await?;
        snapshot
            .entries
            .iter()
            .find(|entry| entry.user_id == user_id)
            .cloned()
            .ok_or(EngineError::NotFound(user_id))
    }

    /// `user_rank` plus the bounded rank neighborhood around the caller.
    pub async fn my_rank(
        &self,
        user_id: i64,
        radius: i64,
    ) -> Result<(Summary, Vec<Summary>), EngineError> {
        self.with_timeout(stats::recompute(&self.db, user_id)).await?;
        let snapshot = self.rerank().await?;
        let nearby = window::nearby(&snapshot.entries, user_id, radius)?;
        let me = snapshot
            .entries
            .iter()
            .find(|entry| entry.user_id == user_id)
            .cloned()
            .ok_or(EngineError::NotFound(user_id))?;
        Ok((me, nearby))
    }

    /// Aggregate totals and averages across all users plus the three top
    /// performer pointers.
    pub async fn leaderboard_stats(&self) -> Result<LeaderboardStats, EngineError> {
        let snapshot = self.ensure_fresh().await?;
        self.with_timeout(async {
            let pool = self.db.pool();

            let total_users: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "users""#)
                .fetch_one(pool)
                .await?;
            let total_points: Option<i64> =
                sqlx::query_scalar(r#"SELECT SUM("points")::bigint FROM "users""#)
                    .fetch_one(pool)
                    .await?;
            let total_quizzes: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "quiz_attempts""#)
                .fetch_one(pool)
                .await?;
            let total_notes: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "notes""#)
                .fetch_one(pool)
                .await?;
            let avg_points: Option<f64> =
                sqlx::query_scalar(r#"SELECT AVG("points")::double precision FROM "users""#)
                    .fetch_one(pool)
                    .await?;

            let attempts: Vec<(i64, i64)> =
                sqlx::query(r#"SELECT "score", "totalQuestions" FROM "quiz_attempts""#)
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

            let highest_points = snapshot.entries.first().cloned();
            let most_quizzes = snapshot
                .entries
                .iter()
                .max_by_key(|entry| (entry.quizzes_completed, -entry.user_id))
                .cloned();
            let most_notes = snapshot
                .entries
                .iter()
                .max_by_key(|entry| (entry.notes_uploaded, -entry.user_id))
                .cloned();

            Ok(LeaderboardStats {
                general: GeneralStats {
                    total_users,
                    total_points_awarded: total_points.unwrap_or(0),
                    total_quizzes_completed: total_quizzes,
                    total_notes_uploaded: total_notes,
                    average_points_per_user: stats::round2(avg_points.unwrap_or(0.0)),
                    average_quiz_score: stats::average_percent(&attempts),
                },
                top_performers: TopPerformers {
                    highest_points,
                    most_quizzes,
                    most_notes,
                },
            })
        })
        .await
    }

    pub async fn activity_timeline(
        &self,
        user_id: i64,
        span_days: i64,
    ) -> Result<Vec<DayBucket>, EngineError> {
        self.with_timeout(timeline::timeline(&self.db, user_id, span_days))
            .await
    }

    pub async fn achievements(&self, user_id: i64) -> Result<Vec<Achievement>, EngineError> {
        self.with_timeout(achievements::achievements(&self.db, user_id))
            .await
    }

    pub async fn goals(&self, user_id: i64) -> Result<Vec<Goal>, EngineError> {
        self.with_timeout(goals::goals(&self.db, user_id)).await
    }

    pub async fn overview(&self, user_id: i64) -> Result<Overview, EngineError> {
        self.with_timeout(self.overview_inner(user_id)).await
    }

    async fn overview_inner(&self, user_id: i64) -> Result<Overview, EngineError> {
        let pool = self.db.pool();

        let user_row = sqlx::query(
            r#"SELECT "username", "firstName", "lastName", "points" FROM "users" WHERE "id" = $1"#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        let Some(user_row) = user_row else {
            return Err(EngineError::NotFound(user_id));
        };

        let total_notes: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM "notes" WHERE "userId" = $1"#)
                .bind(user_id)
                .fetch_one(pool)
                .await?;
        let total_quizzes_created: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM "quizzes" WHERE "createdBy" = $1"#)
                .bind(user_id)
                .fetch_one(pool)
                .await?;
        let total_quiz_attempts: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "userId" = $1"#)
                .bind(user_id)
                .fetch_one(pool)
                .await?;
        let total_past_questions: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM "past_questions" WHERE "uploadedBy" = $1"#)
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        let week_ago = (Utc::now() - ChronoDuration::days(7)).naive_utc();
        let notes_this_week: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "notes" WHERE "userId" = $1 AND "createdAt" >= $2"#,
        )
        .bind(user_id)
        .bind(week_ago)
        .fetch_one(pool)
        .await?;
        let attempts_this_week: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "userId" = $1 AND "completedAt" >= $2"#,
        )
        .bind(user_id)
        .bind(week_ago)
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

        let total_users: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "users""#)
            .fetch_one(pool)
            .await?;

        // Rank comes from the current summary row; it may be absent only for
        // users that never triggered a ranking pass.
        let rank: Option<i64> =
            sqlx::query_scalar(r#"SELECT "rank" FROM "leaderboard" WHERE "userId" = $1"#)
                .bind(user_id)
                .fetch_optional(pool)
                .await?
                .flatten();

        Ok(Overview {
            user_info: OverviewUserInfo {
                id: user_id,
                username: user_row.try_get("username")?,
                first_name: user_row.try_get("firstName")?,
                last_name: user_row.try_get("lastName")?,
                points: user_row.try_get("points")?,
                rank,
                total_users,
            },
            stats: OverviewStats {
                total_notes,
                total_quizzes_created,
                total_quiz_attempts,
                total_past_questions_uploaded: total_past_questions,
                average_quiz_score: stats::average_percent(&attempts),
            },
            recent_activity: OverviewRecentActivity {
                notes_this_week,
                quiz_attempts_this_week: attempts_this_week,
            },
        })
    }

    pub async fn quiz_performance(&self, user_id: i64) -> Result<QuizPerformance, EngineError> {
        self.with_timeout(self.quiz_performance_inner(user_id)).await
    }

    async fn quiz_performance_inner(&self, user_id: i64) -> Result<QuizPerformance, EngineError> {
        let pool = self.db.pool();

        let rows = sqlx::query(
            r#"
            SELECT "id", "quizId", "score", "totalQuestions", "timeTaken", "completedAt"
            FROM "quiz_attempts"
            WHERE "userId" = $1
            ORDER BY "completedAt" DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            return Ok(QuizPerformance::default());
        }

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            let score: i64 = row.try_get("score")?;
            let total_questions: i64 = row.try_get("totalQuestions")?;
            let completed_at: chrono::NaiveDateTime = row.try_get("completedAt")?;
            attempts.push(AttemptView {
                id: row.try_get("id")?,
                quiz_id: row.try_get("quizId")?,
                score,
                total_questions,
                percentage: stats::round2(stats::attempt_percent(score, total_questions)),
                time_taken: row.try_get("timeTaken")?,
                completed_at: DateTime::<Utc>::from_naive_utc_and_offset(completed_at, Utc),
            });
        }

        let pairs: Vec<(i64, i64)> = attempts
            .iter()
            .map(|a| (a.score, a.total_questions))
            .collect();
        let average_score = stats::average_percent(&pairs);
        let best_score = attempts
            .iter()
            .map(|a| a.percentage)
            .fold(0.0_f64, f64::max);

        let recent_attempts: Vec<AttemptView> = attempts.iter().take(10).cloned().collect();

        // Last 20 attempts, oldest first, numbered from 1.
        let performance_trend: Vec<TrendPoint> = attempts
            .iter()
            .take(20)
            .rev()
            .enumerate()
            .map(|(index, attempt)| TrendPoint {
                attempt_number: index as i64 + 1,
                score_percentage: attempt.percentage,
                date: attempt.completed_at.date_naive(),
            })
            .collect();

        let subject_rows = sqlx::query(
            r#"
            SELECT q."subject", qa."score", qa."totalQuestions"
            FROM "quiz_attempts" qa
            JOIN "quizzes" q ON q."id" = qa."quizId"
            WHERE qa."userId" = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let mut by_subject: std::collections::BTreeMap<String, Vec<(i64, i64)>> =
            std::collections::BTreeMap::new();
        for row in subject_rows {
            let subject: String = row.try_get("subject")?;
            let score: i64 = row.try_get("score")?;
            let total: i64 = row.try_get("totalQuestions")?;
            by_subject.entry(subject).or_default().push((score, total));
        }
        let subject_performance: Vec<SubjectPerformance> = by_subject
            .into_iter()
            .map(|(subject, pairs)| SubjectPerformance {
                attempts: pairs.len() as i64,
                average_score: stats::average_percent(&pairs),
                subject,
            })
            .collect();

        Ok(QuizPerformance {
            total_attempts: attempts.len() as i64,
            average_score,
            best_score,
            recent_attempts,
            performance_trend,
            subject_performance,
        })
    }

    pub async fn notes_analytics(&self, user_id: i64) -> Result<NotesAnalytics, EngineError> {
        self.with_timeout(self.notes_analytics_inner(user_id)).await
    }

    async fn notes_analytics_inner(&self, user_id: i64) -> Result<NotesAnalytics, EngineError> {
        let pool = self.db.pool();

        let rows = sqlx::query(
            r#"
            SELECT "id", "title", "subject", "createdAt"
            FROM "notes"
            WHERE "userId" = $1
            ORDER BY "createdAt" DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            return Ok(NotesAnalytics::default());
        }

        let mut notes = Vec::with_capacity(rows.len());
        for row in rows {
            let created_at: chrono::NaiveDateTime = row.try_get("createdAt")?;
            notes.push(NoteView {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                subject: row.try_get("subject")?,
                created_at: DateTime::<Utc>::from_naive_utc_and_offset(created_at, Utc),
            });
        }

        let mut subject_counts: std::collections::BTreeMap<String, i64> =
            std::collections::BTreeMap::new();
        for note in &notes {
            *subject_counts.entry(note.subject.clone()).or_insert(0) += 1;
        }
        let subjects: Vec<SubjectCount> = subject_counts
            .into_iter()
            .map(|(subject, count)| SubjectCount { subject, count })
            .collect();

        let timestamps: Vec<DateTime<Utc>> = notes.iter().map(|n| n.created_at).collect();
        let creation_timeline: Vec<NotesTimelinePoint> =
            timeline::build_timeline(Utc::now().date_naive(), 30, &timestamps, &[], &[])
                .into_iter()
                .map(|bucket| NotesTimelinePoint {
                    date: bucket.date,
                    notes_created: bucket.notes_created,
                })
                .collect();

        let recent_notes: Vec<NoteView> = notes.iter().take(5).cloned().collect();

        Ok(NotesAnalytics {
            total_notes: notes.len() as i64,
            subjects,
            creation_timeline,
            recent_notes,
        })
    }
}

/// Offset of the first entry on `page`. Saturates instead of overflowing,
/// so an absurd page number yields an empty page rather than a panic.
fn page_offset(page: i64, per_page: i64) -> usize {
    (page - 1).saturating_mul(per_page).max(0) as usize
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub entries: Vec<Summary>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
    pub per_page: i64,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStats {
    pub general: GeneralStats,
    pub top_performers: TopPerformers,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralStats {
    pub total_users: i64,
    pub total_points_awarded: i64,
    pub total_quizzes_completed: i64,
    pub total_notes_uploaded: i64,
    pub average_points_per_user: f64,
    pub average_quiz_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformers {
    pub highest_points: Option<Summary>,
    pub most_quizzes: Option<Summary>,
    pub most_notes: Option<Summary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub user_info: OverviewUserInfo,
    pub stats: OverviewStats,
    pub recent_activity: OverviewRecentActivity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewUserInfo {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub points: i64,
    pub rank: Option<i64>,
    pub total_users: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_notes: i64,
    pub total_quizzes_created: i64,
    pub total_quiz_attempts: i64,
    pub total_past_questions_uploaded: i64,
    pub average_quiz_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewRecentActivity {
    pub notes_this_week: i64,
    pub quiz_attempts_this_week: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub id: i64,
    pub quiz_id: i64,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: f64,
    pub time_taken: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub attempt_number: i64,
    pub score_percentage: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub subject: String,
    pub attempts: i64,
    pub average_score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizPerformance {
    pub total_attempts: i64,
    pub average_score: f64,
    pub best_score: f64,
    pub recent_attempts: Vec<AttemptView>,
    pub performance_trend: Vec<TrendPoint>,
    pub subject_performance: Vec<SubjectPerformance>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteView {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCount {
    pub subject: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesTimelinePoint {
    pub date: NaiveDate,
    pub notes_created: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesAnalytics {
    pub total_notes: i64,
    pub subjects: Vec<SubjectCount>,
    pub creation_timeline: Vec<NotesTimelinePoint>,
    pub recent_notes: Vec<NoteView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offset_is_zero_based_in_page_strides() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(2, 20), 20);
        assert_eq!(page_offset(3, 50), 100);
    }

    #[test]
    fn page_offset_saturates_on_extreme_pages() {
        // must not panic, and must land past any real entry set
        let offset = page_offset(i64::MAX, 100);
        assert_eq!(offset, i64::MAX as usize);
        assert_eq!(page_offset(i64::MAX, 1), (i64::MAX - 1) as usize);
    }
}
