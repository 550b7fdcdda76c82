use std::cmp::Ordering;

use sqlx::Row;

use crate::db::Database;
use crate::services::error::EngineError;
use crate::services::stats::Summary;

/// Leaderboard ordering: total points desc, then average score desc, then
/// quizzes completed desc. Ascending user id is the fourth key, so the order
/// is total and repeated passes over unchanged data agree bit-for-bit.
pub fn compare_entries(a: &Summary, b: &Summary) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| b.average_score.total_cmp(&a.average_score))
        .then_with(|| b.quizzes_completed.cmp(&a.quizzes_completed))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Sorts in place and assigns dense 1-based ranks. No collapsing: ties on
/// every stat key still get distinct consecutive ranks via the user-id key.
pub fn assign_ranks(entries: &mut [Summary]) {
    entries.sort_by(compare_entries);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = Some(index as i64 + 1);
    }
}

/// Re-ranks every existing summary row. Reads all summaries, orders them,
/// and writes the ranks inside one transaction so a concurrent reader never
/// observes a half-applied pass.
pub async fn recompute_all_ranks(db: &Database) -> Result<Vec<Summary>, EngineError> {
    let mut entries = load_summaries(db).await?;
    assign_ranks(&mut entries);

    let mut tx = db.pool().begin().await?;
    for entry in &entries {
        sqlx::query(r#"UPDATE "leaderboard" SET "rank" = $2 WHERE "userId" = $1"#)
            .bind(entry.user_id)
            .bind(entry.rank)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(entries)
}

pub async fn load_summaries(db: &Database) -> Result<Vec<Summary>, EngineError> {
    let rows = sqlx::query(
        r#"
        SELECT
          lb."userId", lb."totalPoints", lb."quizzesCompleted", lb."notesUploaded",
          lb."averageScore", lb."rank",
          u."username", u."firstName", u."lastName"
        FROM "leaderboard" lb
        JOIN "users" u ON u."id" = lb."userId"
        "#,
    )
    .fetch_all(db.pool())
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(Summary {
            user_id: row.try_get("userId")?,
            username: row.try_get("username")?,
            first_name: row.try_get("firstName")?,
            last_name: row.try_get("lastName")?,
            total_points: row.try_get("totalPoints")?,
            quizzes_completed: row.try_get("quizzesCompleted")?,
            notes_uploaded: row.try_get("notesUploaded")?,
            average_score: row.try_get("averageScore")?,
            rank: row.try_get("rank")?,
        });
    }
    Ok(entries)
}

#[cfg(test)]
pub(crate) fn summary(user_id: i64, points: i64, avg: f64, quizzes: i64) -> Summary {
    Summary {
        user_id,
        username: format!("user{user_id}"),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        total_points: points,
        quizzes_completed: quizzes,
        notes_uploaded: 0,
        average_score: avg,
        rank: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_points_rank_first() {
        let mut entries = vec![summary(1, 100, 90.0, 5), summary(2, 200, 10.0, 1)];
        assign_ranks(&mut entries);
        assert_eq!(entries[0].user_id, 2);
        assert_eq!(entries[0].rank, Some(1));
        assert_eq!(entries[1].rank, Some(2));
    }

    #[test]
    fn average_score_breaks_point_ties() {
        let mut entries = vec![summary(1, 100, 50.0, 5), summary(2, 100, 75.0, 1)];
        assign_ranks(&mut entries);
        assert_eq!(entries[0].user_id, 2);
    }

    #[test]
    fn quizzes_completed_breaks_remaining_ties() {
        let mut entries = vec![summary(1, 100, 50.0, 3), summary(2, 100, 50.0, 8)];
        assign_ranks(&mut entries);
        assert_eq!(entries[0].user_id, 2);
    }

    #[test]
    fn full_ties_break_by_ascending_user_id() {
        let mut entries = vec![summary(9, 100, 50.0, 3), summary(4, 100, 50.0, 3)];
        assign_ranks(&mut entries);
        assert_eq!(entries[0].user_id, 4);
        assert_eq!(entries[0].rank, Some(1));
        assert_eq!(entries[1].user_id, 9);
        assert_eq!(entries[1].rank, Some(2));
    }

    #[test]
    fn ranks_are_dense_one_based() {
        let mut entries: Vec<_> = (0..10).map(|i| summary(i, i * 7 % 3, 0.0, 0)).collect();
        assign_ranks(&mut entries);
        let ranks: Vec<i64> = entries.iter().filter_map(|e| e.rank).collect();
        assert_eq!(ranks, (1..=10).collect::<Vec<i64>>());
    }

    #[test]
    fn repeated_passes_are_stable() {
        let mut first: Vec<_> = vec![
            summary(3, 10, 20.0, 1),
            summary(1, 10, 20.0, 1),
            summary(2, 30, 5.0, 0),
        ];
        let mut second = first.clone();
        assign_ranks(&mut first);
        assign_ranks(&mut second);
        assert_eq!(first, second);

        // Ranking an already ranked slice changes nothing.
        let third = first.clone();
        assign_ranks(&mut first);
        assert_eq!(first, third);
    }
}
