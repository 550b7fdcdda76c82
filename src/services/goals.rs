use serde::Serialize;
use sqlx::Row;

use crate::db::Database;
use crate::services::error::EngineError;

const POINTS_LADDER: [i64; 4] = [100, 500, 1000, 2000];
const NOTES_LADDER: [i64; 3] = [10, 25, 50];
const QUIZZES_LADDER: [i64; 3] = [10, 25, 50];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalFamily {
    Points,
    Notes,
    Quizzes,
}

impl GoalFamily {
    fn ladder(self) -> &'static [i64] {
        match self {
            GoalFamily::Points => &POINTS_LADDER,
            GoalFamily::Notes => &NOTES_LADDER,
            GoalFamily::Quizzes => &QUIZZES_LADDER,
        }
    }

    fn title(self, milestone: i64) -> String {
        match self {
            GoalFamily::Points => format!("Reach {milestone} Points"),
            GoalFamily::Notes => format!("Create {milestone} Notes"),
            GoalFamily::Quizzes => format!("Complete {milestone} Quizzes"),
        }
    }

    fn description(self, remaining: i64) -> String {
        match self {
            GoalFamily::Points => format!("Earn {remaining} more points"),
            GoalFamily::Notes => format!("Create {remaining} more notes"),
            GoalFamily::Quizzes => format!("Complete {remaining} more quizzes"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: String,
    pub description: String,
    pub current: i64,
    pub target: i64,
    pub progress: f64,
    pub category: GoalFamily,
}

/// Smallest ladder value strictly greater than `current`. Past the last
/// fixed tier the ladder extends by doubling its final value until it
/// exceeds the current count.
pub fn next_milestone(ladder: &[i64], current: i64) -> i64 {
    if let Some(&tier) = ladder.iter().find(|&&tier| tier > current) {
        return tier;
    }

    let mut milestone = *ladder.last().expect("ladders are non-empty");
    while milestone <= current {
        match milestone.checked_mul(2) {
            Some(next) => milestone = next,
            None => return i64::MAX,
        }
    }
    milestone
}

/// Percentage toward the milestone, capped at 100.
pub fn progress(current: i64, milestone: i64) -> f64 {
    if milestone <= 0 {
        return 100.0;
    }
    (current as f64 / milestone as f64 * 100.0).min(100.0)
}

pub fn goal_for(family: GoalFamily, current: i64) -> Goal {
    let target = next_milestone(family.ladder(), current);
    Goal {
        title: family.title(target),
        description: family.description(target - current),
        current,
        target,
        progress: progress(current, target),
        category: family,
    }
}

/// One goal per tracked metric family, in fixed order: points, notes,
/// quizzes.
pub async fn goals(db: &Database, user_id: i64) -> Result<Vec<Goal>, EngineError> {
    let pool = db.pool();

    let row = sqlx::query(r#"SELECT "points" FROM "users" WHERE "id" = $1"#)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Err(EngineError::NotFound(user_id));
    };
    let points: i64 = row.try_get("points")?;

    let notes: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "notes" WHERE "userId" = $1"#)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let quizzes: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "userId" = $1"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(vec![
        goal_for(GoalFamily::Points, points),
        goal_for(GoalFamily::Notes, notes),
        goal_for(GoalFamily::Quizzes, quizzes),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_notes_targets_ten_at_seventy_percent() {
        let goal = goal_for(GoalFamily::Notes, 7);
        assert_eq!(goal.target, 10);
        assert_eq!(goal.progress, 70.0);
    }

    #[test]
    fn ten_notes_targets_twenty_five_at_forty_percent() {
        let goal = goal_for(GoalFamily::Notes, 10);
        assert_eq!(goal.target, 25);
        assert_eq!(goal.progress, 40.0);
    }

    #[test]
    fn milestone_is_strictly_greater_than_current() {
        assert_eq!(next_milestone(&POINTS_LADDER, 0), 100);
        assert_eq!(next_milestone(&POINTS_LADDER, 99), 100);
        assert_eq!(next_milestone(&POINTS_LADDER, 100), 500);
        assert_eq!(next_milestone(&POINTS_LADDER, 1000), 2000);
    }

    #[test]
    fn ladder_doubles_past_its_last_tier() {
        assert_eq!(next_milestone(&POINTS_LADDER, 2000), 4000);
        assert_eq!(next_milestone(&POINTS_LADDER, 5000), 8000);
        assert_eq!(next_milestone(&NOTES_LADDER, 50), 100);
        assert_eq!(next_milestone(&NOTES_LADDER, 350), 400);
    }

    #[test]
    fn ladder_saturates_at_extreme_totals() {
        assert_eq!(next_milestone(&POINTS_LADDER, i64::MAX - 1), i64::MAX);
        assert_eq!(next_milestone(&POINTS_LADDER, i64::MAX), i64::MAX);

        let goal = goal_for(GoalFamily::Points, i64::MAX - 1);
        assert_eq!(goal.target, i64::MAX);
    }

    #[test]
    fn progress_is_capped_at_one_hundred() {
        assert_eq!(progress(120, 100), 100.0);
        assert_eq!(progress(0, 100), 0.0);
    }

    #[test]
    fn goals_cover_all_three_families_in_order() {
        let families: Vec<GoalFamily> = [
            goal_for(GoalFamily::Points, 0),
            goal_for(GoalFamily::Notes, 0),
            goal_for(GoalFamily::Quizzes, 0),
        ]
        .iter()
        .map(|g| g.category)
        .collect();
        assert_eq!(
            families,
            vec![GoalFamily::Points, GoalFamily::Notes, GoalFamily::Quizzes]
        );
    }
}
