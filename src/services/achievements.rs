use chrono::{Duration, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::services::error::EngineError;

/// Metric a rule family is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementMetric {
    Points,
    NotesCreated,
    QuizzesCompleted,
    PerfectScores,
    WeeklyActivity,
}

#[derive(Debug, Clone, Copy)]
pub struct AchievementRule {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub metric: AchievementMetric,
    pub threshold: i64,
}

/// Fixed rule table, ordered by metric then ascending threshold. Within one
/// metric only the highest satisfied tier is reported.
pub const RULES: [AchievementRule; 7] = [
    AchievementRule {
        id: "point_collector",
        title: "Point Collector",
        description: "Earned 500+ points",
        icon: "🥉",
        metric: AchievementMetric::Points,
        threshold: 500,
    },
    AchievementRule {
        id: "point_master",
        title: "Point Master",
        description: "Earned 1000+ points",
        icon: "🏆",
        metric: AchievementMetric::Points,
        threshold: 1000,
    },
    AchievementRule {
        id: "note_taker",
        title: "Note Taker",
        description: "Created 10+ notes",
        icon: "📝",
        metric: AchievementMetric::NotesCreated,
        threshold: 10,
    },
    AchievementRule {
        id: "note_taking_pro",
        title: "Note Taking Pro",
        description: "Created 50+ notes",
        icon: "📚",
        metric: AchievementMetric::NotesCreated,
        threshold: 50,
    },
    AchievementRule {
        id: "quiz_enthusiast",
        title: "Quiz Enthusiast",
        description: "Completed 25+ quizzes",
        icon: "🎯",
        metric: AchievementMetric::QuizzesCompleted,
        threshold: 25,
    },
    AchievementRule {
        id: "quiz_master",
        title: "Quiz Master",
        description: "Completed 100+ quizzes",
        icon: "🧠",
        metric: AchievementMetric::QuizzesCompleted,
        threshold: 100,
    },
    AchievementRule {
        id: "perfectionist",
        title: "Perfectionist",
        description: "Achieved 5+ perfect quiz scores",
        icon: "⭐",
        metric: AchievementMetric::PerfectScores,
        threshold: 5,
    },
];

pub const WEEKLY_WARRIOR: AchievementRule = AchievementRule {
    id: "weekly_warrior",
    title: "Weekly Warrior",
    description: "Active for 7 days straight",
    icon: "🔥",
    metric: AchievementMetric::WeeklyActivity,
    threshold: 7,
};

/// Current counts an evaluation runs against. Derived entirely from stored
/// records; nothing about achievements is persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AchievementInputs {
    pub points: i64,
    pub notes_created: i64,
    pub quizzes_completed: i64,
    pub perfect_scores: i64,
    /// Quiz attempts in the trailing 7 days.
    pub recent_activity: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub earned: bool,
}

impl From<&AchievementRule> for Achievement {
    fn from(rule: &AchievementRule) -> Self {
        Achievement {
            id: rule.id,
            title: rule.title,
            description: rule.description,
            icon: rule.icon,
            earned: true,
        }
    }
}

/// Pure, idempotent evaluation: the satisfied subset of the rule table,
/// highest tier per metric family only.
pub fn evaluate(inputs: &AchievementInputs) -> Vec<Achievement> {
    let mut earned: Vec<Achievement> = Vec::new();

    for metric in [
        AchievementMetric::Points,
        AchievementMetric::NotesCreated,
        AchievementMetric::QuizzesCompleted,
        AchievementMetric::PerfectScores,
    ] {
        let best = RULES
            .iter()
            .filter(|rule| rule.metric == metric && metric_value(inputs, metric) >= rule.threshold)
            .max_by_key(|rule| rule.threshold);
        if let Some(rule) = best {
            earned.push(rule.into());
        }
    }

    if inputs.recent_activity >= WEEKLY_WARRIOR.threshold {
        earned.push((&WEEKLY_WARRIOR).into());
    }

    earned
}

fn metric_value(inputs: &AchievementInputs, metric: AchievementMetric) -> i64 {
    match metric {
        AchievementMetric::Points => inputs.points,
        AchievementMetric::NotesCreated => inputs.notes_created,
        AchievementMetric::QuizzesCompleted => inputs.quizzes_completed,
        AchievementMetric::PerfectScores => inputs.perfect_scores,
        AchievementMetric::WeeklyActivity => inputs.recent_activity,
    }
}

/// Gathers the derived counts for a user and evaluates the rule table.
pub async fn achievements(db: &Database, user_id: i64) -> Result<Vec<Achievement>, EngineError> {
    let inputs = load_inputs(db, user_id).await?;
    Ok(evaluate(&inputs))
}

pub async fn load_inputs(db: &Database, user_id: i64) -> Result<AchievementInputs, EngineError> {
    let pool = db.pool();

    let points: Option<i64> = sqlx::query_scalar(r#"SELECT "points" FROM "users" WHERE "id" = $1"#)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(points) = points else {
        return Err(EngineError::NotFound(user_id));
    };

    let notes_created: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "notes" WHERE "userId" = $1"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    let quizzes_completed: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "userId" = $1"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    let perfect_scores: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "userId" = $1 AND "score" = "totalQuestions""#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let week_ago = (Utc::now() - Duration::days(7)).naive_utc();
    let recent_activity: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "userId" = $1 AND "completedAt" >= $2"#,
    )
    .bind(user_id)
    .bind(week_ago)
    .fetch_one(pool)
    .await?;

    Ok(AchievementInputs {
        points,
        notes_created,
        quizzes_completed,
        perfect_scores,
        recent_activity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(achievements: &[Achievement]) -> Vec<&'static str> {
        achievements.iter().map(|a| a.id).collect()
    }

    #[test]
    fn nothing_earned_with_no_activity() {
        assert!(evaluate(&AchievementInputs::default()).is_empty());
    }

    #[test]
    fn only_highest_point_tier_is_reported() {
        let inputs = AchievementInputs {
            points: 1200,
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(&inputs)), vec!["point_master"]);

        let inputs = AchievementInputs {
            points: 700,
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(&inputs)), vec!["point_collector"]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let inputs = AchievementInputs {
            notes_created: 10,
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(&inputs)), vec!["note_taker"]);

        let inputs = AchievementInputs {
            notes_created: 9,
            ..Default::default()
        };
        assert!(evaluate(&inputs).is_empty());
    }

    #[test]
    fn families_are_evaluated_independently() {
        let inputs = AchievementInputs {
            points: 1500,
            notes_created: 60,
            quizzes_completed: 30,
            perfect_scores: 5,
            recent_activity: 8,
        };
        assert_eq!(
            ids(&evaluate(&inputs)),
            vec![
                "point_master",
                "note_taking_pro",
                "quiz_enthusiast",
                "perfectionist",
                "weekly_warrior",
            ]
        );
    }

    #[test]
    fn evaluation_is_idempotent() {
        let inputs = AchievementInputs {
            points: 501,
            quizzes_completed: 25,
            ..Default::default()
        };
        let first = ids(&evaluate(&inputs));
        let second = ids(&evaluate(&inputs));
        assert_eq!(first, second);
    }
}
