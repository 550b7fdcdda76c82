use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::Row;

use crate::db::Database;
use crate::services::error::EngineError;

pub const MIN_SPAN_DAYS: i64 = 1;
pub const MAX_SPAN_DAYS: i64 = 365;

/// One UTC calendar day of activity counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub date: NaiveDate,
    pub notes_created: i64,
    pub quizzes_taken: i64,
    pub quizzes_created: i64,
    pub total_activity: i64,
}

pub fn clamp_span_days(days: i64) -> i64 {
    days.clamp(MIN_SPAN_DAYS, MAX_SPAN_DAYS)
}

/// Buckets activity timestamps into `span_days` UTC calendar days ending at
/// `today`, oldest first. Day boundaries are `[00:00:00Z, 24:00:00Z)`: a
/// record stamped exactly at midnight belongs to the day that starts there.
/// Pure over its inputs, so recomputing with unchanged data yields an
/// identical sequence.
pub fn build_timeline(
    today: NaiveDate,
    span_days: i64,
    notes: &[DateTime<Utc>],
    attempts: &[DateTime<Utc>],
    quizzes: &[DateTime<Utc>],
) -> Vec<DayBucket> {
    let span = clamp_span_days(span_days);
    let start = today - Duration::days(span - 1);

    let mut buckets: Vec<DayBucket> = (0..span)
        .map(|offset| DayBucket {
            date: start + Duration::days(offset),
            notes_created: 0,
            quizzes_taken: 0,
            quizzes_created: 0,
            total_activity: 0,
        })
        .collect();

    let mut tally = |timestamps: &[DateTime<Utc>], pick: fn(&mut DayBucket) -> &mut i64| {
        for ts in timestamps {
            let day = ts.date_naive();
            if day < start || day > today {
                continue;
            }
            let index = (day - start).num_days() as usize;
            *pick(&mut buckets[index]) += 1;
        }
    };

    tally(notes, |bucket| &mut bucket.notes_created);
    tally(attempts, |bucket| &mut bucket.quizzes_taken);
    tally(quizzes, |bucket| &mut bucket.quizzes_created);

    for bucket in &mut buckets {
        bucket.total_activity = bucket.notes_created + bucket.quizzes_taken + bucket.quizzes_created;
    }

    buckets
}

/// Fetches the user's activity timestamps and buckets them per day.
pub async fn timeline(
    db: &Database,
    user_id: i64,
    span_days: i64,
) -> Result<Vec<DayBucket>, EngineError> {
    let span = clamp_span_days(span_days);
    let today = Utc::now().date_naive();
    let window_start = (today - Duration::days(span - 1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid");

    let notes = fetch_timestamps(
        db,
        r#"SELECT "createdAt" AS ts FROM "notes" WHERE "userId" = $1 AND "createdAt" >= $2"#,
        user_id,
        window_start,
    )
    .await?;
    let attempts = fetch_timestamps(
        db,
        r#"SELECT "completedAt" AS ts FROM "quiz_attempts" WHERE "userId" = $1 AND "completedAt" >= $2"#,
        user_id,
        window_start,
    )
    .await?;
    let quizzes = fetch_timestamps(
        db,
        r#"SELECT "createdAt" AS ts FROM "quizzes" WHERE "createdBy" = $1 AND "createdAt" >= $2"#,
        user_id,
        window_start,
    )
    .await?;

    Ok(build_timeline(today, span, &notes, &attempts, &quizzes))
}

async fn fetch_timestamps(
    db: &Database,
    query: &str,
    user_id: i64,
    since: chrono::NaiveDateTime,
) -> Result<Vec<DateTime<Utc>>, EngineError> {
    let rows = sqlx::query(query)
        .bind(user_id)
        .bind(since)
        .fetch_all(db.pool())
        .await?;

    let mut timestamps = Vec::with_capacity(rows.len());
    for row in rows {
        let naive: chrono::NaiveDateTime = row.try_get("ts")?;
        timestamps.push(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }
    Ok(timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(date: &str, time: &str) -> DateTime<Utc> {
        let naive =
            chrono::NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S")
                .unwrap();
        DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
    }

    fn day(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn span_is_clamped_to_bounds() {
        assert_eq!(clamp_span_days(0), 1);
        assert_eq!(clamp_span_days(-5), 1);
        assert_eq!(clamp_span_days(30), 30);
        assert_eq!(clamp_span_days(10_000), 365);
    }

    #[test]
    fn seven_day_span_yields_seven_chronological_buckets() {
        let today = day("2026-03-10");
        let buckets = build_timeline(today, 7, &[], &[], &[]);
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].date, day("2026-03-04"));
        assert_eq!(buckets[6].date, today);
        for pair in buckets.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn totals_sum_the_three_counts() {
        let today = day("2026-03-10");
        let notes = vec![ts("2026-03-09", "08:00:00"), ts("2026-03-09", "09:30:00")];
        let attempts = vec![ts("2026-03-09", "10:00:00")];
        let quizzes = vec![ts("2026-03-09", "11:00:00")];
        let buckets = build_timeline(today, 7, &notes, &attempts, &quizzes);

        let bucket = buckets.iter().find(|b| b.date == day("2026-03-09")).unwrap();
        assert_eq!(bucket.notes_created, 2);
        assert_eq!(bucket.quizzes_taken, 1);
        assert_eq!(bucket.quizzes_created, 1);
        assert_eq!(bucket.total_activity, 4);
        for b in &buckets {
            assert_eq!(
                b.total_activity,
                b.notes_created + b.quizzes_taken + b.quizzes_created
            );
        }
    }

    #[test]
    fn midnight_record_falls_into_the_later_day() {
        let today = day("2026-03-10");
        let attempts = vec![ts("2026-03-08", "00:00:00")];
        let buckets = build_timeline(today, 7, &[], &attempts, &[]);

        let eighth = buckets.iter().find(|b| b.date == day("2026-03-08")).unwrap();
        let seventh = buckets.iter().find(|b| b.date == day("2026-03-07")).unwrap();
        assert_eq!(eighth.quizzes_taken, 1);
        assert_eq!(seventh.quizzes_taken, 0);
    }

    #[test]
    fn records_outside_the_span_are_ignored() {
        let today = day("2026-03-10");
        let notes = vec![ts("2026-02-01", "12:00:00"), ts("2026-03-11", "12:00:00")];
        let buckets = build_timeline(today, 7, &notes, &[], &[]);
        assert!(buckets.iter().all(|b| b.total_activity == 0));
    }

    #[test]
    fn rebuilding_with_same_inputs_is_identical() {
        let today = day("2026-03-10");
        let notes = vec![ts("2026-03-05", "06:00:00")];
        let first = build_timeline(today, 30, &notes, &[], &[]);
        let second = build_timeline(today, 30, &notes, &[], &[]);
        assert_eq!(first, second);
    }
}
