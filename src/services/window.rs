use crate::services::error::EngineError;
use crate::services::stats::Summary;

/// Bounded neighborhood around a user's rank, taken from a rank-ordered
/// snapshot slice. Returns ranks `[max(1, r - radius), r + radius]` in
/// ascending order; `NotFound` when the user has no summary.
pub fn nearby(entries: &[Summary], user_id: i64, radius: i64) -> Result<Vec<Summary>, EngineError> {
    let rank = entries
        .iter()
        .find(|entry| entry.user_id == user_id)
        .and_then(|entry| entry.rank)
        .ok_or(EngineError::NotFound(user_id))?;

    let low = (rank - radius).max(1);
    let high = rank + radius;

    let mut window: Vec<Summary> = entries
        .iter()
        .filter(|entry| entry.rank.map(|r| r >= low && r <= high).unwrap_or(false))
        .cloned()
        .collect();
    window.sort_by_key(|entry| entry.rank);
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rank::{assign_ranks, summary};

    fn ranked(count: i64) -> Vec<Summary> {
        // user i has points 10*(count - i), so user 1 is rank 1.
        let mut entries: Vec<_> = (1..=count)
            .map(|i| summary(i, 10 * (count - i + 1), 0.0, 0))
            .collect();
        assign_ranks(&mut entries);
        entries
    }

    #[test]
    fn middle_rank_window_is_symmetric() {
        let entries = ranked(10);
        let window = nearby(&entries, 5, 2).unwrap();
        let ranks: Vec<i64> = window.iter().filter_map(|e| e.rank).collect();
        assert_eq!(ranks, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn window_clamps_at_rank_one() {
        let entries = ranked(10);
        let window = nearby(&entries, 1, 2).unwrap();
        let ranks: Vec<i64> = window.iter().filter_map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn window_truncates_past_last_rank() {
        let entries = ranked(10);
        let window = nearby(&entries, 10, 2).unwrap();
        let ranks: Vec<i64> = window.iter().filter_map(|e| e.rank).collect();
        assert_eq!(ranks, vec![8, 9, 10]);
    }

    #[test]
    fn zero_radius_returns_only_the_user() {
        let entries = ranked(5);
        let window = nearby(&entries, 3, 0).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].user_id, 3);
    }

    #[test]
    fn unknown_user_is_not_found() {
        let entries = ranked(3);
        assert!(matches!(
            nearby(&entries, 99, 2),
            Err(EngineError::NotFound(99))
        ));
    }
}
