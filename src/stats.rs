// Aggregate progress metrics derived from the memory pool and the
// finalized session history. Nothing here is stored.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::memory::{CardId, MemoryPool};
use crate::session::StudySession;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StudyStats {
    pub due_today: usize,
    pub new_cards: usize,
    pub total_cards: usize,
    pub streak_days: u32,
}

/// Single pass over the candidate set; streak comes from the history.
pub fn get_study_stats(
    candidates: &BTreeSet<CardId>,
    pool: &MemoryPool,
    history: &[StudySession],
    now: DateTime<Utc>,
) -> StudyStats {
    let today = now.date_naive();
    let mut due_today = 0;
    let mut new_cards = 0;
    for id in candidates {
        match pool.get(id) {
            None => new_cards += 1,
            Some(memory) if memory.is_due(today) => due_today += 1,
            Some(_) => {}
        }
    }
    StudyStats {
        due_today,
        new_cards,
        total_cards: candidates.len(),
        streak_days: compute_streak(history, today),
    }
}

/// Consecutive calendar days with at least one finalized, non-empty
/// session, counting back from today. A learner who has not studied yet
/// today keeps the streak earned through yesterday.
pub fn compute_streak(history: &[StudySession], today: NaiveDate) -> u32 {
    let studied_days: BTreeSet<NaiveDate> = history
        .iter()
        .filter(|s| s.is_finalized() && !s.cards_studied.is_empty())
        .map(|s| s.start_time.date_naive())
        .collect();

    let mut day = today;
    if !studied_days.contains(&day) {
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => return 0,
        }
    }

    let mut streak = 0;
    while studied_days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Quality, StudyResult, initialize_card_memory, process_study_result};
    use crate::session::{SessionOptions, create_study_session};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn finalized_session_on(when: DateTime<Utc>) -> StudySession {
        let candidates: BTreeSet<CardId> = ["a".to_string()].into();
        let (mut session, queue) = create_study_session(
            &candidates,
            &MemoryPool::new(),
            &SessionOptions::default(),
            when,
        );
        for id in queue {
            session.record(StudyResult {
                card_id: id,
                quality: Quality::CorrectHard,
                response_time_ms: None,
                studied_at: when,
            });
        }
        session.finalize(when);
        session
    }

    #[test]
    fn counts_partition_the_candidate_set() {
        let candidates: BTreeSet<CardId> =
            ["due", "future", "fresh"].iter().map(|s| s.to_string()).collect();
        let now = at(2025, 6, 10);

        let mut pool = MemoryPool::new();
        let due = StudyResult {
            card_id: "due".into(),
            quality: Quality::CorrectHard,
            response_time_ms: None,
            studied_at: at(2025, 6, 9),
        };
        pool = process_study_result(pool, &due);
        let future = StudyResult {
            card_id: "future".into(),
            quality: Quality::CorrectEasy,
            response_time_ms: None,
            studied_at: at(2025, 6, 9),
        };
        pool = process_study_result(pool, &future);
        // Push "future" past today with a second successful review.
        let future_again = StudyResult {
            card_id: "future".into(),
            quality: Quality::CorrectEasy,
            response_time_ms: None,
            studied_at: at(2025, 6, 10),
        };
        pool = process_study_result(pool, &future_again);

        let stats = get_study_stats(&candidates, &pool, &[], now);
        assert_eq!(stats.total_cards, 3);
        assert_eq!(stats.due_today, 1);
        assert_eq!(stats.new_cards, 1);
        let neither = stats.total_cards - stats.due_today - stats.new_cards;
        assert_eq!(stats.due_today + neither + stats.new_cards, stats.total_cards);
    }

    #[test]
    fn unscheduled_pool_entries_count_as_neither() {
        let candidates: BTreeSet<CardId> = ["blank".to_string()].into();
        let mut pool = MemoryPool::new();
        pool.insert("blank".into(), initialize_card_memory("blank"));
        let stats = get_study_stats(&candidates, &pool, &[], at(2025, 6, 10));
        assert_eq!(stats.due_today, 0);
        assert_eq!(stats.new_cards, 0);
        assert_eq!(stats.total_cards, 1);
    }

    #[test]
    fn streak_counts_back_from_today() {
        let history = vec![
            finalized_session_on(at(2025, 6, 10)),
            finalized_session_on(at(2025, 6, 9)),
            finalized_session_on(at(2025, 6, 8)),
            // gap on June 7
            finalized_session_on(at(2025, 6, 6)),
        ];
        assert_eq!(compute_streak(&history, day(2025, 6, 10)), 3);
    }

    #[test]
    fn streak_survives_an_unstudied_today() {
        let history = vec![
            finalized_session_on(at(2025, 6, 9)),
            finalized_session_on(at(2025, 6, 8)),
        ];
        assert_eq!(compute_streak(&history, day(2025, 6, 10)), 2);
    }

    #[test]
    fn gap_before_yesterday_means_no_streak() {
        let history = vec![finalized_session_on(at(2025, 6, 7))];
        assert_eq!(compute_streak(&history, day(2025, 6, 10)), 0);
    }

    #[test]
    fn unfinalized_and_empty_sessions_do_not_count() {
        let when = at(2025, 6, 10);
        let candidates: BTreeSet<CardId> = ["a".to_string()].into();
        let (abandoned, _) = create_study_session(
            &candidates,
            &MemoryPool::new(),
            &SessionOptions::default(),
            when,
        );

        let mut empty = finalized_session_on(when);
        empty.cards_studied.clear();
        empty.results.clear();

        assert_eq!(compute_streak(&[abandoned, empty], day(2025, 6, 10)), 0);
    }

    #[test]
    fn multiple_sessions_same_day_count_once() {
        let history = vec![
            finalized_session_on(at(2025, 6, 10)),
            finalized_session_on(at(2025, 6, 10)),
        ];
        assert_eq!(compute_streak(&history, day(2025, 6, 10)), 1);
    }

    #[test]
    fn empty_history_gives_zero_streak_in_stats() {
        let stats = get_study_stats(&BTreeSet::new(), &MemoryPool::new(), &[], at(2025, 6, 10));
        assert_eq!(stats.streak_days, 0);
        assert_eq!(stats.total_cards, 0);
    }
}
