// SM-2-style memory model: per-card state plus the pure update function
// applied after every review.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type CardId = String;

/// Snapshot of every reviewed card's memory state, keyed by card id.
/// Cards absent from the pool have never been reviewed.
pub type MemoryPool = BTreeMap<CardId, CardMemory>;

pub const INITIAL_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;

/// Self-reported recall quality for one review, ordered worst to best.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Quality {
    Incorrect,
    CorrectHesitant,
    CorrectHard,
    CorrectEasy,
}

impl Quality {
    pub fn from_u8(n: u8) -> Option<Quality> {
        match n {
            0 => Some(Quality::Incorrect),
            1 => Some(Quality::CorrectHesitant),
            2 => Some(Quality::CorrectHard),
            3 => Some(Quality::CorrectEasy),
            _ => None,
        }
    }
}

/// Ease-factor tuning. The deltas must stay monotonic in quality; the
/// floor at MIN_EASE is applied after every update regardless of values.
#[derive(Clone, Copy, Debug)]
pub struct EasePolicy {
    pub fail_penalty: f64,
    pub hesitant_delta: f64,
    pub hard_delta: f64,
    pub easy_delta: f64,
}

impl EasePolicy {
    pub const DEFAULT: EasePolicy = EasePolicy {
        fail_penalty: 0.2,
        hesitant_delta: -0.15,
        hard_delta: 0.0,
        easy_delta: 0.15,
    };

    fn delta(&self, quality: Quality) -> f64 {
        match quality {
            Quality::Incorrect => -self.fail_penalty,
            Quality::CorrectHesitant => self.hesitant_delta,
            Quality::CorrectHard => self.hard_delta,
            Quality::CorrectEasy => self.easy_delta,
        }
    }
}

impl Default for EasePolicy {
    fn default() -> Self {
        EasePolicy::DEFAULT
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardMemory {
    pub card_id: CardId,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub next_review_date: Option<NaiveDate>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl CardMemory {
    pub fn is_due(&self, today: NaiveDate) -> bool {
        matches!(self.next_review_date, Some(d) if d <= today)
    }
}

/// One review event, as reported by the presentation layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StudyResult {
    pub card_id: CardId,
    pub quality: Quality,
    pub response_time_ms: Option<u64>,
    pub studied_at: DateTime<Utc>,
}

pub fn initialize_card_memory(card_id: &str) -> CardMemory {
    CardMemory {
        card_id: card_id.to_string(),
        ease_factor: INITIAL_EASE,
        interval_days: 0,
        repetitions: 0,
        next_review_date: None,
        last_reviewed_at: None,
    }
}

pub fn calculate_next_review(memory: &CardMemory, quality: Quality, now: DateTime<Utc>) -> CardMemory {
    calculate_next_review_with(memory, quality, now, EasePolicy::DEFAULT)
}

pub fn calculate_next_review_with(
    memory: &CardMemory,
    quality: Quality,
    now: DateTime<Utc>,
    policy: EasePolicy,
) -> CardMemory {
    let today = now.date_naive();
    let ease_factor = (memory.ease_factor + policy.delta(quality)).max(MIN_EASE);

    let (interval_days, repetitions) = if quality == Quality::Incorrect {
        (1, 0)
    } else {
        let interval = if memory.interval_days == 0 {
            1
        } else {
            (memory.interval_days as f64 * ease_factor).round().max(1.0) as u32
        };
        (interval, memory.repetitions + 1)
    };

    CardMemory {
        card_id: memory.card_id.clone(),
        ease_factor,
        interval_days,
        repetitions,
        next_review_date: Some(today + Days::new(interval_days as u64)),
        last_reviewed_at: Some(now),
    }
}

/// Applies one result to the pool, lazily initializing memory for cards
/// reviewed for the first time. Returns the pool with that entry replaced.
pub fn process_study_result(mut pool: MemoryPool, result: &StudyResult) -> MemoryPool {
    let memory = pool
        .remove(&result.card_id)
        .unwrap_or_else(|| initialize_card_memory(&result.card_id));
    let updated = calculate_next_review(&memory, result.quality, result.studied_at);
    pool.insert(result.card_id.clone(), updated);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn init_is_idempotent() {
        assert_eq!(initialize_card_memory("a"), initialize_card_memory("a"));
        let m = initialize_card_memory("a");
        assert_eq!(m.ease_factor, INITIAL_EASE);
        assert_eq!(m.interval_days, 0);
        assert_eq!(m.repetitions, 0);
        assert!(m.next_review_date.is_none());
        assert!(m.last_reviewed_at.is_none());
    }

    #[test]
    fn first_review_schedules_one_day_out() {
        let now = at(2025, 6, 1);
        let next = calculate_next_review(&initialize_card_memory("a"), Quality::CorrectHard, now);
        assert_eq!(next.interval_days, 1);
        assert_eq!(next.repetitions, 1);
        assert_eq!(
            next.next_review_date,
            NaiveDate::from_ymd_opt(2025, 6, 2)
        );
        assert_eq!(next.last_reviewed_at, Some(now));
    }

    #[test]
    fn incorrect_resets_regardless_of_history() {
        let memory = CardMemory {
            card_id: "a".into(),
            ease_factor: 2.8,
            interval_days: 42,
            repetitions: 7,
            next_review_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            last_reviewed_at: Some(at(2025, 4, 20)),
        };
        let next = calculate_next_review(&memory, Quality::Incorrect, at(2025, 6, 1));
        assert_eq!(next.repetitions, 0);
        assert_eq!(next.interval_days, 1);
        assert!((next.ease_factor - 2.6).abs() < 1e-9);
        assert_eq!(
            next.next_review_date,
            NaiveDate::from_ymd_opt(2025, 6, 2)
        );
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let mut memory = CardMemory {
            card_id: "a".into(),
            ease_factor: 1.4,
            interval_days: 10,
            repetitions: 3,
            next_review_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            last_reviewed_at: Some(at(2025, 5, 22)),
        };
        for _ in 0..10 {
            memory = calculate_next_review(&memory, Quality::Incorrect, at(2025, 6, 1));
            assert!(memory.ease_factor >= MIN_EASE);
        }
        assert!((memory.ease_factor - MIN_EASE).abs() < 1e-9);
    }

    #[test]
    fn failed_at_low_ease_hits_floor_exactly() {
        let memory = CardMemory {
            card_id: "y".into(),
            ease_factor: 1.4,
            interval_days: 6,
            repetitions: 3,
            next_review_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            last_reviewed_at: Some(at(2025, 5, 26)),
        };
        let next = calculate_next_review(&memory, Quality::Incorrect, at(2025, 6, 1));
        assert_eq!(next.ease_factor, MIN_EASE);
        assert_eq!(next.interval_days, 1);
        assert_eq!(next.repetitions, 0);
    }

    #[test]
    fn easy_review_grows_interval_and_ease() {
        let memory = CardMemory {
            card_id: "x".into(),
            ease_factor: 2.5,
            interval_days: 6,
            repetitions: 2,
            next_review_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            last_reviewed_at: Some(at(2025, 5, 26)),
        };
        let next = calculate_next_review(&memory, Quality::CorrectEasy, at(2025, 6, 1));
        assert!(next.interval_days > 6);
        assert!(next.ease_factor > 2.5);
        assert_eq!(next.repetitions, 3);
    }

    #[test]
    fn ease_is_monotonic_in_quality() {
        let memory = CardMemory {
            card_id: "a".into(),
            ease_factor: 2.0,
            interval_days: 4,
            repetitions: 2,
            next_review_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            last_reviewed_at: Some(at(2025, 5, 28)),
        };
        let now = at(2025, 6, 1);
        let qualities = [
            Quality::Incorrect,
            Quality::CorrectHesitant,
            Quality::CorrectHard,
            Quality::CorrectEasy,
        ];
        let eases: Vec<f64> = qualities
            .iter()
            .map(|&q| calculate_next_review(&memory, q, now).ease_factor)
            .collect();
        for pair in eases.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn hesitant_shrinks_ease_but_advances() {
        let memory = CardMemory {
            card_id: "a".into(),
            ease_factor: 2.5,
            interval_days: 3,
            repetitions: 1,
            next_review_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            last_reviewed_at: Some(at(2025, 5, 29)),
        };
        let next = calculate_next_review(&memory, Quality::CorrectHesitant, at(2025, 6, 1));
        assert!(next.ease_factor < 2.5);
        assert_eq!(next.repetitions, 2);
        assert!(next.interval_days >= 1);
    }

    #[test]
    fn interval_never_below_one_after_review() {
        let memory = CardMemory {
            card_id: "a".into(),
            ease_factor: 1.3,
            interval_days: 1,
            repetitions: 1,
            next_review_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            last_reviewed_at: Some(at(2025, 5, 31)),
        };
        let next = calculate_next_review(&memory, Quality::CorrectHesitant, at(2025, 6, 1));
        assert!(next.interval_days >= 1);
    }

    #[test]
    fn quality_from_u8_rejects_out_of_range() {
        assert_eq!(Quality::from_u8(0), Some(Quality::Incorrect));
        assert_eq!(Quality::from_u8(3), Some(Quality::CorrectEasy));
        assert_eq!(Quality::from_u8(4), None);
        assert_eq!(Quality::from_u8(255), None);
    }

    #[test]
    fn process_result_initializes_unseen_cards() {
        let pool = MemoryPool::new();
        let result = StudyResult {
            card_id: "fresh".into(),
            quality: Quality::CorrectHard,
            response_time_ms: Some(1800),
            studied_at: at(2025, 6, 1),
        };
        let pool = process_study_result(pool, &result);
        let memory = pool.get("fresh").unwrap();
        assert_eq!(memory.repetitions, 1);
        assert_eq!(memory.interval_days, 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn process_result_replaces_only_that_entry() {
        let mut pool = MemoryPool::new();
        pool.insert("a".into(), initialize_card_memory("a"));
        pool.insert("b".into(), initialize_card_memory("b"));
        let result = StudyResult {
            card_id: "a".into(),
            quality: Quality::CorrectEasy,
            response_time_ms: None,
            studied_at: at(2025, 6, 1),
        };
        let pool = process_study_result(pool, &result);
        assert_eq!(pool.get("a").unwrap().repetitions, 1);
        assert_eq!(pool.get("b").unwrap().repetitions, 0);
    }

    #[test]
    fn custom_policy_is_honored() {
        let policy = EasePolicy {
            fail_penalty: 0.5,
            hesitant_delta: -0.05,
            hard_delta: 0.0,
            easy_delta: 0.3,
        };
        let memory = initialize_card_memory("a");
        let next = calculate_next_review_with(&memory, Quality::CorrectEasy, at(2025, 6, 1), policy);
        assert!((next.ease_factor - 2.8).abs() < 1e-9);
        let failed = calculate_next_review_with(&memory, Quality::Incorrect, at(2025, 6, 1), policy);
        assert!((failed.ease_factor - 2.0).abs() < 1e-9);
    }
}
