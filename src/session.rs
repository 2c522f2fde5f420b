// Session composition: turns the candidate pool into a bounded, ordered
// review queue and tracks the sitting from first card to finalization.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{CardId, MemoryPool, Quality, StudyResult};

#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub max_cards: usize,
    pub new_card_limit: usize,
    pub review_card_limit: usize,
    pub include_new_cards: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            max_cards: 20,
            new_card_limit: 10,
            review_card_limit: 20,
            include_new_cards: true,
        }
    }
}

/// One sitting. Mutable while the learner works through the queue,
/// immutable once finalized.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StudySession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub cards_studied: Vec<CardId>,
    pub results: Vec<StudyResult>,
    pub total_cards: usize,
    pub correct_cards: usize,
    pub session_duration_ms: Option<u64>,
    pub average_response_time_ms: Option<u64>,
}

impl StudySession {
    fn begin(total_cards: usize, now: DateTime<Utc>) -> StudySession {
        StudySession {
            session_id: uuid::Uuid::new_v4().to_string(),
            start_time: now,
            end_time: None,
            cards_studied: Vec::new(),
            results: Vec::new(),
            total_cards,
            correct_cards: 0,
            session_duration_ms: None,
            average_response_time_ms: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Appends one review. Ignored once the session is finalized.
    pub fn record(&mut self, result: StudyResult) {
        if self.is_finalized() {
            return;
        }
        if result.quality >= Quality::CorrectHard {
            self.correct_cards += 1;
        }
        self.cards_studied.push(result.card_id.clone());
        self.results.push(result);
    }

    /// Closes the session and computes duration and response-time averages.
    /// Ignored if already finalized.
    pub fn finalize(&mut self, now: DateTime<Utc>) {
        if self.is_finalized() {
            return;
        }
        self.end_time = Some(now);
        self.session_duration_ms = Some((now - self.start_time).num_milliseconds().max(0) as u64);

        let times: Vec<u64> = self.results.iter().filter_map(|r| r.response_time_ms).collect();
        if !times.is_empty() {
            self.average_response_time_ms = Some(times.iter().sum::<u64>() / times.len() as u64);
        }
    }

    /// Tally of recorded results per quality level, worst to best.
    pub fn quality_counts(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for result in &self.results {
            counts[result.quality as usize] += 1;
        }
        counts
    }
}

/// Composes the review queue for one sitting: due cards first, most
/// overdue leading, then new cards up to the configured limits. An empty
/// queue is a legal result the caller must branch on.
pub fn create_study_session(
    candidates: &BTreeSet<CardId>,
    pool: &MemoryPool,
    options: &SessionOptions,
    now: DateTime<Utc>,
) -> (StudySession, Vec<CardId>) {
    let today = now.date_naive();

    let mut due: Vec<(NaiveDate, &CardId)> = Vec::new();
    let mut fresh: Vec<&CardId> = Vec::new();
    for id in candidates {
        match pool.get(id) {
            None => fresh.push(id),
            Some(memory) => {
                // Pool entries without a scheduled date are neither due nor new.
                if let Some(date) = memory.next_review_date
                    && date <= today
                {
                    due.push((date, id));
                }
            }
        }
    }

    due.sort();

    let mut queue: Vec<CardId> = due
        .into_iter()
        .take(options.review_card_limit.min(options.max_cards))
        .map(|(_, id)| id.clone())
        .collect();

    if options.include_new_cards {
        let room = options
            .max_cards
            .saturating_sub(queue.len())
            .min(options.new_card_limit);
        queue.extend(fresh.into_iter().take(room).cloned());
    }

    (StudySession::begin(queue.len(), now), queue)
}
