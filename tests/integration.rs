use std::collections::BTreeSet;
use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};

use recall::memory::{CardId, Quality, StudyResult, process_study_result};
use recall::session::{SessionOptions, create_study_session};
use recall::stats::{compute_streak, get_study_stats};
use recall::store;

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
        .and_utc()
}

#[test]
fn full_review_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("biology.csv");

    // User-authored deck, no memory columns yet
    {
        let mut f = std::fs::File::create(&csv_path).unwrap();
        writeln!(
            f,
            "deck,front,back,id,ease_factor,interval_days,repetitions,due,last_review"
        )
        .unwrap();
        writeln!(f, ",What is ATP?,Energy currency of the cell,atp,,,,,").unwrap();
        writeln!(f, ",What is osmosis?,Diffusion of water,osmosis,,,,,").unwrap();
        writeln!(f, ",What is mitosis?,Cell division,mitosis,,,,,").unwrap();
    }

    let mut cards = store::load_csv(&csv_path).unwrap();
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|c| c.memory.is_none()));

    let now = at(2025, 6, 10, 9);
    let candidates = store::candidate_ids(&cards, None);
    let mut pool = store::memory_pool(&cards);

    let (mut session, queue) =
        create_study_session(&candidates, &pool, &SessionOptions::default(), now);
    assert_eq!(queue.len(), 3);

    for id in &queue {
        let result = StudyResult {
            card_id: id.clone(),
            quality: Quality::CorrectHard,
            response_time_ms: Some(1500),
            studied_at: now,
        };
        pool = process_study_result(pool, &result);
        session.record(result);
    }
    session.finalize(at(2025, 6, 10, 10));
    assert_eq!(session.correct_cards, 3);

    store::apply_memory(&mut cards, &pool);
    store::save_csv(&csv_path, &cards).unwrap();

    // Reload: memory survived the round trip, everything is scheduled out
    let reloaded = store::load_csv(&csv_path).unwrap();
    assert!(reloaded.iter().all(|c| c.memory.is_some()));
    for c in &reloaded {
        let memory = c.memory.as_ref().unwrap();
        assert_eq!(memory.repetitions, 1);
        assert_eq!(memory.interval_days, 1);
        assert_eq!(memory.next_review_date, NaiveDate::from_ymd_opt(2025, 6, 11));
    }

    // Same day again: nothing due, nothing new
    let pool = store::memory_pool(&reloaded);
    let (_, queue) = create_study_session(&candidates, &pool, &SessionOptions::default(), now);
    assert!(queue.is_empty());

    // Next morning everything is due again, most stale first
    let (_, queue) = create_study_session(
        &candidates,
        &pool,
        &SessionOptions::default(),
        at(2025, 6, 11, 9),
    );
    assert_eq!(queue.len(), 3);
}

#[test]
fn overdue_cards_lead_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("mixed.csv");
    {
        let mut f = std::fs::File::create(&csv_path).unwrap();
        writeln!(
            f,
            "deck,front,back,id,ease_factor,interval_days,repetitions,due,last_review"
        )
        .unwrap();
        writeln!(
            f,
            "mixed,old question,answer,stale,2.500,3,2,2025-06-05,2025-06-02T08:00:00+00:00"
        )
        .unwrap();
        writeln!(
            f,
            "mixed,newer question,answer,recent,2.650,1,1,2025-06-09,2025-06-08T08:00:00+00:00"
        )
        .unwrap();
        writeln!(f, "mixed,brand new,answer,unseen,,,,,").unwrap();
    }

    let cards = store::load_csv(&csv_path).unwrap();
    let candidates = store::candidate_ids(&cards, Some("mixed"));
    let pool = store::memory_pool(&cards);

    let (_, queue) = create_study_session(
        &candidates,
        &pool,
        &SessionOptions::default(),
        at(2025, 6, 10, 9),
    );
    assert_eq!(queue, vec!["stale", "recent", "unseen"]);

    let stats = get_study_stats(&candidates, &pool, &[], at(2025, 6, 10, 9));
    assert_eq!(stats.due_today, 2);
    assert_eq!(stats.new_cards, 1);
    assert_eq!(stats.total_cards, 3);
}

#[test]
fn session_history_drives_streak() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("sessions.json");

    let candidates: BTreeSet<CardId> = ["card".to_string()].into();

    // One finalized session per evening for three consecutive days
    for day in 8..=10 {
        let when = at(2025, 6, day, 20);
        let (mut session, queue) = create_study_session(
            &candidates,
            &Default::default(),
            &SessionOptions::default(),
            when,
        );
        for id in queue {
            session.record(StudyResult {
                card_id: id,
                quality: Quality::CorrectEasy,
                response_time_ms: Some(2000),
                studied_at: when,
            });
        }
        session.finalize(when);
        store::append_session(&history_path, &session).unwrap();
    }

    let history = store::load_history(&history_path).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(
        compute_streak(&history, NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()),
        3
    );
    // Not studied yet on the 11th: the streak holds through yesterday
    assert_eq!(
        compute_streak(&history, NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()),
        3
    );
    // Skipping a whole day drops it
    assert_eq!(
        compute_streak(&history, NaiveDate::from_ymd_opt(2025, 6, 12).unwrap()),
        0
    );
}

#[test]
fn failed_card_comes_back_tomorrow() {
    let now = at(2025, 6, 10, 9);
    let candidates: BTreeSet<CardId> = ["hard-one".to_string()].into();

    // Learn it, then fail it a week later
    let mut pool = process_study_result(
        Default::default(),
        &StudyResult {
            card_id: "hard-one".into(),
            quality: Quality::CorrectEasy,
            response_time_ms: None,
            studied_at: now,
        },
    );
    pool = process_study_result(
        pool,
        &StudyResult {
            card_id: "hard-one".into(),
            quality: Quality::Incorrect,
            response_time_ms: None,
            studied_at: at(2025, 6, 17, 9),
        },
    );

    let memory = pool.get("hard-one").unwrap();
    assert_eq!(memory.repetitions, 0);
    assert_eq!(memory.interval_days, 1);
    assert_eq!(memory.next_review_date, NaiveDate::from_ymd_opt(2025, 6, 18));

    // Not due on the day of the failure, due again the next day
    let (_, queue) = create_study_session(
        &candidates,
        &pool,
        &SessionOptions::default(),
        at(2025, 6, 17, 10),
    );
    assert!(queue.is_empty());
    let (_, queue) = create_study_session(
        &candidates,
        &pool,
        &SessionOptions::default(),
        at(2025, 6, 18, 9),
    );
    assert_eq!(queue, vec!["hard-one"]);
}
