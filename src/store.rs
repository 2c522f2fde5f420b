// CSV-backed card store and JSON session history. The scheduler never
// touches files; front ends go through this module for durability.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

use crate::memory::{CardId, CardMemory, INITIAL_EASE, MemoryPool};
use crate::session::StudySession;

/// One CSV row: card content plus the memory columns, which stay blank
/// until the card's first review.
#[derive(Debug, Clone)]
pub struct CardRecord {
    pub deck: String,
    pub front: String,
    pub back: String,
    pub id: String,
    pub memory: Option<CardMemory>,
}

pub struct DeckSummary {
    pub name: String,
    pub total: usize,
    pub due: usize,
    pub new_cards: usize,
}

fn parse_optional_f64(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() { None } else { s.parse().ok() }
}

fn parse_optional_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() { None } else { s.parse().ok() }
}

fn parse_optional_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    }
}

fn parse_optional_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

pub fn load_csv(path: &Path) -> Result<Vec<CardRecord>, String> {
    let default_deck = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;

    let mut cards = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| format!("CSV parse error in {}: {}", path.display(), e))?;

        let deck_raw = get_field(&record, 0);
        let deck = if deck_raw.trim().is_empty() {
            default_deck.clone()
        } else {
            deck_raw
        };

        let id_raw = get_field(&record, 3);
        let id = if id_raw.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            id_raw
        };

        // A row carries memory state only once it has been reviewed.
        let memory = parse_optional_timestamp(&get_field(&record, 8)).map(|last_reviewed_at| {
            CardMemory {
                card_id: id.clone(),
                ease_factor: parse_optional_f64(&get_field(&record, 4)).unwrap_or(INITIAL_EASE),
                interval_days: parse_optional_u32(&get_field(&record, 5)).unwrap_or(1),
                repetitions: parse_optional_u32(&get_field(&record, 6)).unwrap_or(0),
                next_review_date: parse_optional_date(&get_field(&record, 7)),
                last_reviewed_at: Some(last_reviewed_at),
            }
        });

        cards.push(CardRecord {
            deck,
            front: get_field(&record, 1),
            back: get_field(&record, 2),
            id,
            memory,
        });
    }
    Ok(cards)
}

pub fn save_csv(path: &Path, cards: &[CardRecord]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;

    writer
        .write_record([
            "deck",
            "front",
            "back",
            "id",
            "ease_factor",
            "interval_days",
            "repetitions",
            "due",
            "last_review",
        ])
        .map_err(|e| format!("write error: {e}"))?;

    for card in cards {
        let memory = card.memory.as_ref();
        writer
            .write_record([
                &card.deck,
                &card.front,
                &card.back,
                &card.id,
                &memory.map_or(String::new(), |m| format!("{:.3}", m.ease_factor)),
                &memory.map_or(String::new(), |m| m.interval_days.to_string()),
                &memory.map_or(String::new(), |m| m.repetitions.to_string()),
                &memory
                    .and_then(|m| m.next_review_date)
                    .map_or(String::new(), |d| d.format("%Y-%m-%d").to_string()),
                &memory
                    .and_then(|m| m.last_reviewed_at)
                    .map_or(String::new(), |t| t.to_rfc3339()),
            ])
            .map_err(|e| format!("write error: {e}"))?;
    }

    writer.flush().map_err(|e| format!("flush error: {e}"))?;
    Ok(())
}

pub fn discover_files(paths: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for p in paths {
        let path = PathBuf::from(p);
        if path.is_dir() {
            collect_csv_recursive(&path, &mut files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files
}

fn collect_csv_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_csv_recursive(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
}

// -- Projections into the scheduler's inputs --

pub fn memory_pool(cards: &[CardRecord]) -> MemoryPool {
    cards
        .iter()
        .filter_map(|c| c.memory.clone().map(|m| (c.id.clone(), m)))
        .collect()
}

/// Candidate ids, optionally restricted to one deck.
pub fn candidate_ids(cards: &[CardRecord], deck: Option<&str>) -> BTreeSet<CardId> {
    cards
        .iter()
        .filter(|c| deck.is_none_or(|d| c.deck == d))
        .map(|c| c.id.clone())
        .collect()
}

/// Writes updated pool entries back onto the matching rows.
pub fn apply_memory(cards: &mut [CardRecord], pool: &MemoryPool) {
    for card in cards.iter_mut() {
        if let Some(memory) = pool.get(&card.id) {
            card.memory = Some(memory.clone());
        }
    }
}

pub fn deck_summaries(cards: &[CardRecord], today: NaiveDate) -> Vec<DeckSummary> {
    let mut decks: std::collections::BTreeMap<String, (usize, usize, usize)> =
        std::collections::BTreeMap::new();
    for card in cards {
        let entry = decks.entry(card.deck.clone()).or_insert((0, 0, 0));
        entry.0 += 1;
        match &card.memory {
            None => entry.2 += 1,
            Some(memory) if memory.is_due(today) => entry.1 += 1,
            Some(_) => {}
        }
    }
    decks
        .into_iter()
        .map(|(name, (total, due, new_cards))| DeckSummary {
            name,
            total,
            due,
            new_cards,
        })
        .collect()
}

// -- Session history --

pub fn load_history(path: &Path) -> Result<Vec<StudySession>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&data).map_err(|e| format!("bad history in {}: {}", path.display(), e))
}

pub fn append_session(path: &Path, session: &StudySession) -> Result<(), String> {
    let mut history = load_history(path)?;
    history.push(session.clone());
    let data = serde_json::to_string_pretty(&history)
        .map_err(|e| format!("history encode error: {e}"))?;
    std::fs::write(path, data).map_err(|e| format!("failed to write {}: {}", path.display(), e))
}
