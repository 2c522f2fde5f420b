use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;

use recall::memory::{self, Quality, StudyResult};
use recall::session::{self, SessionOptions};
use recall::stats;
use recall::store;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: recall <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  drill <paths...> [-n MAX]    Review cards in the terminal");
        eprintln!("  serve <paths...> [-p PORT]   Start web UI (default port 3000)");
        std::process::exit(1);
    }

    match args[1].as_str() {
        "drill" => {
            if args.len() < 3 {
                eprintln!("Usage: recall drill <paths...> [-n MAX]");
                std::process::exit(1);
            }
            let (paths, max_cards) = parse_drill_args(&args[2..]);
            drill(&paths, max_cards);
        }
        "serve" => {
            if args.len() < 3 {
                eprintln!("Usage: recall serve <paths...> [-p PORT]");
                std::process::exit(1);
            }
            let (paths, port) = parse_serve_args(&args[2..]);
            tokio::runtime::Runtime::new()
                .unwrap()
                .block_on(recall::web::serve(paths, port));
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            eprintln!("Commands: drill, serve");
            std::process::exit(1);
        }
    }
}

fn parse_serve_args(args: &[String]) -> (Vec<String>, u16) {
    let mut paths = Vec::new();
    let mut port = 3000u16;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "-p" && i + 1 < args.len() {
            port = args[i + 1].parse().unwrap_or_else(|_| {
                eprintln!("Invalid port: {}", args[i + 1]);
                std::process::exit(1);
            });
            i += 2;
        } else {
            paths.push(args[i].clone());
            i += 1;
        }
    }
    (paths, port)
}

fn parse_drill_args(args: &[String]) -> (Vec<String>, usize) {
    let mut paths = Vec::new();
    let mut max_cards = SessionOptions::default().max_cards;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "-n" && i + 1 < args.len() {
            max_cards = args[i + 1].parse().unwrap_or_else(|_| {
                eprintln!("Invalid card limit: {}", args[i + 1]);
                std::process::exit(1);
            });
            i += 2;
        } else {
            paths.push(args[i].clone());
            i += 1;
        }
    }
    (paths, max_cards)
}

fn drill(paths: &[String], max_cards: usize) {
    let files = store::discover_files(paths);
    if files.is_empty() {
        eprintln!("No CSV files found.");
        std::process::exit(1);
    }

    // Load all cards, tracking source file per card
    let mut all_cards: Vec<store::CardRecord> = Vec::new();
    let mut card_source: Vec<PathBuf> = Vec::new();

    for file in &files {
        match store::load_csv(file) {
            Ok(cards) => {
                for c in cards {
                    card_source.push(file.clone());
                    all_cards.push(c);
                }
            }
            Err(e) => {
                eprintln!("Warning: {e}");
            }
        }
    }

    if all_cards.is_empty() {
        eprintln!("No cards found.");
        std::process::exit(1);
    }

    let history_path = history_path_for(&files);
    let mut history = match store::load_history(&history_path) {
        Ok(history) => history,
        Err(e) => {
            eprintln!("Warning: {e}");
            Vec::new()
        }
    };

    let now = Utc::now();
    let today = now.date_naive();

    // Show deck summaries and overall progress
    let summaries = store::deck_summaries(&all_cards, today);
    println!("Decks:");
    for (i, s) in summaries.iter().enumerate() {
        println!(
            "  {}: {} ({} due / {} new / {} total)",
            i + 1,
            s.name,
            s.due,
            s.new_cards,
            s.total
        );
    }
    println!("  0: All decks");

    let overall = stats::get_study_stats(
        &store::candidate_ids(&all_cards, None),
        &store::memory_pool(&all_cards),
        &history,
        now,
    );
    println!(
        "\n{} due today, {} new, streak {} days\n",
        overall.due_today, overall.new_cards, overall.streak_days
    );

    // Prompt for selection
    let selected_decks = prompt_deck_selection(&summaries);

    let candidates: std::collections::BTreeSet<String> = all_cards
        .iter()
        .filter(|c| selected_decks.is_empty() || selected_decks.contains(&c.deck))
        .map(|c| c.id.clone())
        .collect();

    let mut pool = store::memory_pool(&all_cards);
    let options = SessionOptions {
        max_cards,
        review_card_limit: max_cards,
        ..Default::default()
    };
    let (mut study_session, queue) =
        session::create_study_session(&candidates, &pool, &options, now);

    if queue.is_empty() {
        println!("No cards to review.");
        return;
    }

    println!("{} cards this session.\n", queue.len());

    let index_by_id: HashMap<&str, usize> = all_cards
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    // Drill loop
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    for (i, card_id) in queue.iter().enumerate() {
        let card_idx = index_by_id[card_id.as_str()];
        let card = &all_cards[card_idx];
        println!("[{}/{}] {}", i + 1, queue.len(), card.deck);
        println!();
        println!("{}", card.front);
        println!();

        let shown_at = Instant::now();

        // Wait for Enter to reveal
        print!("Press Enter to reveal...");
        io::stdout().flush().unwrap();
        let mut buf = String::new();
        stdin.read_line(&mut buf).unwrap();

        println!("{}", card.back);
        println!();

        // Keys 1-4 map onto the quality scale worst to best
        let quality = loop {
            print!("Rate (1=wrong, 2=hesitant, 3=good, 4=easy): ");
            io::stdout().flush().unwrap();
            buf.clear();
            stdin.read_line(&mut buf).unwrap();
            if let Ok(n) = buf.trim().parse::<u8>()
                && let Some(q) = n.checked_sub(1).and_then(Quality::from_u8)
            {
                break q;
            }
            println!("Please enter 1, 2, 3, or 4.");
        };

        let result = StudyResult {
            card_id: card_id.clone(),
            quality,
            response_time_ms: Some(shown_at.elapsed().as_millis() as u64),
            studied_at: Utc::now(),
        };
        pool = memory::process_study_result(pool, &result);
        study_session.record(result);
        println!();
    }

    study_session.finalize(Utc::now());
    store::apply_memory(&mut all_cards, &pool);

    // Save all cards back to their source files
    let mut files_to_save: HashMap<PathBuf, Vec<usize>> = HashMap::new();
    for (i, source) in card_source.iter().enumerate() {
        files_to_save.entry(source.clone()).or_default().push(i);
    }

    for (path, indices) in &files_to_save {
        let file_cards: Vec<store::CardRecord> =
            indices.iter().map(|&i| all_cards[i].clone()).collect();
        if let Err(e) = store::save_csv(path, &file_cards) {
            eprintln!("Error saving {}: {e}", path.display());
        }
    }

    if let Err(e) = store::append_session(&history_path, &study_session) {
        eprintln!("Error saving session history: {e}");
    }
    history.push(study_session.clone());

    // Session summary
    let counts = study_session.quality_counts();
    println!("Session complete!");
    println!(
        "  Wrong: {}, Hesitant: {}, Good: {}, Easy: {}",
        counts[0], counts[1], counts[2], counts[3]
    );
    println!(
        "  {} of {} correct",
        study_session.correct_cards,
        study_session.cards_studied.len()
    );
    if let Some(avg) = study_session.average_response_time_ms {
        println!("  Average response: {:.1}s", avg as f64 / 1000.0);
    }
    println!(
        "  Streak: {} days",
        stats::compute_streak(&history, Utc::now().date_naive())
    );
}

fn history_path_for(files: &[PathBuf]) -> PathBuf {
    files
        .first()
        .and_then(|f| f.parent())
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("sessions.json")
}

fn prompt_deck_selection(summaries: &[store::DeckSummary]) -> Vec<String> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    loop {
        print!("Select deck(s) (comma-separated numbers, or 0 for all): ");
        io::stdout().flush().unwrap();
        let mut buf = String::new();
        stdin.read_line(&mut buf).unwrap();

        let mut selected = Vec::new();
        let mut valid = true;

        for part in buf.trim().split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.parse::<usize>() {
                Ok(0) => return Vec::new(), // all decks
                Ok(n) if n >= 1 && n <= summaries.len() => {
                    selected.push(summaries[n - 1].name.clone());
                }
                _ => {
                    valid = false;
                    break;
                }
            }
        }

        if valid && !selected.is_empty() {
            return selected;
        }
        println!("Invalid selection. Try again.");
    }
}
