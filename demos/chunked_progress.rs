//! Chunked matching with a progress-printing scheduler.
//!
//! Run with: cargo run --example chunked_progress

use pub_tracker::{
    fold_events, match_visits_chunked, ChunkScheduler, Pub, Session, TrackerConfig,
};

/// Prints a progress line after every chunk, the way a UI host would drive
/// a progress bar from its event loop.
struct PrintProgress;

impl ChunkScheduler for PrintProgress {
    fn on_chunk(&mut self, completed: usize, total: usize) -> bool {
        println!("  matched {:>5} / {} sessions", completed, total);
        true
    }
}

fn main() {
    env_logger::init();

    let pubs = vec![
        Pub {
            id: "node/1".to_string(),
            latitude: 51.5611,
            longitude: -0.0832,
            name: "The Clissold Arms".to_string(),
            postcode: "N16 9ES".to_string(),
        },
        Pub {
            id: "node/2".to_string(),
            latitude: 51.5598,
            longitude: -0.0755,
            name: "The Rose and Crown".to_string(),
            postcode: String::new(),
        },
    ];

    // A few thousand hour-long sessions; every tenth one sits at a pub
    let sessions: Vec<Session> = (0..3_000)
        .filter_map(|i| {
            let (lat, lon) = if i % 10 == 0 { (51.5611, -0.0832) } else { (51.50, -0.10) };
            let start = 1_700_000_000_000 + i64::from(i) * 7_200_000;
            Session::new(lat, lon, start, start + 3_600_000)
        })
        .collect();

    let config = TrackerConfig::default();

    println!("Matching {} sessions in chunks of {}:", sessions.len(), config.chunk_size);
    let events = match_visits_chunked(&sessions, &pubs, &config, &mut PrintProgress);

    let stats = fold_events(&events, 2023, config.trailing_years);
    println!(
        "\n{} visits at {} distinct pubs",
        events.len(),
        stats.distinct_visited()
    );
}
