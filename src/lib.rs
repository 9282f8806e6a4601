//! # Pub Tracker
//!
//! Reconstructs pub visits from a personal location-history export and
//! produces lifetime, yearly and near-home visitation statistics.
//!
//! This library provides:
//! - Normalization of the four known export schemas into location sessions
//! - Dwell- and radius-based matching of sessions against a pub catalog
//! - A single-pass aggregation into lifetime, yearly and near-home views
//! - A plain-text report renderer
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel matching with rayon
//! - **`http`** - Enable HTTP fetching of the pub catalog
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use pub_tracker::{analyze_history, Pub, TrackerConfig};
//!
//! let pubs = vec![Pub {
//!     id: "node/1".to_string(),
//!     latitude: 51.5074,
//!     longitude: -0.1278,
//!     name: "The Lamb".to_string(),
//!     postcode: "WC1N 3LZ".to_string(),
//! }];
//!
//! let raw = br#"{
//!     "timelineObjects": [{
//!         "placeVisit": {
//!             "location": {"latitudeE7": 515074000, "longitudeE7": -1278000},
//!             "duration": {"startTimestampMs": "1704110400000",
//!                          "endTimestampMs": "1704114000000"}
//!         }
//!     }]
//! }"#;
//!
//! let result = analyze_history(raw, &pubs, &TrackerConfig::default(), 2024).unwrap();
//! assert_eq!(result.visit_count, 1);
//! println!("{}", result.report);
//! ```
//!
//! The pipeline is a sequence of pure stages: raw bytes -> [`timeline::normalize`]
//! -> [`matcher::match_visits`] -> [`stats::fold_events`] -> [`report::render_report`].
//! [`analyze_history`] runs them end to end; each stage is public for callers
//! that want to drive them individually (e.g. with a [`ChunkScheduler`] to
//! keep a UI event loop responsive).

use log::info;
use serde::Serialize;

pub mod catalog;
pub mod geo_utils;
pub mod matcher;
pub mod report;
pub mod stats;
pub mod timeline;

pub use catalog::CatalogCache;
pub use matcher::{match_visits, match_visits_chunked, ChunkScheduler, RunToCompletion};
#[cfg(feature = "parallel")]
pub use matcher::match_visits_parallel;
pub use report::render_report;
pub use stats::{fold_events, CurrentYearVisit, PubTally, VisitStats, YearStats};
pub use timeline::normalize;

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort an analysis run. All are fatal: no partial report is
/// produced and nothing is retried. Malformed *individual* records inside an
/// otherwise recognizable document are dropped silently instead.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The input bytes are not parseable JSON.
    #[error("invalid input: {0}")]
    InvalidInput(#[source] serde_json::Error),

    /// The document parsed, but matches none of the known export shapes.
    #[error("unrecognised location-history schema")]
    UnrecognizedSchema,

    /// The pub catalog could not be fetched or parsed.
    #[error("pub catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

// ============================================================================
// Core Types
// ============================================================================

/// A normalized stay at one location, derived from a single history record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub latitude: f64,
    pub longitude: f64,
    /// Start of the stay, epoch milliseconds UTC.
    pub start_ms: i64,
    /// End of the stay, epoch milliseconds UTC.
    pub end_ms: i64,
}

impl Session {
    /// Build a session, enforcing finite coordinates and a strictly positive
    /// duration. Returns `None` for records violating either; normalization
    /// drops those without failing the run.
    pub fn new(latitude: f64, longitude: f64, start_ms: i64, end_ms: i64) -> Option<Self> {
        if latitude.is_finite() && longitude.is_finite() && end_ms > start_ms {
            Some(Self { latitude, longitude, start_ms, end_ms })
        } else {
            None
        }
    }

    /// Length of the stay in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// A catalog entry: one pub with a stable identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pub {
    /// Stable id, unique across the catalog (e.g. an OSM feature id).
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Never empty; falls back to a placeholder when the source has no name.
    pub name: String,
    /// Upper-cased; empty when the source has no postcode tag.
    pub postcode: String,
}

/// One matched visit: a qualifying session resolved to a catalog pub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitEvent {
    pub pub_id: String,
    /// The session's start time, epoch milliseconds UTC.
    pub timestamp_ms: i64,
}

/// Configuration for the visit pipeline.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum stay to count as a visit, in minutes. Sessions strictly
    /// shorter than this are skipped; an exact-threshold stay counts.
    /// Default: 30
    pub dwell_minutes: u32,

    /// Maximum distance from a pub for a session to match, in metres.
    /// Default: 15.0
    pub match_radius_metres: f64,

    /// Reference latitude for the near-home statistics.
    pub home_latitude: f64,

    /// Reference longitude for the near-home statistics.
    pub home_longitude: f64,

    /// Radius of the near-home completion stats, in miles. Default: 2.0
    pub home_radius_miles: f64,

    /// Calendar years covered by the year-by-year summary, ending at the
    /// current year. Default: 5
    pub trailing_years: i32,

    /// Number of pubs in the most-visited list. Default: 10
    pub top_n: usize,

    /// Number of nearest not-yet-visited pubs to list. Default: 20
    pub nearest_unvisited_n: usize,

    /// Sessions matched between scheduler yield points. Default: 500
    pub chunk_size: usize,
}

impl TrackerConfig {
    /// Dwell threshold in milliseconds.
    pub fn dwell_ms(&self) -> i64 {
        i64::from(self.dwell_minutes) * 60_000
    }

    /// Home radius in metres.
    pub fn home_radius_metres(&self) -> f64 {
        self.home_radius_miles * geo_utils::METRES_PER_MILE
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            dwell_minutes: 30,
            match_radius_metres: 15.0,
            home_latitude: 51.554233,
            home_longitude: -0.054368815,
            home_radius_miles: 2.0,
            trailing_years: 5,
            top_n: 10,
            nearest_unvisited_n: 20,
            chunk_size: 500,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Everything one analysis run produces.
#[derive(Debug)]
pub struct AnalysisResult {
    /// Sessions that survived normalization.
    pub session_count: usize,
    /// Visit events matched against the catalog.
    pub visit_count: usize,
    /// The folded aggregate; exposes per-pub visited flags for map markers.
    pub stats: VisitStats,
    /// The rendered plain-text report.
    pub report: String,
}

/// Run the full pipeline on a raw location-history export.
///
/// `current_year` anchors the year-by-year summary and the "visited this
/// year" list; use [`analyze_history_now`] to take it from the UTC clock.
///
/// # Errors
///
/// [`TrackerError::InvalidInput`] when the bytes are not JSON,
/// [`TrackerError::UnrecognizedSchema`] when the document matches no known
/// export shape. An empty (but recognized) document is not an error: the
/// report renders with zero visits.
pub fn analyze_history(
    raw: &[u8],
    pubs: &[Pub],
    config: &TrackerConfig,
    current_year: i32,
) -> Result<AnalysisResult, TrackerError> {
    let doc: serde_json::Value = serde_json::from_slice(raw).map_err(TrackerError::InvalidInput)?;
    let sessions = timeline::normalize(&doc)?;
    let events = matcher::match_visits(&sessions, pubs, config);
    let stats = stats::fold_events(&events, current_year, config.trailing_years);
    let report = report::render_report(&stats, pubs, config);

    info!(
        "analysis complete: {} sessions -> {} visits at {} distinct pubs",
        sessions.len(),
        events.len(),
        stats.distinct_visited()
    );

    Ok(AnalysisResult {
        session_count: sessions.len(),
        visit_count: events.len(),
        stats,
        report,
    })
}

/// [`analyze_history`] anchored to the current UTC calendar year.
pub fn analyze_history_now(
    raw: &[u8],
    pubs: &[Pub],
    config: &TrackerConfig,
) -> Result<AnalysisResult, TrackerError> {
    use chrono::{Datelike, Utc};
    analyze_history(raw, pubs, config, Utc::now().year())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_pub_catalog() -> Vec<Pub> {
        vec![
            Pub {
                id: "A".to_string(),
                latitude: 0.0,
                longitude: 0.0,
                name: "The First".to_string(),
                postcode: String::new(),
            },
            Pub {
                // ~11m east of A at the equator: inside the 15m radius too
                id: "B".to_string(),
                latitude: 0.0,
                longitude: 0.0001,
                name: "The Second".to_string(),
                postcode: String::new(),
            },
        ]
    }

    fn timeline_doc(visits: &[(f64, f64, i64, i64)]) -> Vec<u8> {
        let objects: Vec<_> = visits
            .iter()
            .map(|&(lat, lon, start, end)| {
                json!({
                    "placeVisit": {
                        "location": {
                            "latitudeE7": (lat * 1e7) as i64,
                            "longitudeE7": (lon * 1e7) as i64
                        },
                        "duration": {
                            "startTimestampMs": start.to_string(),
                            "endTimestampMs": end.to_string()
                        }
                    }
                })
            })
            .collect();
        serde_json::to_vec(&json!({ "timelineObjects": objects })).unwrap()
    }

    #[test]
    fn test_invalid_bytes_are_invalid_input() {
        let result = analyze_history(b"not json", &two_pub_catalog(), &TrackerConfig::default(), 2024);
        assert!(matches!(result, Err(TrackerError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_object_is_unrecognized_schema() {
        let result = analyze_history(b"{}", &two_pub_catalog(), &TrackerConfig::default(), 2024);
        assert!(matches!(result, Err(TrackerError::UnrecognizedSchema)));
    }

    #[test]
    fn test_first_catalog_pub_wins_ties() {
        // 40-minute session at the origin. Both pubs are inside the 15m
        // radius; the scan stops at "A", first in catalog order.
        let raw = timeline_doc(&[(0.0, 0.0, 0, 40 * 60_000)]);
        let result =
            analyze_history(&raw, &two_pub_catalog(), &TrackerConfig::default(), 1970).unwrap();
        assert_eq!(result.visit_count, 1);
        assert!(result.stats.visited("A"));
        assert!(!result.stats.visited("B"));
        assert_eq!(result.stats.tally("A").unwrap().first_visit_ms, 0);
    }

    #[test]
    fn test_empty_session_list_renders_zero_report() {
        let raw = serde_json::to_vec(&json!({ "timelineObjects": [] })).unwrap();
        let result =
            analyze_history(&raw, &two_pub_catalog(), &TrackerConfig::default(), 2024).unwrap();
        assert_eq!(result.session_count, 0);
        assert_eq!(result.visit_count, 0);
        assert!(result.report.contains("0 of 2 pubs = 0.00%"));
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let raw = timeline_doc(&[
            (0.0, 0.0, 1_700_000_000_000, 1_700_003_600_000),
            (0.0, 0.001, 1_700_010_000_000, 1_700_013_600_000),
        ]);
        let pubs = two_pub_catalog();
        let config = TrackerConfig::default();
        let first = analyze_history(&raw, &pubs, &config, 2023).unwrap();
        let second = analyze_history(&raw, &pubs, &config, 2023).unwrap();
        assert_eq!(first.report, second.report);
        assert_eq!(first.visit_count, second.visit_count);
    }

    #[test]
    fn test_dwell_threshold_equality_included() {
        let config = TrackerConfig::default();
        // Exactly 30 minutes: included (exclusion is strictly-less-than)
        let raw = timeline_doc(&[(0.0, 0.0, 0, config.dwell_ms())]);
        let result = analyze_history(&raw, &two_pub_catalog(), &config, 1970).unwrap();
        assert_eq!(result.visit_count, 1);

        // One millisecond under: skipped
        let raw = timeline_doc(&[(0.0, 0.0, 0, config.dwell_ms() - 1)]);
        let result = analyze_history(&raw, &two_pub_catalog(), &config, 1970).unwrap();
        assert_eq!(result.visit_count, 0);
    }
}
