//! # Visit Aggregation
//!
//! Folds a chronological stream of [`VisitEvent`]s into the aggregate views
//! the report is built from: lifetime per-pub tallies, a year-by-year
//! summary over a trailing window, and the current year's visit list.
//!
//! Every update is an increment or a max-update, applied in arrival order
//! in a single bounded-memory pass; nothing is retracted or reordered.
//! Events must arrive in session-chronological order for the first-seen
//! values to be meaningful - that is the matcher's output order, and it is
//! a documented precondition here rather than something this module checks.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Utc};
use log::info;
use serde::Serialize;

use crate::{Pub, VisitEvent};

// ============================================================================
// Aggregate Types
// ============================================================================

/// Lifetime tally for one pub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PubTally {
    /// Total visit count, all-time.
    pub visits: u32,
    /// Timestamp of the first visit ever, epoch milliseconds. Set once.
    pub first_visit_ms: i64,
    /// Timestamp of the most recent visit, epoch milliseconds.
    /// Non-decreasing across the fold.
    pub last_visit_ms: i64,
    /// Arrival position of this pub's first visit; breaks visit-count ties
    /// deterministically when ranking.
    first_seen: usize,
}

/// One year's slice of the trailing summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct YearStats {
    pub visits: u32,
    /// Pubs visited for the first time ever during this year.
    pub new_pubs: u32,
}

/// One visit in the current calendar year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentYearVisit {
    pub pub_id: String,
    pub timestamp_ms: i64,
    /// True when this was the first visit to the pub, ever.
    pub first_ever: bool,
}

/// The folded aggregate state for one run.
///
/// Owned exclusively by the fold that builds it; afterwards it is read-only
/// input to the report renderer (and to map-marker rendering via
/// [`VisitStats::visited`]).
#[derive(Debug, Clone, PartialEq)]
pub struct VisitStats {
    tallies: HashMap<String, PubTally>,
    /// Pub ids in first-visit order.
    arrival: Vec<String>,
    /// Pre-seeded with every year of the trailing window, so the summary
    /// renders a line even for zero-visit years.
    per_year: BTreeMap<i32, YearStats>,
    visits_this_year: Vec<CurrentYearVisit>,
    current_year: i32,
}

impl VisitStats {
    /// Empty state for a trailing window ending at `current_year`.
    pub fn new(current_year: i32, trailing_years: i32) -> Self {
        let window = trailing_years.max(1);
        let per_year = (current_year - window + 1..=current_year)
            .map(|year| (year, YearStats::default()))
            .collect();
        Self {
            tallies: HashMap::new(),
            arrival: Vec::new(),
            per_year,
            visits_this_year: Vec::new(),
            current_year,
        }
    }

    /// Apply one event. Increments and max-updates only.
    pub fn record(&mut self, event: &VisitEvent) {
        let first_ever = !self.tallies.contains_key(&event.pub_id);
        let next_index = self.arrival.len();

        let tally = self.tallies.entry(event.pub_id.clone()).or_insert(PubTally {
            visits: 0,
            first_visit_ms: event.timestamp_ms,
            last_visit_ms: event.timestamp_ms,
            first_seen: next_index,
        });
        tally.visits += 1;
        tally.last_visit_ms = tally.last_visit_ms.max(event.timestamp_ms);
        if first_ever {
            self.arrival.push(event.pub_id.clone());
        }

        let Some(year) = utc_year(event.timestamp_ms) else {
            // Timestamp outside the representable calendar range: it still
            // counted toward the lifetime tallies above
            return;
        };
        if let Some(bucket) = self.per_year.get_mut(&year) {
            bucket.visits += 1;
            if first_ever {
                bucket.new_pubs += 1;
            }
        }
        if year == self.current_year {
            self.visits_this_year.push(CurrentYearVisit {
                pub_id: event.pub_id.clone(),
                timestamp_ms: event.timestamp_ms,
                first_ever,
            });
        }
    }

    /// The year the fold was anchored to.
    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    /// Number of distinct pubs visited.
    pub fn distinct_visited(&self) -> usize {
        self.arrival.len()
    }

    /// Whether this pub collected at least one visit. Drives the
    /// visited/unvisited map markers as well as the report.
    pub fn visited(&self, pub_id: &str) -> bool {
        self.tallies.contains_key(pub_id)
    }

    /// Lifetime tally for one pub, if visited.
    pub fn tally(&self, pub_id: &str) -> Option<&PubTally> {
        self.tallies.get(pub_id)
    }

    /// Total visits across all pubs.
    pub fn total_visits(&self) -> u32 {
        self.tallies.values().map(|t| t.visits).sum()
    }

    /// Visited pubs by count descending; ties keep first-visit order.
    pub fn ranked(&self) -> Vec<(&str, &PubTally)> {
        let mut out: Vec<(&str, &PubTally)> =
            self.arrival.iter().map(|id| (id.as_str(), &self.tallies[id])).collect();
        // Stable sort over arrival order gives the deterministic tie-break
        out.sort_by(|a, b| b.1.visits.cmp(&a.1.visits));
        out
    }

    /// The trailing-window summary, years ascending.
    pub fn year_summary(&self) -> impl Iterator<Item = (i32, &YearStats)> {
        self.per_year.iter().map(|(year, stats)| (*year, stats))
    }

    /// Visits recorded in the current year, in arrival order.
    pub fn visits_this_year(&self) -> &[CurrentYearVisit] {
        &self.visits_this_year
    }

    /// Visited flag per catalog entry, in catalog order - the byproduct map
    /// hosts use to colour markers.
    pub fn marker_flags(&self, pubs: &[Pub]) -> Vec<bool> {
        pubs.iter().map(|p| self.visited(&p.id)).collect()
    }
}

/// UTC calendar year of an epoch-millisecond timestamp.
fn utc_year(timestamp_ms: i64) -> Option<i32> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|dt| dt.year())
}

/// Fold an ordered event stream into a fresh [`VisitStats`].
pub fn fold_events(events: &[VisitEvent], current_year: i32, trailing_years: i32) -> VisitStats {
    let mut stats = VisitStats::new(current_year, trailing_years);
    for event in events {
        stats.record(event);
    }
    info!(
        "folded {} events into {} distinct pubs",
        events.len(),
        stats.distinct_visited()
    );
    stats
}

// ============================================================================
// Tests
// ============================================================================
