//! # Visit Matching
//!
//! Resolves normalized sessions against the pub catalog, producing one
//! [`VisitEvent`] per qualifying session.
//!
//! A session qualifies when its duration reaches the dwell threshold
//! (strictly shorter stays are skipped; an exact-threshold stay counts).
//! The catalog is scanned in its given order and the *first* pub strictly
//! inside the match radius wins; the scan stops there, so a session
//! contributes at most one event even when several pubs are in range.
//! First-in-catalog-order, not nearest: reordering the catalog can change
//! which of two overlapping pubs collects the visit, and that ordering is
//! part of the contract because historical reports depend on it.
//!
//! The scan is O(sessions x catalog) with a cheap squared-distance test per
//! candidate; at tens of thousands of sessions against a national pub list
//! this is well under a second, so no spatial index is used.
//!
//! ## Chunked scheduling
//!
//! [`match_visits_chunked`] processes sessions in fixed-size chunks and
//! calls a [`ChunkScheduler`] between chunks, giving interactive hosts a
//! yield point (and a cancellation point). Chunking never changes the
//! result: matching is per-session, so any chunk size produces the same
//! event sequence as a single pass.

use log::{debug, info};

use crate::geo_utils::squared_distance_metres;
use crate::{Pub, Session, TrackerConfig, VisitEvent};

// ============================================================================
// Scheduling
// ============================================================================

/// Yield point between chunks of matching work.
///
/// Interactive hosts implement this to update a progress indicator or hand
/// control back to an event loop; batch callers use [`RunToCompletion`].
pub trait ChunkScheduler {
    /// Called after each chunk with cumulative progress. Return `false` to
    /// cancel the remaining work; events from completed chunks are kept and
    /// no chunk is ever left half-applied.
    fn on_chunk(&mut self, completed: usize, total: usize) -> bool;
}

/// Scheduler that never yields and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunToCompletion;

impl ChunkScheduler for RunToCompletion {
    fn on_chunk(&mut self, _completed: usize, _total: usize) -> bool {
        true
    }
}

// ============================================================================
// Matching
// ============================================================================

/// Match one session, if it qualifies.
fn match_session(
    session: &Session,
    pubs: &[Pub],
    dwell_ms: i64,
    radius_sq: f64,
) -> Option<VisitEvent> {
    if session.duration_ms() < dwell_ms {
        return None;
    }
    pubs.iter()
        .find(|p| {
            squared_distance_metres(session.latitude, session.longitude, p.latitude, p.longitude)
                < radius_sq
        })
        .map(|p| VisitEvent { pub_id: p.id.clone(), timestamp_ms: session.start_ms })
}

/// Match all sessions in a single pass.
///
/// Events come out in session order, which the aggregator relies on for its
/// first-seen semantics.
pub fn match_visits(sessions: &[Session], pubs: &[Pub], config: &TrackerConfig) -> Vec<VisitEvent> {
    match_visits_chunked(sessions, pubs, config, &mut RunToCompletion)
}

/// Match sessions in chunks of `config.chunk_size`, yielding to `scheduler`
/// between chunks.
pub fn match_visits_chunked(
    sessions: &[Session],
    pubs: &[Pub],
    config: &TrackerConfig,
    scheduler: &mut dyn ChunkScheduler,
) -> Vec<VisitEvent> {
    let dwell_ms = config.dwell_ms();
    let radius_sq = config.match_radius_metres * config.match_radius_metres;
    let chunk_size = config.chunk_size.max(1);

    let mut events = Vec::new();
    let mut completed = 0usize;

    for chunk in sessions.chunks(chunk_size) {
        events.extend(chunk.iter().filter_map(|s| match_session(s, pubs, dwell_ms, radius_sq)));
        completed += chunk.len();
        if !scheduler.on_chunk(completed, sessions.len()) {
            debug!("matching cancelled after {} of {} sessions", completed, sessions.len());
            break;
        }
    }

    info!(
        "matched {} visits from {} sessions against {} pubs",
        events.len(),
        completed,
        pubs.len()
    );
    events
}

/// Parallel matcher. Output order is identical to [`match_visits`]: rayon's
/// collect preserves input order, so the aggregator sees the same event
/// sequence either way.
#[cfg(feature = "parallel")]
pub fn match_visits_parallel(
    sessions: &[Session],
    pubs: &[Pub],
    config: &TrackerConfig,
) -> Vec<VisitEvent> {
    use rayon::prelude::*;

    let dwell_ms = config.dwell_ms();
    let radius_sq = config.match_radius_metres * config.match_radius_metres;

    let events: Vec<VisitEvent> = sessions
        .par_iter()
        .filter_map(|s| match_session(s, pubs, dwell_ms, radius_sq))
        .collect();

    info!(
        "matched {} visits from {} sessions against {} pubs (parallel)",
        events.len(),
        sessions.len(),
        pubs.len()
    );
    events
}

// ============================================================================
// Tests
// ============================================================================
