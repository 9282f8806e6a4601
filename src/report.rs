//! # Report Rendering
//!
//! Turns a folded [`VisitStats`] into the fixed plain-text report.
//!
//! Formatting contracts:
//! - Percentages always carry two decimals; a zero denominator renders
//!   `0.00` rather than dividing.
//! - Dates are UTC calendar days, `YYYY-MM-DD`, no time of day.
//! - Count-descending lists break ties by first-visit order (stable, so two
//!   runs over the same input render byte-identical reports).
//! - Near-home distances are miles with two decimals, measured with the
//!   same planar approximation the matcher uses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::geo_utils::{distance_miles, squared_distance_metres};
use crate::stats::VisitStats;
use crate::{Pub, TrackerConfig};

/// Render the full report.
///
/// Unknown pub ids in `stats` (possible when stats and catalog come from
/// different sources) are omitted from the name-bearing sections rather
/// than invented.
pub fn render_report(stats: &VisitStats, pubs: &[Pub], config: &TrackerConfig) -> String {
    let by_id: HashMap<&str, &Pub> = pubs.iter().map(|p| (p.id.as_str(), p)).collect();
    let ranked = stats.ranked();

    // Top-N by visits
    let top_lines: Vec<String> = ranked
        .iter()
        .filter_map(|(id, tally)| by_id.get(id).map(|p| (*p, tally)))
        .take(config.top_n)
        .enumerate()
        .map(|(i, (p, tally))| format!(" {}. {} – {}", i + 1, labelled(p), tally.visits))
        .collect();

    // This year's visits, chronological
    let mut this_year = stats.visits_this_year().to_vec();
    this_year.sort_by_key(|v| v.timestamp_ms);
    let year_lines: Vec<String> = this_year
        .iter()
        .filter_map(|v| by_id.get(v.pub_id.as_str()).map(|p| (*p, v)))
        .map(|(p, v)| {
            let mark = if v.first_ever { " [first time!]" } else { "" };
            format!("• {} – {}{}", p.name, format_date(v.timestamp_ms), mark)
        })
        .collect();

    // Trailing-window summary, years ascending
    let summary_lines: Vec<String> = stats
        .year_summary()
        .map(|(year, s)| format!("{}: {} visits, {} new pubs", year, s.visits, s.new_pubs))
        .collect();

    // Near-home breakdown
    let home_radius_sq = config.home_radius_metres() * config.home_radius_metres();
    let nearby: Vec<&Pub> = pubs
        .iter()
        .filter(|p| {
            squared_distance_metres(
                config.home_latitude,
                config.home_longitude,
                p.latitude,
                p.longitude,
            ) < home_radius_sq
        })
        .collect();
    let visited_nearby = nearby.iter().filter(|p| stats.visited(&p.id)).count();

    let mut unvisited_nearby: Vec<(&Pub, f64)> = nearby
        .iter()
        .filter(|p| !stats.visited(&p.id))
        .map(|p| {
            let miles = distance_miles(
                config.home_latitude,
                config.home_longitude,
                p.latitude,
                p.longitude,
            );
            (*p, miles)
        })
        .collect();
    unvisited_nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
    let unvisited_lines: Vec<String> = unvisited_nearby
        .iter()
        .take(config.nearest_unvisited_n)
        .enumerate()
        .map(|(i, (p, miles))| format!(" {}. {} – {:.2} mi", i + 1, labelled(p), miles))
        .collect();

    // All-time list, count descending
    let all_time_lines: Vec<String> = ranked
        .iter()
        .filter_map(|(id, tally)| by_id.get(id).map(|p| (*p, tally)))
        .map(|(p, tally)| {
            format!("• {} – {} ({})", labelled(p), tally.visits, format_date(tally.last_visit_ms))
        })
        .collect();

    let mut report = String::new();
    report.push_str(&format!(
        "📊 Overall visited:\n• {} of {} pubs = {}%\n\n",
        stats.distinct_visited(),
        pubs.len(),
        percentage(stats.distinct_visited(), pubs.len())
    ));
    report.push_str(&format!(
        "🍺 Top-{} pubs by visits:\n{}\n\n",
        config.top_n,
        top_lines.join("\n")
    ));
    report.push_str(&format!(
        "📆 Pubs visited in {}:\n{}\n\n",
        stats.current_year(),
        if year_lines.is_empty() { " none".to_string() } else { year_lines.join("\n") }
    ));
    report.push_str(&format!(
        "📅 Last {} years summary:\n{}\n\n",
        config.trailing_years,
        summary_lines.join("\n")
    ));
    report.push_str(&format!(
        "🏠 Within {} mi of home:\n• {}/{} pubs = {}%\n\n",
        config.home_radius_miles,
        visited_nearby,
        nearby.len(),
        percentage(visited_nearby, nearby.len())
    ));
    report.push_str(&format!(
        "🔎 {} closest not-yet-visited:\n{}\n\n",
        config.nearest_unvisited_n,
        unvisited_lines.join("\n")
    ));
    report.push_str(&format!(
        "📚 All-time pubs sorted by visits:\n{}",
        all_time_lines.join("\n")
    ));
    report
}

/// `Name (POSTCODE)`, or just the name when no postcode is known.
fn labelled(p: &Pub) -> String {
    if p.postcode.is_empty() {
        p.name.clone()
    } else {
        format!("{} ({})", p.name, p.postcode)
    }
}

/// Two-decimal percentage; `0.00` when the denominator is zero.
fn percentage(numerator: usize, denominator: usize) -> String {
    if denominator == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", numerator as f64 / denominator as f64 * 100.0)
}

/// UTC calendar day of an epoch-millisecond timestamp.
fn format_date(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "????-??-??".to_string())
}

// ============================================================================
// Tests
// ============================================================================
