//! # Timeline Normalization
//!
//! Converts a parsed location-history export into a flat, ordered list of
//! [`Session`]s, whichever of the four known export generations produced it.
//!
//! ## Schema Detection
//!
//! The shapes are tried in a fixed priority order and are mutually
//! exclusive; the first match wins:
//!
//! | Priority | Shape | Coordinates | Timestamps |
//! |----------|-------|-------------|------------|
//! | 1 | `timelineObjects[].placeVisit` | E7 integers | epoch ms, string or number |
//! | 2 | `locations[]` raw pings | E7 integers | single epoch ms |
//! | 3 | `semanticSegments[]` place segments | E7 integers | epoch ms, string or number |
//! | 4 | top-level array of `visit` entries | `geo:<lat>,<lon>` string | ISO-8601 |
//!
//! A document matching none of these fails with
//! [`TrackerError::UnrecognizedSchema`] and produces nothing.
//!
//! Raw pings (shape 2) carry no duration, so their single timestamp becomes
//! both start and end; the strict positive-duration invariant then drops
//! every one of them. A ping-only export therefore normalizes to an empty
//! session list: pings alone cannot prove a dwell.
//!
//! Individual malformed records (missing fields, non-finite coordinates,
//! unparseable timestamps or geo strings) are dropped and counted, never
//! fatal to the run.

use chrono::DateTime;
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use crate::{Session, TrackerError};

// ============================================================================
// Record Shapes
// ============================================================================

/// Epoch-millisecond timestamp that exports encode as either a JSON string
/// or a bare number, depending on generation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MillisTimestamp {
    Int(i64),
    Text(String),
}

impl MillisTimestamp {
    fn as_ms(&self) -> Option<i64> {
        match self {
            Self::Int(ms) => Some(*ms),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineObject {
    place_visit: Option<PlaceVisit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceVisit {
    duration: Option<VisitDuration>,
    location: Option<E7Location>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitDuration {
    start_timestamp_ms: Option<MillisTimestamp>,
    end_timestamp_ms: Option<MillisTimestamp>,
}

/// Fixed-point coordinates scaled by 1e7 (the "E7" encoding).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct E7Location {
    latitude_e7: Option<f64>,
    longitude_e7: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPing {
    latitude_e7: Option<f64>,
    longitude_e7: Option<f64>,
    timestamp_ms: Option<MillisTimestamp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SemanticSegment {
    segment_type: Option<String>,
    place_visit: Option<PlaceVisit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitEntry {
    start_time: Option<String>,
    end_time: Option<String>,
    visit: Option<VisitDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitDetails {
    top_candidate: Option<TopCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopCandidate {
    place_location: Option<String>,
}

// ============================================================================
// Normalization
// ============================================================================

/// Candidate session fields before the [`Session`] invariant check.
type Candidate = (f64, f64, i64, i64);

/// Normalize a parsed export document into sessions, in document order.
///
/// # Errors
///
/// [`TrackerError::UnrecognizedSchema`] when the document matches none of
/// the known shapes. Record-level problems never error; those records are
/// dropped.
pub fn normalize(doc: &Value) -> Result<Vec<Session>, TrackerError> {
    let mut sessions = Vec::new();
    let mut dropped = 0usize;
    let mut push = |candidate: Option<Candidate>| match candidate
        .and_then(|(lat, lon, start, end)| Session::new(lat, lon, start, end))
    {
        Some(session) => sessions.push(session),
        None => dropped += 1,
    };

    let schema = if let Some(objects) = doc.get("timelineObjects").and_then(Value::as_array) {
        for item in objects {
            push(decode::<TimelineObject>(item).and_then(|o| timeline_object_session(&o)));
        }
        "timelineObjects"
    } else if let Some(pings) = doc.get("locations").and_then(Value::as_array) {
        for item in pings {
            push(decode::<RawPing>(item).and_then(|p| raw_ping_session(&p)));
        }
        "locations"
    } else if let Some(segments) = doc.get("semanticSegments").and_then(Value::as_array) {
        for item in segments {
            push(decode::<SemanticSegment>(item).and_then(|s| semantic_segment_session(&s)));
        }
        "semanticSegments"
    } else if is_visit_list(doc) {
        for item in doc.as_array().into_iter().flatten() {
            push(decode::<VisitEntry>(item).and_then(|v| visit_entry_session(&v)));
        }
        "visit list"
    } else {
        return Err(TrackerError::UnrecognizedSchema);
    };

    if dropped > 0 {
        debug!("normalize: dropped {} unusable {} records", dropped, schema);
    }
    info!("normalized {} sessions from {} document", sessions.len(), schema);
    Ok(sessions)
}

/// A top-level array whose first element carries a `visit` field.
fn is_visit_list(doc: &Value) -> bool {
    doc.as_array()
        .and_then(|entries| entries.first())
        .map(|first| first.get("visit").is_some())
        .unwrap_or(false)
}

fn decode<'de, T: Deserialize<'de>>(value: &'de Value) -> Option<T> {
    T::deserialize(value).ok()
}

fn timeline_object_session(object: &TimelineObject) -> Option<Candidate> {
    place_visit_session(object.place_visit.as_ref()?)
}

/// Shared by shapes 1 and 3: a place visit with E7 location and ms duration.
fn place_visit_session(visit: &PlaceVisit) -> Option<Candidate> {
    let duration = visit.duration.as_ref()?;
    let location = visit.location.as_ref()?;
    Some((
        location.latitude_e7? / 1e7,
        location.longitude_e7? / 1e7,
        duration.start_timestamp_ms.as_ref()?.as_ms()?,
        duration.end_timestamp_ms.as_ref()?.as_ms()?,
    ))
}

/// Raw pings have no duration: start == end, so the session invariant drops
/// them all downstream.
fn raw_ping_session(ping: &RawPing) -> Option<Candidate> {
    let ts = ping.timestamp_ms.as_ref()?.as_ms()?;
    Some((ping.latitude_e7? / 1e7, ping.longitude_e7? / 1e7, ts, ts))
}

fn semantic_segment_session(segment: &SemanticSegment) -> Option<Candidate> {
    if segment.segment_type.as_deref() != Some("TYPE_PLACE") {
        return None;
    }
    place_visit_session(segment.place_visit.as_ref()?)
}

fn visit_entry_session(entry: &VisitEntry) -> Option<Candidate> {
    let location = entry.visit.as_ref()?.top_candidate.as_ref()?.place_location.as_deref()?;
    let (lat, lon) = parse_geo_uri(location)?;
    Some((
        lat,
        lon,
        parse_iso_ms(entry.start_time.as_deref()?)?,
        parse_iso_ms(entry.end_time.as_deref()?)?,
    ))
}

/// Strict `geo:<lat>,<lon>` decimal pair. Exactly one comma, both halves
/// non-empty and drawn from `[-0-9.]` only.
fn parse_geo_uri(raw: &str) -> Option<(f64, f64)> {
    let pair = raw.strip_prefix("geo:")?;
    let (lat, lon) = pair.split_once(',')?;
    let well_formed = |s: &str| {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'.')
    };
    if !well_formed(lat) || !well_formed(lon) {
        return None;
    }
    Some((lat.parse().ok()?, lon.parse().ok()?))
}

/// ISO-8601 timestamp to epoch milliseconds.
fn parse_iso_ms(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.timestamp_millis())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timeline_objects_decode() {
        let doc = json!({
            "timelineObjects": [
                {
                    "placeVisit": {
                        "location": {"latitudeE7": 515074000, "longitudeE7": -1278000},
                        "duration": {"startTimestampMs": "1000", "endTimestampMs": "2000"}
                    }
                },
                // an activity segment, no placeVisit: skipped
                {"activitySegment": {"distance": 1200}}
            ]
        });
        let sessions = normalize(&doc).unwrap();
        assert_eq!(sessions.len(), 1);
        assert!((sessions[0].latitude - 51.5074).abs() < 1e-9);
        assert!((sessions[0].longitude - (-0.1278)).abs() < 1e-9);
        assert_eq!(sessions[0].start_ms, 1000);
        assert_eq!(sessions[0].end_ms, 2000);
    }

    #[test]
    fn test_timestamps_accept_strings_and_numbers() {
        let doc = json!({
            "timelineObjects": [{
                "placeVisit": {
                    "location": {"latitudeE7": 10000000, "longitudeE7": 20000000},
                    "duration": {"startTimestampMs": 1000, "endTimestampMs": "2000"}
                }
            }]
        });
        let sessions = normalize(&doc).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].start_ms, 1000);
        assert_eq!(sessions[0].end_ms, 2000);
    }

    #[test]
    fn test_raw_pings_normalize_to_nothing() {
        let doc = json!({
            "locations": [
                {"latitudeE7": 515074000, "longitudeE7": -1278000, "timestampMs": "1000"},
                {"latitudeE7": 515074000, "longitudeE7": -1278000, "timestampMs": "2000"}
            ]
        });
        // Recognized shape, but zero-duration pings all fail the invariant
        let sessions = normalize(&doc).unwrap();
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_semantic_segments_require_place_type() {
        let place = json!({
            "segmentType": "TYPE_PLACE",
            "placeVisit": {
                "location": {"latitudeE7": 515074000, "longitudeE7": -1278000},
                "duration": {"startTimestampMs": "1000", "endTimestampMs": "2000"}
            }
        });
        let mut activity = place.clone();
        activity["segmentType"] = json!("TYPE_ACTIVITY");
        let doc = json!({ "semanticSegments": [place, activity] });
        let sessions = normalize(&doc).unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_visit_list_decodes_geo_and_iso() {
        let doc = json!([{
            "startTime": "2024-03-01T18:00:00.000Z",
            "endTime": "2024-03-01T19:05:00.000Z",
            "visit": {"topCandidate": {"placeLocation": "geo:51.5074,-0.1278"}}
        }]);
        let sessions = normalize(&doc).unwrap();
        assert_eq!(sessions.len(), 1);
        assert!((sessions[0].latitude - 51.5074).abs() < 1e-9);
        assert_eq!(sessions[0].end_ms - sessions[0].start_ms, 65 * 60_000);
    }

    #[test]
    fn test_detection_priority_is_fixed() {
        // Both keys present: timelineObjects wins and the pings are ignored
        let doc = json!({
            "timelineObjects": [{
                "placeVisit": {
                    "location": {"latitudeE7": 10000000, "longitudeE7": 20000000},
                    "duration": {"startTimestampMs": "1000", "endTimestampMs": "2000"}
                }
            }],
            "locations": [
                {"latitudeE7": 30000000, "longitudeE7": 40000000, "timestampMs": "5000"}
            ]
        });
        let sessions = normalize(&doc).unwrap();
        assert_eq!(sessions.len(), 1);
        assert!((sessions[0].latitude - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrecognized_shapes_fail() {
        assert!(matches!(normalize(&json!({})), Err(TrackerError::UnrecognizedSchema)));
        assert!(matches!(
            normalize(&json!({"somethingElse": []})),
            Err(TrackerError::UnrecognizedSchema)
        ));
        // Empty array: no first element with a "visit" field
        assert!(matches!(normalize(&json!([])), Err(TrackerError::UnrecognizedSchema)));
        // Array of non-visit objects
        assert!(matches!(
            normalize(&json!([{"foo": 1}])),
            Err(TrackerError::UnrecognizedSchema)
        ));
    }

    #[test]
    fn test_malformed_records_drop_without_failing() {
        let doc = json!({
            "timelineObjects": [
                {
                    "placeVisit": {
                        "location": {"latitudeE7": 10000000, "longitudeE7": 20000000},
                        "duration": {"startTimestampMs": "1000", "endTimestampMs": "2000"}
                    }
                },
                // negative duration
                {
                    "placeVisit": {
                        "location": {"latitudeE7": 10000000, "longitudeE7": 20000000},
                        "duration": {"startTimestampMs": "2000", "endTimestampMs": "1000"}
                    }
                },
                // missing location
                {"placeVisit": {"duration": {"startTimestampMs": "1000", "endTimestampMs": "2000"}}},
                // unparseable timestamp
                {
                    "placeVisit": {
                        "location": {"latitudeE7": 10000000, "longitudeE7": 20000000},
                        "duration": {"startTimestampMs": "soon", "endTimestampMs": "2000"}
                    }
                },
                // not even an object
                "garbage"
            ]
        });
        let sessions = normalize(&doc).unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_geo_uri_is_strict() {
        assert_eq!(parse_geo_uri("geo:51.5,-0.1"), Some((51.5, -0.1)));
        assert_eq!(parse_geo_uri("geo:-33.86,151.21"), Some((-33.86, 151.21)));
        assert_eq!(parse_geo_uri("51.5,-0.1"), None); // missing scheme
        assert_eq!(parse_geo_uri("geo:51.5;-0.1"), None); // wrong separator
        assert_eq!(parse_geo_uri("geo:51.5"), None); // no pair
        assert_eq!(parse_geo_uri("geo:51.5,"), None); // empty half
        assert_eq!(parse_geo_uri("geo:51.5,abc"), None); // non-decimal
        assert_eq!(parse_geo_uri("geo:51.5,-0.1?z=17"), None); // trailing junk
        assert_eq!(parse_geo_uri("geo:5--1.5,0"), None); // chars ok, number bad
    }

    #[test]
    fn test_visit_list_drops_bad_entries() {
        let doc = json!([
            {
                "startTime": "2024-03-01T18:00:00Z",
                "endTime": "2024-03-01T19:00:00Z",
                "visit": {"topCandidate": {"placeLocation": "geo:51.5,-0.1"}}
            },
            {
                "startTime": "not a timestamp",
                "endTime": "2024-03-01T19:00:00Z",
                "visit": {"topCandidate": {"placeLocation": "geo:51.5,-0.1"}}
            },
            {
                "startTime": "2024-03-01T18:00:00Z",
                "endTime": "2024-03-01T19:00:00Z",
                "visit": {"topCandidate": {"placeLocation": "somewhere nice"}}
            }
        ]);
        let sessions = normalize(&doc).unwrap();
        assert_eq!(sessions.len(), 1);
    }
}
