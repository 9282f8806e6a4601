//! # Geographic Utilities
//!
//! Planar distance math shared by the visit matcher and the near-home
//! report section.
//!
//! ## Algorithm Notes
//!
//! Visit matching happens at radii of tens of metres and the home filter at
//! a few miles, so an equirectangular approximation is used instead of a
//! great-circle formula: latitude degrees are scaled by a fixed
//! metres-per-degree constant, longitude degrees by that constant times
//! `cos(latitude)`. At these scales the error is far below GPS noise.
//!
//! The longitude scale is always taken at the *first* point's latitude, so
//! callers pass the reference point (the session location, or home) first.
//! Both the matcher and the home filter go through [`squared_distance_metres`];
//! a session classified as "at" a pub and a pub classified as "near home"
//! are measured with the same ruler.
//!
//! Distances stay squared throughout matching so radius checks compare
//! against `r * r` without a square root per catalog entry.
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 latitude/longitude in degrees, the standard
//! used by GPS receivers and the location-history exports.

/// Metres per degree of latitude (and of longitude at the equator).
pub const METRES_PER_DEG_LAT: f64 = 111_320.0;

/// Metres per statute mile.
pub const METRES_PER_MILE: f64 = 1_609.34;

/// Metres per degree of longitude at the given latitude.
#[inline]
pub fn metres_per_deg_lon(latitude: f64) -> f64 {
    METRES_PER_DEG_LAT * latitude.to_radians().cos()
}

/// Squared distance in metres between two coordinates.
///
/// Equirectangular approximation with the longitude scale taken at `lat1`.
/// Always returns a finite non-negative value for finite inputs.
///
/// # Example
///
/// ```rust
/// use pub_tracker::geo_utils::squared_distance_metres;
///
/// // ~111m of latitude offset
/// let d2 = squared_distance_metres(51.5074, -0.1278, 51.5084, -0.1278);
/// assert!((d2.sqrt() - 111.32).abs() < 0.1);
/// ```
#[inline]
pub fn squared_distance_metres(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dx = (lon1 - lon2) * metres_per_deg_lon(lat1);
    let dy = (lat1 - lat2) * METRES_PER_DEG_LAT;
    dx * dx + dy * dy
}

/// Distance in miles between two coordinates, for report display.
#[inline]
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    squared_distance_metres(lat1, lon1, lat2, lon2).sqrt() / METRES_PER_MILE
}
