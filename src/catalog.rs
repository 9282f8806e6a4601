//! # Pub Catalog
//!
//! Loads the pub catalog from a GeoJSON feature collection and caches it
//! for the rest of the process.
//!
//! The cache is an explicit owned object ([`CatalogCache`]) handed by
//! reference to whoever needs the pubs; there is no module-level global, so
//! tests and multi-run hosts can hold independent catalogs. Loading is
//! atomic: a failed parse leaves the cache exactly as it was, and a second
//! load request after success returns the cached slice without re-parsing.
//!
//! Catalog order is significant downstream: the matcher resolves radius
//! ties by taking the first pub in this order, so the loader preserves the
//! feature collection's ordering exactly.

use log::{info, warn};
use serde::Deserialize;
use std::sync::OnceLock;

use crate::{Pub, TrackerError};

/// Display name used when a feature carries no name at all.
pub const FALLBACK_PUB_NAME: &str = "Unnamed pub";

// ============================================================================
// GeoJSON Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: Option<serde_json::Value>,
    geometry: Option<Geometry>,
    properties: Option<FeatureProperties>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// GeoJSON position order: `[longitude, latitude]`.
    coordinates: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    name: Option<String>,
    #[serde(rename = "addr:postcode")]
    addr_postcode: Option<String>,
    tags: Option<FeatureTags>,
}

#[derive(Debug, Deserialize)]
struct FeatureTags {
    name: Option<String>,
    #[serde(rename = "addr:postcode")]
    postcode: Option<String>,
}

// ============================================================================
// Cache
// ============================================================================

/// Lazily-loaded, immutable pub catalog.
///
/// Lifecycle is uninitialized -> loaded; once loaded the contents never
/// change for the lifetime of the cache.
///
/// # Example
///
/// ```rust
/// use pub_tracker::CatalogCache;
///
/// let geojson = br#"{"features": [{
///     "id": "node/42",
///     "geometry": {"coordinates": [-0.1278, 51.5074]},
///     "properties": {"tags": {"name": "The Lamb", "addr:postcode": "wc1n 3lz"}}
/// }]}"#;
///
/// let cache = CatalogCache::new();
/// let pubs = cache.load_from_slice(geojson).unwrap();
/// assert_eq!(pubs[0].name, "The Lamb");
/// assert_eq!(pubs[0].postcode, "WC1N 3LZ");
/// ```
#[derive(Debug, Default)]
pub struct CatalogCache {
    pubs: OnceLock<Vec<Pub>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self { pubs: OnceLock::new() }
    }

    /// The loaded catalog, if any load has succeeded yet.
    pub fn get(&self) -> Option<&[Pub]> {
        self.pubs.get().map(Vec::as_slice)
    }

    /// Parse a GeoJSON feature collection and cache the result.
    ///
    /// The first successful call populates the cache; every later call
    /// returns the cached catalog without touching `bytes` again.
    ///
    /// # Errors
    ///
    /// [`TrackerError::CatalogUnavailable`] when the payload is not a
    /// feature collection. The cache stays uninitialized in that case, so a
    /// later load with a good payload still works.
    pub fn load_from_slice(&self, bytes: &[u8]) -> Result<&[Pub], TrackerError> {
        if let Some(pubs) = self.pubs.get() {
            return Ok(pubs);
        }
        let pubs = parse_catalog(bytes)?;
        Ok(self.pubs.get_or_init(|| pubs))
    }

    /// Fetch the catalog over HTTP, then parse and cache it.
    ///
    /// Cached results short-circuit before any network activity.
    #[cfg(feature = "http")]
    pub async fn load_from_url(&self, url: &str) -> Result<&[Pub], TrackerError> {
        if let Some(pubs) = self.pubs.get() {
            return Ok(pubs);
        }

        let response = reqwest::get(url)
            .await
            .map_err(|e| TrackerError::CatalogUnavailable(format!("fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(TrackerError::CatalogUnavailable(format!("HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TrackerError::CatalogUnavailable(format!("body download error: {e}")))?;

        self.load_from_slice(&bytes)
    }

    /// Blocking wrapper around [`CatalogCache::load_from_url`] for hosts
    /// without their own async runtime.
    #[cfg(feature = "http")]
    pub fn load_from_url_blocking(&self, url: &str) -> Result<&[Pub], TrackerError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TrackerError::CatalogUnavailable(format!("runtime error: {e}")))?;
        rt.block_on(self.load_from_url(url))
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a GeoJSON feature collection into pubs, preserving feature order.
///
/// Features without a usable id or point position are skipped (the catalog
/// needs stable identities and coordinates for every entry); a count of
/// skipped features is logged.
pub fn parse_catalog(bytes: &[u8]) -> Result<Vec<Pub>, TrackerError> {
    let collection: FeatureCollection = serde_json::from_slice(bytes)
        .map_err(|e| TrackerError::CatalogUnavailable(format!("malformed GeoJSON: {e}")))?;

    let total = collection.features.len();
    let pubs: Vec<Pub> = collection
        .features
        .iter()
        .filter_map(|value| Feature::deserialize(value).ok())
        .filter_map(pub_from_feature)
        .collect();

    let skipped = total - pubs.len();
    if skipped > 0 {
        warn!("catalog: skipped {} of {} features without id or position", skipped, total);
    }
    info!("catalog loaded: {} pubs", pubs.len());
    Ok(pubs)
}

fn pub_from_feature(feature: Feature) -> Option<Pub> {
    let id = feature.id.as_ref().and_then(feature_id)?;
    let coordinates = feature.geometry.as_ref()?.coordinates.as_ref()?;
    if coordinates.len() < 2 {
        return None;
    }
    let (longitude, latitude) = (coordinates[0], coordinates[1]);

    let properties = feature.properties.as_ref();
    let tags = properties.and_then(|p| p.tags.as_ref());

    // Name fallback chain: tags.name -> properties.name -> placeholder
    let name = tags
        .and_then(|t| t.name.clone())
        .or_else(|| properties.and_then(|p| p.name.clone()))
        .unwrap_or_else(|| FALLBACK_PUB_NAME.to_string());

    // Postcode fallback chain: tags -> top-level property -> empty
    let postcode = tags
        .and_then(|t| t.postcode.clone())
        .or_else(|| properties.and_then(|p| p.addr_postcode.clone()))
        .unwrap_or_default()
        .to_uppercase();

    Some(Pub { id, latitude, longitude, name, postcode })
}

/// Feature ids appear as strings (`"node/42"`) or bare numbers depending on
/// the exporter.
fn feature_id(raw: &serde_json::Value) -> Option<String> {
    match raw {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog_bytes(features: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({ "type": "FeatureCollection", "features": features })).unwrap()
    }

    #[test]
    fn test_feature_mapping_and_fallbacks() {
        let bytes = catalog_bytes(json!([
            {
                "id": "node/1",
                "geometry": {"coordinates": [-0.1278, 51.5074]},
                "properties": {"tags": {"name": "The Lamb", "addr:postcode": "wc1n 3lz"}}
            },
            {
                // name only at the top-level properties
                "id": "node/2",
                "geometry": {"coordinates": [-0.2, 51.6]},
                "properties": {"name": "The Crown", "addr:postcode": "n1 1aa"}
            },
            {
                // nothing to name it by
                "id": 3,
                "geometry": {"coordinates": [-0.3, 51.7]},
                "properties": {}
            }
        ]));

        let pubs = parse_catalog(&bytes).unwrap();
        assert_eq!(pubs.len(), 3);

        assert_eq!(pubs[0].id, "node/1");
        assert_eq!(pubs[0].name, "The Lamb");
        assert_eq!(pubs[0].postcode, "WC1N 3LZ");
        assert!((pubs[0].latitude - 51.5074).abs() < 1e-9);
        assert!((pubs[0].longitude - (-0.1278)).abs() < 1e-9);

        assert_eq!(pubs[1].name, "The Crown");
        assert_eq!(pubs[1].postcode, "N1 1AA");

        assert_eq!(pubs[2].id, "3");
        assert_eq!(pubs[2].name, FALLBACK_PUB_NAME);
        assert_eq!(pubs[2].postcode, "");
    }

    #[test]
    fn test_tags_win_over_top_level_properties() {
        let bytes = catalog_bytes(json!([{
            "id": "node/1",
            "geometry": {"coordinates": [0.0, 0.0]},
            "properties": {
                "name": "Outer Name",
                "addr:postcode": "e1 1aa",
                "tags": {"name": "Inner Name", "addr:postcode": "e2 2bb"}
            }
        }]));
        let pubs = parse_catalog(&bytes).unwrap();
        assert_eq!(pubs[0].name, "Inner Name");
        assert_eq!(pubs[0].postcode, "E2 2BB");
    }

    #[test]
    fn test_unusable_features_are_skipped() {
        let bytes = catalog_bytes(json!([
            {"geometry": {"coordinates": [0.0, 0.0]}, "properties": {}},   // no id
            {"id": "node/1", "properties": {}},                              // no geometry
            {"id": "node/2", "geometry": {"coordinates": [1.0]}},           // short position
            {"id": "node/3", "geometry": {"coordinates": [-0.1, 51.5]}}
        ]));
        let pubs = parse_catalog(&bytes).unwrap();
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].id, "node/3");
    }

    #[test]
    fn test_catalog_order_preserved() {
        let bytes = catalog_bytes(json!([
            {"id": "z", "geometry": {"coordinates": [0.0, 0.0]}},
            {"id": "a", "geometry": {"coordinates": [0.0, 0.0]}},
            {"id": "m", "geometry": {"coordinates": [0.0, 0.0]}}
        ]));
        let pubs = parse_catalog(&bytes).unwrap();
        let ids: Vec<&str> = pubs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["z", "a", "m"]);
    }

    #[test]
    fn test_malformed_payload_is_unavailable() {
        let cache = CatalogCache::new();
        let result = cache.load_from_slice(b"not geojson at all");
        assert!(matches!(result, Err(TrackerError::CatalogUnavailable(_))));
        // Atomic failure: nothing was cached
        assert!(cache.get().is_none());

        // A later good load still succeeds
        let bytes = catalog_bytes(json!([
            {"id": "node/1", "geometry": {"coordinates": [0.0, 0.0]}}
        ]));
        assert_eq!(cache.load_from_slice(&bytes).unwrap().len(), 1);
    }

    #[test]
    fn test_second_load_returns_cache_untouched() {
        let bytes = catalog_bytes(json!([
            {"id": "node/1", "geometry": {"coordinates": [0.0, 0.0]}}
        ]));
        let cache = CatalogCache::new();
        let first = cache.load_from_slice(&bytes).unwrap().as_ptr();

        // Even garbage succeeds now: the cached catalog is returned without
        // re-parsing anything
        let second = cache.load_from_slice(b"garbage").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.as_ptr(), first);
    }
}
