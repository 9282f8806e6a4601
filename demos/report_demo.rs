//! End-to-end demo: normalize a small synthetic export, match it against a
//! three-pub catalog and print the rendered report.
//!
//! Run with: cargo run --example report_demo

use pub_tracker::{analyze_history, CatalogCache, TrackerConfig};

fn main() {
    env_logger::init();

    // A miniature catalog around Clissold Park, London
    let geojson = br#"{
        "type": "FeatureCollection",
        "features": [
            {
                "id": "node/1",
                "geometry": {"coordinates": [-0.0832, 51.5611]},
                "properties": {"tags": {"name": "The Clissold Arms", "addr:postcode": "n16 9es"}}
            },
            {
                "id": "node/2",
                "geometry": {"coordinates": [-0.0755, 51.5598]},
                "properties": {"tags": {"name": "The Rose and Crown"}}
            },
            {
                "id": "node/3",
                "geometry": {"coordinates": [-0.0601, 51.5556]},
                "properties": {}
            }
        ]
    }"#;

    let cache = CatalogCache::new();
    let pubs = cache.load_from_slice(geojson).expect("demo catalog parses");

    // Two qualifying visits to the same pub across two years, one short
    // stop that misses the dwell threshold, and one visit elsewhere
    let export = br#"{
        "timelineObjects": [
            {
                "placeVisit": {
                    "location": {"latitudeE7": 515611000, "longitudeE7": -832000},
                    "duration": {"startTimestampMs": "1687000000000",
                                 "endTimestampMs": "1687003600000"}
                }
            },
            {
                "placeVisit": {
                    "location": {"latitudeE7": 515611000, "longitudeE7": -832000},
                    "duration": {"startTimestampMs": "1717000000000",
                                 "endTimestampMs": "1717004200000"}
                }
            },
            {
                "placeVisit": {
                    "location": {"latitudeE7": 515598000, "longitudeE7": -755000},
                    "duration": {"startTimestampMs": "1717100000000",
                                 "endTimestampMs": "1717100300000"}
                }
            },
            {
                "placeVisit": {
                    "location": {"latitudeE7": 515598000, "longitudeE7": -755000},
                    "duration": {"startTimestampMs": "1717200000000",
                                 "endTimestampMs": "1717203900000"}
                }
            }
        ]
    }"#;

    let mut config = TrackerConfig::default();
    config.home_latitude = 51.5611;
    config.home_longitude = -0.0832;

    let result = analyze_history(export, pubs, &config, 2024).expect("demo export parses");

    println!("Sessions: {}", result.session_count);
    println!("Visits:   {}\n", result.visit_count);
    println!("{}", result.report);

    // The visited/unvisited flags the map layer would consume
    println!("\nMarkers:");
    for (p, visited) in pubs.iter().zip(result.stats.marker_flags(pubs)) {
        println!("  {} {} -> {}", p.id, p.name, if visited { "visited" } else { "unvisited" });
    }
}
