//! Per-record data quality scoring.
//!
//! Deterministic, additive completeness/trust score over a single place
//! record. Each signal's contribution is capped so no single attribute
//! dominates. The score only ranks two specific records against each
//! other during canonical selection; it is not a global quality metric.

use crate::models::Place;

/// Fixed trust points per source system. Verified GIS-style sources rank
/// above crowd-sourced apps, which rank above manual entry.
fn source_trust(source: &str) -> i64 {
    match source {
        "google_places" => 30,
        "osm" => 25,
        "park4night" => 20,
        "campercontact" => 15,
        "manual" => 5,
        _ => 10,
    }
}

/// Compute the quality score for a place record. Non-negative.
pub fn quality_score(place: &Place) -> i64 {
    let mut score = source_trust(&place.source);

    score += match place.description.as_deref().map(str::len).unwrap_or(0) {
        len if len > 500 => 15,
        len if len > 200 => 10,
        len if len > 50 => 5,
        _ => 0,
    };

    score += (place.images.len() as i64 * 5).min(25);

    if place.rating.is_some() {
        score += place.review_count.min(50);
    }

    score += (place.amenities.len() as i64 * 2).min(20);

    for field in [&place.street, &place.city, &place.postal_code] {
        if field.as_deref().is_some_and(|v| !v.trim().is_empty()) {
            score += 3;
        }
    }

    score
}
