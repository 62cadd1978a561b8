//! Proximity/similarity matcher — the capability that proposes candidate
//! pairs.
//!
//! The engine treats matching as a black box behind the [`Matcher`]
//! trait: given a distance threshold, a minimum name similarity, and a
//! result cap, produce scored pairs over *active, canonical* records
//! only. Already-merged records are never matched again.
//!
//! The default [`GeoMatcher`] implementation is a latitude sweep: rows
//! are sorted by latitude, each row is compared against the rows inside
//! the latitude window implied by the distance threshold, a cheap
//! longitude pre-filter prunes the window, and haversine distance
//! confirms the survivors. Deterministic and read-only.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::confidence;
use crate::models::MatchPair;

/// Mean meters per degree of latitude.
const METERS_PER_DEG_LAT: f64 = 111_320.0;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Produces scored candidate pairs over active canonical records.
#[async_trait]
pub trait Matcher {
    async fn scan(
        &self,
        max_distance_m: f64,
        min_name_similarity: f64,
        max_results: usize,
    ) -> Result<Vec<MatchPair>>;
}

/// Default matcher backed by the `places` table.
pub struct GeoMatcher {
    pool: SqlitePool,
}

impl GeoMatcher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

struct MatchRow {
    id: i64,
    norm_name: String,
    lat: f64,
    lng: f64,
    city: Option<String>,
}

#[async_trait]
impl Matcher for GeoMatcher {
    async fn scan(
        &self,
        max_distance_m: f64,
        min_name_similarity: f64,
        max_results: usize,
    ) -> Result<Vec<MatchPair>> {
        let rows = sqlx::query(
            "SELECT id, name, lat, lng, city FROM places \
             WHERE active = 1 AND is_canonical = 1 ORDER BY lat, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let places: Vec<MatchRow> = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                MatchRow {
                    id: row.get("id"),
                    norm_name: normalize_name(&name),
                    lat: row.get("lat"),
                    lng: row.get("lng"),
                    city: row.get("city"),
                }
            })
            .collect();

        let lat_window = max_distance_m / METERS_PER_DEG_LAT;
        let mut pairs = Vec::new();

        'outer: for (i, a) in places.iter().enumerate() {
            for b in &places[i + 1..] {
                // Rows are latitude-sorted, so the first row outside the
                // window ends the inner scan.
                if b.lat - a.lat > lat_window {
                    break;
                }

                // Longitude pre-filter before the haversine call.
                let cos_lat = a.lat.to_radians().cos().abs().max(1e-6);
                if (b.lng - a.lng).abs() > lat_window / cos_lat {
                    continue;
                }

                let distance_m = haversine_m(a.lat, a.lng, b.lat, b.lng);
                if distance_m > max_distance_m {
                    continue;
                }

                let similarity = name_similarity(&a.norm_name, &b.norm_name);
                if similarity < min_name_similarity {
                    continue;
                }

                let same_city = same_city(a.city.as_deref(), b.city.as_deref());
                let geo = confidence::geo_score(distance_m, max_distance_m);
                let name = confidence::name_score(similarity);

                let (place_a, place_b) = if a.id < b.id { (a.id, b.id) } else { (b.id, a.id) };
                pairs.push(MatchPair {
                    place_a,
                    place_b,
                    distance_m,
                    name_similarity: similarity,
                    geo_score: geo,
                    name_score: name,
                    confidence: confidence::confidence(geo, name, same_city),
                    same_city,
                });

                if pairs.len() >= max_results.saturating_mul(2) {
                    break 'outer;
                }
            }
        }

        // Most confident pairs first; ties broken by pair ids so the
        // result cap is stable across runs.
        pairs.sort_by(|x, y| {
            y.confidence
                .partial_cmp(&x.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (x.place_a, x.place_b).cmp(&(y.place_a, y.place_b)))
        });
        pairs.truncate(max_results);

        Ok(pairs)
    }
}

/// Lowercase, strip everything but alphanumerics, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_space = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Similarity between two pre-normalized names, 0–1.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

fn same_city(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim())
        }
        _ => false,
    }
}
