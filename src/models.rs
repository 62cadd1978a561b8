//! Core data models for the deduplication engine.
//!
//! These types represent the place records, duplicate candidates, and
//! audit rows that flow through the candidate-finding and merge pipeline.
//! List-valued attributes (amenities, features, tags, images) are stored
//! as JSON arrays in TEXT columns and parsed on read.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// A place record as persisted in the `places` table.
///
/// A record with `is_canonical = false` always carries a `canonical_id`
/// pointing at a record that is itself canonical; merges never chain.
#[derive(Debug, Clone)]
pub struct Place {
    pub id: i64,
    pub source: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub altitude: Option<f64>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub price_info: Option<String>,
    pub amenities: Vec<String>,
    pub features: Vec<String>,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub review_count: i64,
    pub is_canonical: bool,
    pub canonical_id: Option<i64>,
    pub merged_at: Option<i64>,
    pub active: bool,
    pub source_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Place {
    /// Map a full `places` row (SELECT *) into a `Place`.
    pub fn from_row(row: &SqliteRow) -> Self {
        Place {
            id: row.get("id"),
            source: row.get("source"),
            external_id: row.get("external_id"),
            name: row.get("name"),
            description: row.get("description"),
            lat: row.get("lat"),
            lng: row.get("lng"),
            altitude: row.get("altitude"),
            street: row.get("street"),
            city: row.get("city"),
            postal_code: row.get("postal_code"),
            country: row.get("country"),
            phone: row.get("phone"),
            email: row.get("email"),
            website: row.get("website"),
            price_info: row.get("price_info"),
            amenities: json_list(row.get("amenities")),
            features: json_list(row.get("features")),
            tags: json_list(row.get("tags")),
            images: json_list(row.get("images")),
            rating: row.get("rating"),
            rating_count: row.get("rating_count"),
            review_count: row.get("review_count"),
            is_canonical: row.get("is_canonical"),
            canonical_id: row.get("canonical_id"),
            merged_at: row.get("merged_at"),
            active: row.get("active"),
            source_count: row.get("source_count"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Parse a JSON-array TEXT column; malformed or empty values become `[]`.
fn json_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

/// Serialize a string list back into its JSON-array column form.
pub fn to_json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Lifecycle status of a duplicate candidate pair.
///
/// `pending` is the only non-terminal state: a pair moves to `confirmed`
/// or `rejected` by a manual reviewer, or to `merged` by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Pending,
    Confirmed,
    Rejected,
    Merged,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Confirmed => "confirmed",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Merged => "merged",
        }
    }
}

/// A scored pair produced by the proximity/similarity matcher.
///
/// `place_a < place_b` always holds, so an unordered pair has exactly
/// one representation.
#[derive(Debug, Clone)]
pub struct MatchPair {
    pub place_a: i64,
    pub place_b: i64,
    pub distance_m: f64,
    pub name_similarity: f64,
    pub geo_score: f64,
    pub name_score: f64,
    pub confidence: f64,
    pub same_city: bool,
}

/// A pending candidate joined with both records' display fields,
/// as shown in the manual review listing.
#[derive(Debug, Clone)]
pub struct CandidateListing {
    pub id: i64,
    pub place_a: i64,
    pub place_b: i64,
    pub name_a: String,
    pub name_b: String,
    pub source_a: String,
    pub source_b: String,
    pub distance_m: f64,
    pub confidence: f64,
    pub same_city: bool,
    pub status: String,
}
