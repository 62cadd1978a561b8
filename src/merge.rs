//! Merge executor.
//!
//! Applies the field-by-field merge policy, demotes the absorbed record,
//! and writes the audit rows — all inside one transaction, so a failed
//! merge leaves no partial state behind. The field policy only ever
//! improves the canonical record: longer description, set unions,
//! rating-volume-weighted averages, and fill-only-when-empty scalars.

use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::{to_json_list, Place};

/// Failure taxonomy for a single merge.
///
/// `NotCanonical` and `AlreadyMerged` are stale-state conditions: the
/// candidate was resolved by an earlier merge (possibly in the same
/// batch, possibly in a previous run). The orchestrator treats those as
/// skips, never as batch failures.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("place {0} not found")]
    PlaceNotFound(i64),
    #[error("place {0} is no longer canonical")]
    NotCanonical(i64),
    #[error("place {0} has already been merged away")]
    AlreadyMerged(i64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl MergeError {
    /// Stale-state conditions are recoverable skips, not hard failures.
    pub fn is_stale(&self) -> bool {
        matches!(self, MergeError::NotCanonical(_) | MergeError::AlreadyMerged(_))
    }
}

/// Merge the absorbed record into the canonical one.
///
/// Preconditions are re-validated inside the transaction, which is what
/// makes re-running a batch safe at any point. Returns the updated
/// canonical record.
pub async fn merge(
    pool: &SqlitePool,
    canonical_id: i64,
    absorbed_id: i64,
    actor: &str,
    max_images: usize,
) -> Result<Place, MergeError> {
    let mut tx = pool.begin().await?;

    let canonical_row = sqlx::query("SELECT * FROM places WHERE id = ?")
        .bind(canonical_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MergeError::PlaceNotFound(canonical_id))?;
    let absorbed_row = sqlx::query("SELECT * FROM places WHERE id = ?")
        .bind(absorbed_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MergeError::PlaceNotFound(absorbed_id))?;

    let mut canonical = Place::from_row(&canonical_row);
    let absorbed = Place::from_row(&absorbed_row);

    if !canonical.is_canonical {
        return Err(MergeError::NotCanonical(canonical_id));
    }
    if !absorbed.is_canonical {
        return Err(MergeError::AlreadyMerged(absorbed_id));
    }

    let now = chrono::Utc::now().timestamp();
    let changes = apply_field_policy(&mut canonical, &absorbed, max_images);
    canonical.updated_at = now;

    sqlx::query(
        r#"
        UPDATE places SET
            description = ?, amenities = ?, features = ?, tags = ?, images = ?,
            rating = ?, rating_count = ?, review_count = ?,
            phone = ?, email = ?, website = ?, street = ?, city = ?,
            postal_code = ?, country = ?, altitude = ?, price_info = ?,
            source_count = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&canonical.description)
    .bind(to_json_list(&canonical.amenities))
    .bind(to_json_list(&canonical.features))
    .bind(to_json_list(&canonical.tags))
    .bind(to_json_list(&canonical.images))
    .bind(canonical.rating)
    .bind(canonical.rating_count)
    .bind(canonical.review_count)
    .bind(&canonical.phone)
    .bind(&canonical.email)
    .bind(&canonical.website)
    .bind(&canonical.street)
    .bind(&canonical.city)
    .bind(&canonical.postal_code)
    .bind(&canonical.country)
    .bind(canonical.altitude)
    .bind(&canonical.price_info)
    .bind(canonical.source_count)
    .bind(canonical.updated_at)
    .bind(canonical_id)
    .execute(&mut *tx)
    .await?;

    // The absorbed record's source now resolves to the canonical row, so
    // a re-import updates the survivor instead of recreating a duplicate.
    sqlx::query(
        r#"
        INSERT INTO source_mappings
            (source, external_id, canonical_place_id,
             has_description, has_images, has_rating, last_synced_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source, external_id) DO UPDATE SET
            canonical_place_id = excluded.canonical_place_id,
            has_description = excluded.has_description,
            has_images = excluded.has_images,
            has_rating = excluded.has_rating,
            last_synced_at = excluded.last_synced_at
        "#,
    )
    .bind(&absorbed.source)
    .bind(&absorbed.external_id)
    .bind(canonical_id)
    .bind(absorbed.description.as_deref().is_some_and(|d| !d.is_empty()))
    .bind(!absorbed.images.is_empty())
    .bind(absorbed.rating.is_some())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // Demote, never delete: anything still pointing at the old id stays
    // referentially valid.
    sqlx::query(
        "UPDATE places SET is_canonical = 0, canonical_id = ?, merged_at = ?, \
         active = 0, updated_at = ? WHERE id = ?",
    )
    .bind(canonical_id)
    .bind(now)
    .bind(now)
    .bind(absorbed_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO merge_history
            (canonical_id, merged_id, merged_source, merged_external_id,
             changes, merged_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(canonical_id)
    .bind(absorbed_id)
    .bind(&absorbed.source)
    .bind(&absorbed.external_id)
    .bind(Value::Object(changes).to_string())
    .bind(actor)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // Reassign foreign references held by the absorbed record.
    sqlx::query("UPDATE reviews SET place_id = ? WHERE place_id = ?")
        .bind(canonical_id)
        .bind(absorbed_id)
        .execute(&mut *tx)
        .await?;

    // Close out the originating candidate row, if one exists.
    let (pair_a, pair_b) = if canonical_id < absorbed_id {
        (canonical_id, absorbed_id)
    } else {
        (absorbed_id, canonical_id)
    };
    sqlx::query(
        "UPDATE duplicate_candidates SET status = 'merged', resolved_by = ?, resolved_at = ? \
         WHERE place_a = ? AND place_b = ? AND status IN ('pending', 'confirmed')",
    )
    .bind(actor)
    .bind(now)
    .bind(pair_a)
    .bind(pair_b)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(canonical)
}

/// Apply the merge policy to `canonical` in place and return a map of
/// the fields that actually changed (`{field: {"old": .., "new": ..}}`).
pub(crate) fn apply_field_policy(
    canonical: &mut Place,
    absorbed: &Place,
    max_images: usize,
) -> Map<String, Value> {
    let mut changes = Map::new();

    // Description: keep the longer non-empty value.
    let cur_len = canonical.description.as_deref().map(str::len).unwrap_or(0);
    let abs_len = absorbed.description.as_deref().map(str::len).unwrap_or(0);
    if abs_len > cur_len {
        changes.insert(
            "description".to_string(),
            json!({"old": canonical.description, "new": absorbed.description}),
        );
        canonical.description = absorbed.description.clone();
    }

    merge_list(&mut canonical.amenities, &absorbed.amenities, usize::MAX, "amenities", &mut changes);
    merge_list(&mut canonical.features, &absorbed.features, usize::MAX, "features", &mut changes);
    merge_list(&mut canonical.tags, &absorbed.tags, usize::MAX, "tags", &mut changes);
    merge_list(&mut canonical.images, &absorbed.images, max_images, "images", &mut changes);

    // Rating: review-volume-weighted average when both sides have one,
    // adopt as-is when only the absorbed side does.
    match (canonical.rating, absorbed.rating) {
        (Some(r_a), Some(r_b)) => {
            let n_a = canonical.rating_count.unwrap_or(1).max(1);
            let n_b = absorbed.rating_count.unwrap_or(1).max(1);
            let merged = (r_a * n_a as f64 + r_b * n_b as f64) / (n_a + n_b) as f64;
            if merged != r_a || canonical.rating_count != Some(n_a + n_b) {
                changes.insert(
                    "rating".to_string(),
                    json!({"old": r_a, "new": merged, "old_count": n_a, "new_count": n_a + n_b}),
                );
            }
            canonical.rating = Some(merged);
            canonical.rating_count = Some(n_a + n_b);
        }
        (None, Some(r_b)) => {
            changes.insert(
                "rating".to_string(),
                json!({"old": null, "new": r_b, "new_count": absorbed.rating_count}),
            );
            canonical.rating = Some(r_b);
            canonical.rating_count = absorbed.rating_count;
        }
        _ => {}
    }

    if absorbed.review_count > 0 {
        let merged = canonical.review_count + absorbed.review_count;
        changes.insert(
            "review_count".to_string(),
            json!({"old": canonical.review_count, "new": merged}),
        );
        canonical.review_count = merged;
    }

    fill_scalar(&mut canonical.phone, &absorbed.phone, "phone", &mut changes);
    fill_scalar(&mut canonical.email, &absorbed.email, "email", &mut changes);
    fill_scalar(&mut canonical.website, &absorbed.website, "website", &mut changes);
    fill_scalar(&mut canonical.street, &absorbed.street, "street", &mut changes);
    fill_scalar(&mut canonical.city, &absorbed.city, "city", &mut changes);
    fill_scalar(&mut canonical.postal_code, &absorbed.postal_code, "postal_code", &mut changes);
    fill_scalar(&mut canonical.country, &absorbed.country, "country", &mut changes);
    fill_scalar(&mut canonical.price_info, &absorbed.price_info, "price_info", &mut changes);

    if canonical.altitude.is_none() && absorbed.altitude.is_some() {
        changes.insert(
            "altitude".to_string(),
            json!({"old": null, "new": absorbed.altitude}),
        );
        canonical.altitude = absorbed.altitude;
    }

    canonical.source_count += 1;
    changes.insert(
        "source_count".to_string(),
        json!({"old": canonical.source_count - 1, "new": canonical.source_count}),
    );

    changes
}

/// Set union preserving canonical order, deduplicated, capped.
fn merge_list(
    current: &mut Vec<String>,
    incoming: &[String],
    cap: usize,
    field: &str,
    changes: &mut Map<String, Value>,
) {
    let mut added = Vec::new();
    for item in incoming {
        if current.len() >= cap {
            break;
        }
        if !current.contains(item) {
            current.push(item.clone());
            added.push(item.clone());
        }
    }
    if !added.is_empty() {
        changes.insert(field.to_string(), json!({"added": added}));
    }
}

/// Fill the canonical value only where it is currently empty.
fn fill_scalar(
    current: &mut Option<String>,
    incoming: &Option<String>,
    field: &str,
    changes: &mut Map<String, Value>,
) {
    let cur_empty = current.as_deref().map(str::trim).unwrap_or("").is_empty();
    let inc = match incoming.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return,
    };
    if cur_empty {
        changes.insert(field.to_string(), json!({"old": current, "new": inc}));
        *current = Some(inc.to_string());
    }
}
