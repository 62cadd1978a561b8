//! Canonical selection — pure decision, no mutation.

use sqlx::SqlitePool;

use crate::merge::MergeError;
use crate::models::Place;
use crate::quality::quality_score;

/// Fetch a place by id.
pub async fn fetch_place(pool: &SqlitePool, id: i64) -> Result<Option<Place>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM places WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(Place::from_row))
}

/// Decide which of two records survives as canonical.
///
/// Returns `(canonical_id, absorbed_id)`. On equal quality the
/// first-named id wins; the decision is deterministic and repeated
/// calls over unchanged data always agree.
pub async fn select_canonical(
    pool: &SqlitePool,
    id_a: i64,
    id_b: i64,
) -> Result<(i64, i64), MergeError> {
    let a = fetch_place(pool, id_a)
        .await?
        .ok_or(MergeError::PlaceNotFound(id_a))?;
    let b = fetch_place(pool, id_b)
        .await?
        .ok_or(MergeError::PlaceNotFound(id_b))?;

    if quality_score(&a) >= quality_score(&b) {
        Ok((id_a, id_b))
    } else {
        Ok((id_b, id_a))
    }
}
