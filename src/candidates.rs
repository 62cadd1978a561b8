//! Duplicate-candidate lifecycle.
//!
//! The candidate finder calls the [`Matcher`] capability, persists newly
//! discovered pairs as `pending`, and serves the manual review queue.
//! A pair that already has a row — in any status, either id order — is
//! never re-proposed; in particular `rejected` pairs stay rejected until
//! an operator explicitly resets them.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::matcher::{GeoMatcher, Matcher};
use crate::models::{CandidateListing, CandidateStatus, MatchPair};

/// Run the matcher and return scored pairs without persisting anything.
pub async fn find_candidates(
    matcher: &dyn Matcher,
    max_distance_m: f64,
    min_name_similarity: f64,
    max_results: usize,
) -> Result<Vec<MatchPair>> {
    matcher
        .scan(max_distance_m, min_name_similarity, max_results)
        .await
}

/// Persist newly discovered pairs at/above `min_confidence` as `pending`.
/// Returns how many rows were actually inserted; existing pairs are
/// skipped regardless of status.
pub async fn populate_candidates(
    pool: &SqlitePool,
    matcher: &dyn Matcher,
    max_distance_m: f64,
    min_name_similarity: f64,
    max_results: usize,
    min_confidence: f64,
) -> Result<u64> {
    let pairs = find_candidates(matcher, max_distance_m, min_name_similarity, max_results).await?;
    let now = chrono::Utc::now().timestamp();

    let mut inserted = 0u64;
    for pair in pairs {
        if pair.confidence < min_confidence {
            continue;
        }
        let result = sqlx::query(
            r#"
            INSERT INTO duplicate_candidates
                (place_a, place_b, distance_m, name_similarity, geo_score, name_score,
                 confidence, same_city, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(place_a, place_b) DO NOTHING
            "#,
        )
        .bind(pair.place_a)
        .bind(pair.place_b)
        .bind(pair.distance_m)
        .bind(pair.name_similarity)
        .bind(pair.geo_score)
        .bind(pair.name_score)
        .bind(pair.confidence)
        .bind(pair.same_city)
        .bind(now)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Pending candidates joined with both records' display fields, ordered
/// by confidence descending. This is the manual review queue.
pub async fn pending_candidates(
    pool: &SqlitePool,
    min_confidence: f64,
    limit: i64,
) -> Result<Vec<CandidateListing>> {
    let rows = sqlx::query(
        r#"
        SELECT
            c.id, c.place_a, c.place_b, c.distance_m, c.confidence,
            c.same_city, c.status,
            pa.name AS name_a, pa.source AS source_a,
            pb.name AS name_b, pb.source AS source_b
        FROM duplicate_candidates c
        JOIN places pa ON pa.id = c.place_a
        JOIN places pb ON pb.id = c.place_b
        WHERE c.status = 'pending' AND c.confidence >= ?
        ORDER BY c.confidence DESC, c.id
        LIMIT ?
        "#,
    )
    .bind(min_confidence)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CandidateListing {
            id: row.get("id"),
            place_a: row.get("place_a"),
            place_b: row.get("place_b"),
            name_a: row.get("name_a"),
            name_b: row.get("name_b"),
            source_a: row.get("source_a"),
            source_b: row.get("source_b"),
            distance_m: row.get("distance_m"),
            confidence: row.get("confidence"),
            same_city: row.get("same_city"),
            status: row.get("status"),
        })
        .collect())
}

/// Manual review: move a `pending` candidate to `confirmed` or
/// `rejected`, recording who resolved it and when.
pub async fn resolve_candidate(
    pool: &SqlitePool,
    candidate_id: i64,
    to: CandidateStatus,
    resolver: &str,
) -> Result<()> {
    match to {
        CandidateStatus::Confirmed | CandidateStatus::Rejected => {}
        other => bail!("Cannot manually resolve a candidate to '{}'", other.as_str()),
    }

    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM duplicate_candidates WHERE id = ?")
            .bind(candidate_id)
            .fetch_optional(pool)
            .await?;

    let status = match status {
        Some(s) => s,
        None => bail!("Candidate {} not found", candidate_id),
    };
    if status != CandidateStatus::Pending.as_str() {
        bail!(
            "Candidate {} is '{}'; only pending candidates can be resolved",
            candidate_id,
            status
        );
    }

    sqlx::query(
        "UPDATE duplicate_candidates SET status = ?, resolved_by = ?, resolved_at = ? \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(to.as_str())
    .bind(resolver)
    .bind(chrono::Utc::now().timestamp())
    .bind(candidate_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// `pdd populate` — populate-only mode.
pub async fn run_populate(
    config: &Config,
    max_distance_m: Option<f64>,
    min_similarity: Option<f64>,
    min_confidence: Option<f64>,
    limit: Option<usize>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let matcher = GeoMatcher::new(pool.clone());

    let max_distance = max_distance_m.unwrap_or(config.matching.max_distance_m);
    let min_sim = min_similarity.unwrap_or(config.matching.min_name_similarity);
    let min_conf = min_confidence.unwrap_or(config.merge.min_confidence);
    let cap = limit.unwrap_or(config.matching.max_results);

    let inserted =
        populate_candidates(&pool, &matcher, max_distance, min_sim, cap, min_conf).await?;

    println!("populate");
    println!("  distance threshold: {:.0} m", max_distance);
    println!("  min name similarity: {:.2}", min_sim);
    println!("  min confidence: {:.0}", min_conf);
    println!("  new pending candidates: {}", inserted);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// `pdd candidates` — dry-run review listing, mutates nothing.
pub async fn run_candidates(
    config: &Config,
    min_confidence: Option<f64>,
    limit: Option<i64>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let min_conf = min_confidence.unwrap_or(config.merge.min_confidence);
    let listings = pending_candidates(&pool, min_conf, limit.unwrap_or(25)).await?;

    if listings.is_empty() {
        println!("No pending candidates at confidence >= {:.0}.", min_conf);
        pool.close().await;
        return Ok(());
    }

    println!("pending candidates (confidence >= {:.0})", min_conf);
    for c in &listings {
        println!(
            "  #{:<6} {:5.1}  [{:>4}] {} ({}) <-> [{:>4}] {} ({})  {:.0} m{}",
            c.id,
            c.confidence,
            c.place_a,
            c.name_a,
            c.source_a,
            c.place_b,
            c.name_b,
            c.source_b,
            c.distance_m,
            if c.same_city { ", same city" } else { "" },
        );
    }
    println!("  total: {}", listings.len());

    pool.close().await;
    Ok(())
}

/// `pdd resolve` — manual confirm/reject of a pending candidate.
pub async fn run_resolve(
    config: &Config,
    candidate_id: i64,
    confirm: bool,
    resolver: &str,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let to = if confirm {
        CandidateStatus::Confirmed
    } else {
        CandidateStatus::Rejected
    };
    resolve_candidate(&pool, candidate_id, to, resolver).await?;
    println!("candidate {} -> {}", candidate_id, to.as_str());

    pool.close().await;
    Ok(())
}
