//! Batch orchestration.
//!
//! Drives the unattended workflow: populate candidates, auto-merge the
//! eligible pairs most-confident-first, and backfill source mappings.
//! A single pair's failure never aborts the batch — each merge runs in
//! its own transaction, stale pairs are skipped, and everything else is
//! logged and counted.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::{error, info, warn};

use crate::candidates;
use crate::config::Config;
use crate::db;
use crate::matcher::GeoMatcher;
use crate::merge::merge;
use crate::select::select_canonical;

/// Outcome of one auto-merge batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeReport {
    pub merged: u64,
    pub skipped: u64,
    pub errors: u64,
}

struct EligiblePair {
    place_a: i64,
    place_b: i64,
    confidence: f64,
}

/// Candidates eligible for auto-merge: `pending` or `confirmed`, at or
/// above the confidence threshold, most confident first. Processing the
/// most certain merges first minimizes wasted work on pairs a previous
/// merge in the same batch has already invalidated.
async fn eligible_pairs(pool: &SqlitePool, min_confidence: f64) -> Result<Vec<EligiblePair>> {
    let rows = sqlx::query(
        "SELECT place_a, place_b, confidence FROM duplicate_candidates \
         WHERE status IN ('pending', 'confirmed') AND confidence >= ? \
         ORDER BY confidence DESC, id",
    )
    .bind(min_confidence)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| EligiblePair {
            place_a: row.get("place_a"),
            place_b: row.get("place_b"),
            confidence: row.get("confidence"),
        })
        .collect())
}

/// Is this place still an active canonical record? Cheap point read used
/// to re-verify a pair immediately before merging.
async fn still_canonical(pool: &SqlitePool, id: i64) -> Result<Option<bool>, sqlx::Error> {
    sqlx::query_scalar("SELECT is_canonical AND active FROM places WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Auto-merge all eligible pairs, capped at `max_merges`.
///
/// At-least-once safe: every merge re-validates its preconditions, so
/// re-running over an unchanged candidate set performs zero additional
/// merges. The cap is checked between pairs, never mid-merge.
pub async fn auto_merge(
    pool: &SqlitePool,
    min_confidence: f64,
    max_merges: u64,
    actor: &str,
    max_images: usize,
) -> Result<MergeReport> {
    let pairs = eligible_pairs(pool, min_confidence).await?;
    let mut report = MergeReport::default();

    for pair in pairs {
        if report.merged >= max_merges {
            info!(max_merges, "merge cap reached, stopping batch");
            break;
        }

        // Re-verify before attempting: an earlier merge in this batch may
        // have absorbed one side of this pair already.
        let mut stale = false;
        let mut read_failed = false;
        for id in [pair.place_a, pair.place_b] {
            match still_canonical(pool, id).await {
                Ok(Some(true)) => {}
                Ok(_) => {
                    stale = true;
                }
                Err(e) => {
                    error!(place_a = pair.place_a, place_b = pair.place_b, error = %e,
                        "precondition read failed");
                    read_failed = true;
                }
            }
        }
        if read_failed {
            report.errors += 1;
            continue;
        }
        if stale {
            warn!(
                place_a = pair.place_a,
                place_b = pair.place_b,
                "pair no longer mergeable, skipping"
            );
            report.skipped += 1;
            continue;
        }

        let result = match select_canonical(pool, pair.place_a, pair.place_b).await {
            Ok((canonical_id, absorbed_id)) => {
                merge(pool, canonical_id, absorbed_id, actor, max_images)
                    .await
                    .map(|place| (canonical_id, absorbed_id, place))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((canonical_id, absorbed_id, _)) => {
                info!(
                    canonical_id,
                    absorbed_id,
                    confidence = pair.confidence,
                    "merged duplicate pair"
                );
                report.merged += 1;
            }
            Err(e) if e.is_stale() => {
                warn!(place_a = pair.place_a, place_b = pair.place_b, reason = %e, "skipped");
                report.skipped += 1;
            }
            Err(e) => {
                // The pair's transaction rolled back on its own; log with
                // the pair identities and keep going.
                error!(place_a = pair.place_a, place_b = pair.place_b, error = %e, "merge failed");
                report.errors += 1;
            }
        }
    }

    Ok(report)
}

/// Write a source mapping for every active canonical record that does
/// not have one yet. Idempotent.
pub async fn backfill_mappings(pool: &SqlitePool) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO source_mappings
            (source, external_id, canonical_place_id,
             has_description, has_images, has_rating, last_synced_at)
        SELECT
            p.source, p.external_id, p.id,
            CASE WHEN p.description IS NOT NULL AND length(p.description) > 0 THEN 1 ELSE 0 END,
            CASE WHEN p.images != '[]' THEN 1 ELSE 0 END,
            CASE WHEN p.rating IS NOT NULL THEN 1 ELSE 0 END,
            ?
        FROM places p
        WHERE p.is_canonical = 1 AND p.active = 1
        ON CONFLICT(source, external_id) DO NOTHING
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// `pdd merge` — auto-merge batch (or a mutate-nothing listing with
/// `--dry-run`).
pub async fn run_merge(
    config: &Config,
    min_confidence: Option<f64>,
    max_merges: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let min_conf = min_confidence.unwrap_or(config.merge.min_confidence);
    let cap = max_merges.unwrap_or(config.merge.max_merges);

    if dry_run {
        let pairs = eligible_pairs(&pool, min_conf).await?;
        println!("auto-merge (dry-run), confidence >= {:.0}", min_conf);
        for pair in pairs.iter().take(cap as usize) {
            println!(
                "  would merge pair ({}, {})  confidence {:.1}",
                pair.place_a, pair.place_b, pair.confidence
            );
        }
        println!("  eligible pairs: {}", pairs.len());
        pool.close().await;
        return Ok(());
    }

    let report = auto_merge(&pool, min_conf, cap, &config.merge.actor, config.merge.max_images).await?;
    print_report(&report, min_conf);

    pool.close().await;
    Ok(())
}

/// `pdd backfill` — standalone source-mapping backfill.
pub async fn run_backfill(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let written = backfill_mappings(&pool).await?;
    println!("backfill");
    println!("  new source mappings: {}", written);
    println!("ok");
    pool.close().await;
    Ok(())
}

/// `pdd run` — full pass: populate, auto-merge, backfill.
pub async fn run_full(
    config: &Config,
    max_distance_m: Option<f64>,
    min_similarity: Option<f64>,
    min_confidence: Option<f64>,
    max_merges: Option<u64>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let matcher = GeoMatcher::new(pool.clone());

    let max_distance = max_distance_m.unwrap_or(config.matching.max_distance_m);
    let min_sim = min_similarity.unwrap_or(config.matching.min_name_similarity);
    let min_conf = min_confidence.unwrap_or(config.merge.min_confidence);
    let cap = max_merges.unwrap_or(config.merge.max_merges);

    let populated = candidates::populate_candidates(
        &pool,
        &matcher,
        max_distance,
        min_sim,
        config.matching.max_results,
        min_conf,
    )
    .await?;

    let report = auto_merge(&pool, min_conf, cap, &config.merge.actor, config.merge.max_images).await?;
    let backfilled = backfill_mappings(&pool).await?;

    println!("full run");
    println!("  new pending candidates: {}", populated);
    print_report(&report, min_conf);
    println!("  new source mappings: {}", backfilled);
    println!("ok");

    pool.close().await;
    Ok(())
}

fn print_report(report: &MergeReport, min_confidence: f64) {
    println!("auto-merge, confidence >= {:.0}", min_confidence);
    println!("  merged:  {}", report.merged);
    println!("  skipped: {}", report.skipped);
    println!("  errors:  {}", report.errors);
}
