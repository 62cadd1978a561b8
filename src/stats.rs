//! Database statistics and health overview.
//!
//! A quick summary of the dedup state: how many records are canonical
//! vs merged, how the candidate queue is distributed across statuses,
//! and how much audit data has accumulated. Used by `pdd stats` to give
//! confidence that populate/merge runs are behaving. Mutates nothing.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_places: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM places")
        .fetch_one(&pool)
        .await?;

    let canonical: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM places WHERE is_canonical = 1 AND active = 1")
            .fetch_one(&pool)
            .await?;

    let merged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM places WHERE is_canonical = 0")
        .fetch_one(&pool)
        .await?;

    let mappings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_mappings")
        .fetch_one(&pool)
        .await?;

    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM merge_history")
        .fetch_one(&pool)
        .await?;

    println!("Place Dedup — Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!();
    println!("  Places:      {}", total_places);
    println!("  Canonical:   {}", canonical);
    println!("  Merged away: {}", merged);
    println!("  Mappings:    {}", mappings);
    println!("  Merge log:   {}", history);

    // Candidate queue breakdown
    let status_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM duplicate_candidates GROUP BY status ORDER BY status",
    )
    .fetch_all(&pool)
    .await?;

    if !status_rows.is_empty() {
        println!();
        println!("  Candidates:");
        for row in &status_rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            println!("    {:<10} {}", status, n);
        }
    }

    pool.close().await;
    Ok(())
}
