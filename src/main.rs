//! # Place Dedup CLI (`pdd`)
//!
//! Operator entry points for the deduplication engine.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdd init` | Create the SQLite database and run schema migrations |
//! | `pdd stats` | Statistics-only report (mutates nothing) |
//! | `pdd candidates` | List top pending candidates for manual review |
//! | `pdd populate` | Discover and persist new pending candidate pairs |
//! | `pdd resolve <id>` | Manually confirm or reject a pending candidate |
//! | `pdd merge` | Auto-merge high-confidence pairs |
//! | `pdd backfill` | Backfill source mappings for unmapped canonical records |
//! | `pdd run` | Full pass: populate, auto-merge, backfill |
//!
//! A non-zero per-pair error count shows up in the summary but does not
//! change the exit status; the process only exits non-zero when a run
//! fails to start (unreadable config, unreachable storage).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use place_dedup::{batch, candidates, config, migrate, stats};

/// Place Dedup — batch deduplication and canonical-merge engine for
/// place records.
#[derive(Parser)]
#[command(
    name = "pdd",
    about = "Place Dedup — batch deduplication and canonical-merge engine for place records",
    version,
    long_about = "Place Dedup converges place records ingested from many external sources \
    into one canonical record per real-world place: it proposes candidate duplicate pairs \
    from geographic proximity and name similarity, merges high-confidence pairs without \
    losing data, and keeps a durable audit trail so batches are idempotent and re-runnable."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (places,
    /// duplicate_candidates, source_mappings, merge_history, reviews).
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Print dedup statistics: place counts by canonical state and
    /// candidate counts by status. Mutates nothing.
    Stats,

    /// List pending candidates above a confidence threshold, most
    /// confident first, without mutating anything.
    Candidates {
        /// Minimum confidence (0–100); defaults to merge.min_confidence.
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Maximum number of candidates to list.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Run the candidate finder and persist new pending pairs.
    ///
    /// Pairs that already exist — in any status, either id order — are
    /// skipped, so rejected pairs are never re-proposed.
    Populate {
        /// Geo proximity threshold in meters.
        #[arg(long)]
        max_distance: Option<f64>,

        /// Minimum name similarity (0–1).
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Minimum confidence (0–100) for a pair to be persisted.
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Cap on pairs considered in this scan.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manually resolve a pending candidate.
    Resolve {
        /// Candidate id (from `pdd candidates`).
        candidate_id: i64,

        /// Mark the pair as a confirmed duplicate.
        #[arg(long, conflicts_with = "reject")]
        confirm: bool,

        /// Mark the pair as not a duplicate; it will never be re-proposed.
        #[arg(long)]
        reject: bool,

        /// Reviewer identity recorded on the candidate.
        #[arg(long, default_value = "operator")]
        resolver: String,
    },

    /// Auto-merge high-confidence candidate pairs.
    ///
    /// Processes pending/confirmed candidates at or above the threshold,
    /// most confident first. Stale pairs are skipped; per-pair failures
    /// are logged and counted without aborting the batch.
    Merge {
        /// Minimum confidence (0–100); defaults to merge.min_confidence.
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Cap on merges performed in this batch.
        #[arg(long)]
        max_merges: Option<u64>,

        /// List what would merge without mutating anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Backfill source mappings for canonical records not yet mapped.
    Backfill,

    /// Full pass: populate candidates, auto-merge, backfill mappings.
    Run {
        /// Geo proximity threshold in meters.
        #[arg(long)]
        max_distance: Option<f64>,

        /// Minimum name similarity (0–1).
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Minimum confidence (0–100) for persisting and merging.
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Cap on merges performed in this batch.
        #[arg(long)]
        max_merges: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Candidates {
            min_confidence,
            limit,
        } => {
            candidates::run_candidates(&cfg, min_confidence, limit).await?;
        }
        Commands::Populate {
            max_distance,
            min_similarity,
            min_confidence,
            limit,
        } => {
            candidates::run_populate(&cfg, max_distance, min_similarity, min_confidence, limit)
                .await?;
        }
        Commands::Resolve {
            candidate_id,
            confirm,
            reject,
            resolver,
        } => {
            if confirm == reject {
                anyhow::bail!("Pass exactly one of --confirm or --reject");
            }
            candidates::run_resolve(&cfg, candidate_id, confirm, &resolver).await?;
        }
        Commands::Merge {
            min_confidence,
            max_merges,
            dry_run,
        } => {
            batch::run_merge(&cfg, min_confidence, max_merges, dry_run).await?;
        }
        Commands::Backfill => {
            batch::run_backfill(&cfg).await?;
        }
        Commands::Run {
            max_distance,
            min_similarity,
            min_confidence,
            max_merges,
        } => {
            batch::run_full(&cfg, max_distance, min_similarity, min_confidence, max_merges).await?;
        }
    }

    Ok(())
}
