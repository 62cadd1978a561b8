//! Idempotent schema creation.
//!
//! `pdd init` must be safe to run repeatedly: every statement is either
//! `CREATE ... IF NOT EXISTS` or guarded. The dedup engine refuses to run
//! against a database where these structures are missing, so this is the
//! required first step for a fresh deployment.

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Place records. List-valued attributes are JSON arrays in TEXT
    // columns. A non-canonical row always points at a canonical row via
    // canonical_id; merged rows are demoted, never deleted.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS places (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            altitude REAL,
            street TEXT,
            city TEXT,
            postal_code TEXT,
            country TEXT,
            phone TEXT,
            email TEXT,
            website TEXT,
            price_info TEXT,
            amenities TEXT NOT NULL DEFAULT '[]',
            features TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            images TEXT NOT NULL DEFAULT '[]',
            rating REAL,
            rating_count INTEGER,
            review_count INTEGER NOT NULL DEFAULT 0,
            is_canonical INTEGER NOT NULL DEFAULT 1,
            canonical_id INTEGER REFERENCES places(id),
            merged_at INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            source_count INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(source, external_id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Duplicate candidates. place_a < place_b always, so the UNIQUE
    // constraint guarantees one row per unordered pair.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_candidates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            place_a INTEGER NOT NULL REFERENCES places(id),
            place_b INTEGER NOT NULL REFERENCES places(id),
            distance_m REAL NOT NULL,
            name_similarity REAL NOT NULL,
            geo_score REAL NOT NULL,
            name_score REAL NOT NULL,
            confidence REAL NOT NULL,
            same_city INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            resolved_by TEXT,
            resolved_at INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(place_a, place_b),
            CHECK(place_a < place_b),
            CHECK(status IN ('pending', 'confirmed', 'rejected', 'merged'))
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Source mappings: (source, external_id) -> current canonical record.
    // Re-importing from a source after a merge updates the canonical row
    // instead of recreating a duplicate.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_mappings (
            source TEXT NOT NULL,
            external_id TEXT NOT NULL,
            canonical_place_id INTEGER NOT NULL REFERENCES places(id),
            has_description INTEGER NOT NULL DEFAULT 0,
            has_images INTEGER NOT NULL DEFAULT 0,
            has_rating INTEGER NOT NULL DEFAULT 0,
            last_synced_at INTEGER NOT NULL,
            PRIMARY KEY(source, external_id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Merge history: append-only audit log, one row per merge.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merge_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_id INTEGER NOT NULL REFERENCES places(id),
            merged_id INTEGER NOT NULL REFERENCES places(id),
            merged_source TEXT NOT NULL,
            merged_external_id TEXT NOT NULL,
            changes TEXT NOT NULL DEFAULT '{}',
            merged_by TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Reviews hold a foreign reference that merges must reassign to the
    // surviving record.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            place_id INTEGER NOT NULL REFERENCES places(id),
            rating REAL,
            comment TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_places_canonical ON places(is_canonical, active)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_places_source ON places(source)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_candidates_status_confidence \
         ON duplicate_candidates(status, confidence DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_place ON reviews(place_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
