//! End-to-end tests for the dedup engine over a temporary SQLite
//! database: populate → auto-merge → audit trail, plus the invariants
//! that make batches safely re-runnable.

use sqlx::SqlitePool;
use tempfile::TempDir;

use place_dedup::batch::{auto_merge, backfill_mappings};
use place_dedup::candidates::{populate_candidates, pending_candidates, resolve_candidate};
use place_dedup::config::{Config, DbConfig, MatchingConfig, MergeConfig};
use place_dedup::matcher::GeoMatcher;
use place_dedup::db;
use place_dedup::merge::{merge, MergeError};
use place_dedup::migrate;
use place_dedup::models::CandidateStatus;
use place_dedup::select::{fetch_place, select_canonical};

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: tmp.path().join("places.sqlite"),
        },
        matching: MatchingConfig::default(),
        merge: MergeConfig::default(),
    };
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    (tmp, config, pool)
}

struct Seed {
    source: &'static str,
    external_id: &'static str,
    name: &'static str,
    lat: f64,
    lng: f64,
    city: Option<&'static str>,
    description: Option<String>,
    rating: Option<f64>,
    rating_count: Option<i64>,
    review_count: i64,
    phone: Option<&'static str>,
}

impl Default for Seed {
    fn default() -> Self {
        Seed {
            source: "park4night",
            external_id: "p1",
            name: "Camping Les Pins",
            lat: 45.900,
            lng: 6.120,
            city: Some("Annecy"),
            description: None,
            rating: None,
            rating_count: None,
            review_count: 0,
            phone: None,
        }
    }
}

async fn seed_place(pool: &SqlitePool, seed: Seed) -> i64 {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO places
            (source, external_id, name, description, lat, lng, city,
             rating, rating_count, review_count, phone, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(seed.source)
    .bind(seed.external_id)
    .bind(seed.name)
    .bind(&seed.description)
    .bind(seed.lat)
    .bind(seed.lng)
    .bind(seed.city)
    .bind(seed.rating)
    .bind(seed.rating_count)
    .bind(seed.review_count)
    .bind(seed.phone)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    result.last_insert_rowid()
}

async fn seed_candidate(pool: &SqlitePool, a: i64, b: i64, confidence: f64) {
    let (a, b) = if a < b { (a, b) } else { (b, a) };
    sqlx::query(
        "INSERT INTO duplicate_candidates \
         (place_a, place_b, distance_m, name_similarity, geo_score, name_score, \
          confidence, same_city, status, created_at) \
         VALUES (?, ?, 10.0, 0.9, 90.0, 90.0, ?, 1, 'pending', ?)",
    )
    .bind(a)
    .bind(b)
    .bind(confidence)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await
    .unwrap();
}

async fn populate(pool: &SqlitePool, config: &Config) -> u64 {
    let matcher = GeoMatcher::new(pool.clone());
    populate_candidates(
        pool,
        &matcher,
        config.matching.max_distance_m,
        config.matching.min_name_similarity,
        config.matching.max_results,
        0.0,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn populate_then_auto_merge_end_to_end() {
    let (_tmp, config, pool) = setup().await;

    let a = seed_place(&pool, Seed::default()).await;
    let b = seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            name: "Camping les Pins!",
            lat: 45.9001,
            lng: 6.1201,
            ..Seed::default()
        },
    )
    .await;
    // A third place far away must not pair with either.
    seed_place(
        &pool,
        Seed {
            source: "osm",
            external_id: "o1",
            name: "Camping Les Pins",
            lat: 48.85,
            lng: 2.35,
            city: Some("Paris"),
            ..Seed::default()
        },
    )
    .await;

    // A review on the soon-to-be-absorbed record.
    sqlx::query("INSERT INTO reviews (place_id, rating, comment, created_at) VALUES (?, 5.0, 'quiet', 0)")
        .bind(b)
        .execute(&pool)
        .await
        .unwrap();

    let inserted = populate(&pool, &config).await;
    assert_eq!(inserted, 1);

    let report = auto_merge(&pool, 0.0, 100, "test", 20).await.unwrap();
    assert_eq!(report.merged, 1);
    assert_eq!(report.errors, 0);

    // One of the pair survives canonical, the other is demoted to it.
    let pa = fetch_place(&pool, a).await.unwrap().unwrap();
    let pb = fetch_place(&pool, b).await.unwrap().unwrap();
    let (canon, absorbed) = if pa.is_canonical { (pa, pb) } else { (pb, pa) };
    assert!(canon.is_canonical && canon.active && canon.canonical_id.is_none());
    assert!(!absorbed.is_canonical && !absorbed.active);
    assert_eq!(absorbed.canonical_id, Some(canon.id));
    assert!(absorbed.merged_at.is_some());
    assert_eq!(canon.source_count, 2);

    // Candidate row is terminal.
    let status: String =
        sqlx::query_scalar("SELECT status FROM duplicate_candidates WHERE place_a = ? AND place_b = ?")
            .bind(a.min(b))
            .bind(a.max(b))
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "merged");

    // Source mapping points the absorbed source at the canonical id.
    let mapped: i64 = sqlx::query_scalar(
        "SELECT canonical_place_id FROM source_mappings WHERE source = ? AND external_id = ?",
    )
    .bind(&absorbed.source)
    .bind(&absorbed.external_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(mapped, canon.id);

    // Audit row written, review reassigned.
    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM merge_history")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(history, 1);
    let review_target: i64 = sqlx::query_scalar("SELECT place_id FROM reviews LIMIT 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(review_target, canon.id);
}

#[tokio::test]
async fn auto_merge_twice_is_idempotent() {
    let (_tmp, config, pool) = setup().await;

    seed_place(&pool, Seed::default()).await;
    seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            lat: 45.9001,
            lng: 6.1201,
            ..Seed::default()
        },
    )
    .await;

    populate(&pool, &config).await;
    let first = auto_merge(&pool, 0.0, 100, "test", 20).await.unwrap();
    assert_eq!(first.merged, 1);

    let second = auto_merge(&pool, 0.0, 100, "test", 20).await.unwrap();
    assert_eq!(second.merged, 0);
    assert_eq!(second.errors, 0);
}

#[tokio::test]
async fn merged_records_never_chain() {
    let (_tmp, config, pool) = setup().await;

    // Three records for the same physical place; merges are pairwise and
    // re-evaluated on the next pass.
    for (source, ext) in [("park4night", "p1"), ("google_places", "g1"), ("osm", "o1")] {
        seed_place(
            &pool,
            Seed {
                source,
                external_id: ext,
                ..Seed::default()
            },
        )
        .await;
    }

    for _ in 0..3 {
        populate(&pool, &config).await;
        auto_merge(&pool, 0.0, 100, "test", 20).await.unwrap();
    }

    let canonical_left: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM places WHERE is_canonical = 1 AND active = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(canonical_left, 1);

    // No non-canonical record may point at another non-canonical record.
    let chained: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM places p \
         JOIN places target ON target.id = p.canonical_id \
         WHERE p.is_canonical = 0 AND target.is_canonical = 0",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(chained, 0);

    let dangling: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM places WHERE is_canonical = 0 AND canonical_id IS NULL")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(dangling, 0);
}

#[tokio::test]
async fn merged_pair_is_not_reproposed() {
    let (_tmp, config, pool) = setup().await;

    seed_place(&pool, Seed::default()).await;
    seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            lat: 45.9001,
            ..Seed::default()
        },
    )
    .await;

    assert_eq!(populate(&pool, &config).await, 1);
    auto_merge(&pool, 0.0, 100, "test", 20).await.unwrap();

    // Same inputs again: no new pending row for the merged pair.
    assert_eq!(populate(&pool, &config).await, 0);
    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM duplicate_candidates WHERE status = 'pending'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(pending, 0);
}

#[tokio::test]
async fn rejected_pair_is_not_reproposed() {
    let (_tmp, config, pool) = setup().await;

    seed_place(&pool, Seed::default()).await;
    seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            lat: 45.9001,
            ..Seed::default()
        },
    )
    .await;

    populate(&pool, &config).await;
    let id: i64 = sqlx::query_scalar("SELECT id FROM duplicate_candidates")
        .fetch_one(&pool)
        .await
        .unwrap();
    resolve_candidate(&pool, id, CandidateStatus::Rejected, "reviewer")
        .await
        .unwrap();

    assert_eq!(populate(&pool, &config).await, 0);
    let status: String = sqlx::query_scalar("SELECT status FROM duplicate_candidates WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "rejected");

    // Rejected pairs are never auto-merged either.
    let report = auto_merge(&pool, 0.0, 100, "test", 20).await.unwrap();
    assert_eq!(report.merged, 0);
}

#[tokio::test]
async fn stale_candidate_is_skipped_not_failed() {
    let (_tmp, _config, pool) = setup().await;

    let a = seed_place(&pool, Seed::default()).await;
    let b = seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            ..Seed::default()
        },
    )
    .await;
    let c = seed_place(
        &pool,
        Seed {
            source: "osm",
            external_id: "o1",
            ..Seed::default()
        },
    )
    .await;

    // (a,b) merges first at higher confidence and absorbs a (google_places
    // outranks park4night on equal data), so (a,c) then finds a stale pair.
    seed_candidate(&pool, a, b, 95.0).await;
    seed_candidate(&pool, a, c, 90.0).await;

    let report = auto_merge(&pool, 0.0, 100, "test", 20).await.unwrap();
    assert_eq!(report.merged, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn confirmed_candidates_auto_merge() {
    let (_tmp, _config, pool) = setup().await;

    let a = seed_place(&pool, Seed::default()).await;
    let b = seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            ..Seed::default()
        },
    )
    .await;
    seed_candidate(&pool, a, b, 88.0).await;

    // Below the 95 threshold nothing merges; after confirmation a later
    // pass at a lower threshold picks it up.
    let high_bar = auto_merge(&pool, 95.0, 100, "test", 20).await.unwrap();
    assert_eq!(high_bar.merged, 0);

    let id: i64 = sqlx::query_scalar("SELECT id FROM duplicate_candidates")
        .fetch_one(&pool)
        .await
        .unwrap();
    resolve_candidate(&pool, id, CandidateStatus::Confirmed, "reviewer")
        .await
        .unwrap();

    let report = auto_merge(&pool, 85.0, 100, "test", 20).await.unwrap();
    assert_eq!(report.merged, 1);
}

#[tokio::test]
async fn quality_decides_the_survivor_and_ratings_blend() {
    let (_tmp, _config, pool) = setup().await;

    // park4night record with volume and a long description beats the
    // higher-trust google_places record with thin data.
    let a = seed_place(
        &pool,
        Seed {
            description: Some("d".repeat(300)),
            rating: Some(4.0),
            rating_count: Some(20),
            review_count: 20,
            ..Seed::default()
        },
    )
    .await;
    let b = seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            description: Some("d".repeat(50)),
            rating: Some(4.5),
            rating_count: Some(5),
            review_count: 5,
            phone: Some("+33 4 50 00 00"),
            ..Seed::default()
        },
    )
    .await;

    let (canonical_id, absorbed_id) = select_canonical(&pool, a, b).await.unwrap();
    assert_eq!((canonical_id, absorbed_id), (a, b));
    // Deterministic: repeated calls agree.
    assert_eq!(select_canonical(&pool, a, b).await.unwrap(), (a, b));

    let merged = merge(&pool, canonical_id, absorbed_id, "test", 20)
        .await
        .unwrap();
    assert!((merged.rating.unwrap() - 4.1).abs() < 1e-9);
    assert_eq!(merged.rating_count, Some(25));
    assert_eq!(merged.review_count, 25);
    assert_eq!(merged.description.as_ref().unwrap().len(), 300);
    assert_eq!(merged.phone.as_deref(), Some("+33 4 50 00 00"));

    let demoted = fetch_place(&pool, b).await.unwrap().unwrap();
    assert!(!demoted.is_canonical);
    assert_eq!(demoted.canonical_id, Some(a));
}

#[tokio::test]
async fn merge_preconditions_fail_distinctly() {
    let (_tmp, _config, pool) = setup().await;

    let a = seed_place(&pool, Seed::default()).await;
    let b = seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            ..Seed::default()
        },
    )
    .await;

    match merge(&pool, 9999, a, "test", 20).await {
        Err(MergeError::PlaceNotFound(9999)) => {}
        other => panic!("expected PlaceNotFound, got {other:?}"),
    }

    merge(&pool, a, b, "test", 20).await.unwrap();

    // b is absorbed now: merging it again is stale, in both roles.
    match merge(&pool, a, b, "test", 20).await {
        Err(e @ MergeError::AlreadyMerged(_)) => assert!(e.is_stale()),
        other => panic!("expected AlreadyMerged, got {other:?}"),
    }
    match merge(&pool, b, a, "test", 20).await {
        Err(e @ MergeError::NotCanonical(_)) => assert!(e.is_stale()),
        other => panic!("expected NotCanonical, got {other:?}"),
    }
}

#[tokio::test]
async fn pending_listing_orders_by_confidence() {
    let (_tmp, _config, pool) = setup().await;

    let a = seed_place(&pool, Seed::default()).await;
    let b = seed_place(
        &pool,
        Seed {
            source: "google_places",
            external_id: "g1",
            ..Seed::default()
        },
    )
    .await;
    let c = seed_place(
        &pool,
        Seed {
            source: "osm",
            external_id: "o1",
            name: "Aire du Lac",
            ..Seed::default()
        },
    )
    .await;

    seed_candidate(&pool, a, b, 72.0).await;
    seed_candidate(&pool, a, c, 91.0).await;

    let listings = pending_candidates(&pool, 0.0, 10).await.unwrap();
    assert_eq!(listings.len(), 2);
    assert!(listings[0].confidence >= listings[1].confidence);
    assert_eq!(listings[0].confidence, 91.0);
    assert_eq!(listings[0].name_a, "Camping Les Pins");

    // Threshold filters the weaker pair out.
    let filtered = pending_candidates(&pool, 80.0, 10).await.unwrap();
    assert_eq!(filtered.len(), 1);
}

#[tokio::test]
async fn backfill_is_idempotent() {
    let (_tmp, _config, pool) = setup().await;

    seed_place(&pool, Seed::default()).await;
    seed_place(
        &pool,
        Seed {
            source: "osm",
            external_id: "o1",
            name: "Aire du Lac",
            lat: 46.2,
            ..Seed::default()
        },
    )
    .await;

    assert_eq!(backfill_mappings(&pool).await.unwrap(), 2);
    assert_eq!(backfill_mappings(&pool).await.unwrap(), 0);
}
