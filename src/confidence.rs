//! Pair-confidence scoring.
//!
//! Combines a geo-proximity sub-score and a name-similarity sub-score
//! (plus a same-city signal) into one 0–100 confidence value. The
//! functions here are pure and identity-independent, so the same
//! geo/name inputs always reproduce the same confidence across runs.
//! The candidate finder persists these scores; the auto-merge threshold
//! is compared against the overall value.

const GEO_WEIGHT: f64 = 0.45;
const NAME_WEIGHT: f64 = 0.45;
const SAME_CITY_BONUS: f64 = 10.0;

/// Geo sub-score (0–100): full marks at zero distance, falling linearly
/// to zero at the matcher's distance threshold.
pub fn geo_score(distance_m: f64, max_distance_m: f64) -> f64 {
    if max_distance_m <= 0.0 {
        return 0.0;
    }
    ((1.0 - distance_m / max_distance_m) * 100.0).clamp(0.0, 100.0)
}

/// Name sub-score (0–100) from a 0–1 similarity.
pub fn name_score(similarity: f64) -> f64 {
    (similarity * 100.0).clamp(0.0, 100.0)
}

/// Overall confidence (0–100). Monotonic in both sub-scores.
pub fn confidence(geo_score: f64, name_score: f64, same_city: bool) -> f64 {
    let bonus = if same_city { SAME_CITY_BONUS } else { 0.0 };
    (GEO_WEIGHT * geo_score + NAME_WEIGHT * name_score + bonus).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_stays_in_bounds() {
        assert_eq!(confidence(0.0, 0.0, false), 0.0);
        assert_eq!(confidence(100.0, 100.0, true), 100.0);
        assert!(confidence(100.0, 100.0, false) <= 100.0);
    }

    #[test]
    fn confidence_is_monotonic_in_each_input() {
        let base = confidence(50.0, 50.0, false);
        assert!(confidence(60.0, 50.0, false) > base);
        assert!(confidence(50.0, 60.0, false) > base);
        assert!(confidence(50.0, 50.0, true) > base);
    }

    #[test]
    fn geo_score_falls_linearly_with_distance() {
        assert_eq!(geo_score(0.0, 200.0), 100.0);
        assert_eq!(geo_score(100.0, 200.0), 50.0);
        assert_eq!(geo_score(200.0, 200.0), 0.0);
        assert_eq!(geo_score(500.0, 200.0), 0.0);
    }

    #[test]
    fn name_score_scales_similarity() {
        assert_eq!(name_score(0.0), 0.0);
        assert_eq!(name_score(0.8), 80.0);
        assert_eq!(name_score(1.0), 100.0);
    }
}
