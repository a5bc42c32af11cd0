//! Pairwise similarity scoring for duplicate detection
//!
//! Three signals in [0,1]: normalized name similarity (Jaro-Winkler),
//! geographic proximity (linear decay with distance), and address token
//! overlap (Jaccard). Combined via the configured weighted average with
//! name similarity weighted highest.

use refill_common::config::DedupConfig;
use refill_common::models::Coordinates;
use std::collections::HashSet;
use strsim::jaro_winkler;

/// Strip everything but letters and digits (Hangul included), lowercase
///
/// "Kim's BBQ" and "Kims BBQ", or "맛있는 삼겹살집" and "맛있는삼겹살집",
/// normalize to the same string.
pub fn normalized_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Name similarity on normalized forms, in [0,1]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    jaro_winkler(a, b)
}

/// Whitespace-token Jaccard overlap of two address strings
pub fn address_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let tokens_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

/// Proximity score decaying linearly to 0 at `max_distance_m`
pub fn proximity_score(distance_m: f64, max_distance_m: f64) -> f64 {
    (1.0 - distance_m / max_distance_m).clamp(0.0, 1.0)
}

/// Weighted combination of the three signals
pub fn combined_score(
    config: &DedupConfig,
    name_sim: f64,
    proximity: f64,
    address_sim: f64,
) -> f64 {
    let weight_sum = config.name_weight + config.proximity_weight + config.address_weight;
    (config.name_weight * name_sim
        + config.proximity_weight * proximity
        + config.address_weight * address_sim)
        / weight_sum
}

/// Full pair score from names, coordinates and addresses
pub fn pair_score(
    config: &DedupConfig,
    name_a: &str,
    name_b: &str,
    coords_a: &Coordinates,
    coords_b: &Coordinates,
    address_a: &str,
    address_b: &str,
) -> f64 {
    let distance = coords_a.distance_m(coords_b);
    if distance > config.max_duplicate_distance_m {
        return 0.0;
    }
    combined_score(
        config,
        name_similarity(name_a, name_b),
        proximity_score(distance, config.max_duplicate_distance_m),
        address_overlap(address_a, address_b),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_removes_punctuation_and_spacing() {
        assert_eq!(normalized_name("Kim's BBQ"), normalized_name("Kims BBQ"));
        assert_eq!(
            normalized_name("맛있는 삼겹살집"),
            normalized_name("맛있는삼겹살집")
        );
    }

    #[test]
    fn identical_names_score_one() {
        let a = normalized_name("스시로 강남점");
        assert_eq!(name_similarity(&a, &a), 1.0);
    }

    #[test]
    fn unrelated_names_score_low() {
        let a = normalized_name("피자헤븐");
        let b = normalized_name("국밥명가");
        assert!(name_similarity(&a, &b) < 0.6);
    }

    #[test]
    fn empty_name_scores_zero() {
        assert_eq!(name_similarity("", "anything"), 0.0);
    }

    #[test]
    fn address_overlap_partial() {
        let overlap = address_overlap("서울 강남구 테헤란로 123", "서울 강남구 테헤란로 125");
        assert!(overlap > 0.5 && overlap < 1.0, "overlap = {}", overlap);
        assert_eq!(address_overlap("서울 강남구", "서울 강남구"), 1.0);
    }

    #[test]
    fn proximity_decays_with_distance() {
        assert_eq!(proximity_score(0.0, 100.0), 1.0);
        assert_eq!(proximity_score(50.0, 100.0), 0.5);
        assert_eq!(proximity_score(150.0, 100.0), 0.0);
    }

    #[test]
    fn near_identical_listings_exceed_threshold() {
        let config = DedupConfig::default();
        let score = pair_score(
            &config,
            &normalized_name("Kim's BBQ"),
            &normalized_name("Kims BBQ"),
            &Coordinates::new(37.50, 127.03),
            &Coordinates::new(37.5001, 127.0301),
            "123 Main",
            "123 Main St",
        );
        assert!(score >= config.similarity_threshold, "score = {}", score);
    }

    #[test]
    fn distant_pair_scores_zero() {
        let config = DedupConfig::default();
        let score = pair_score(
            &config,
            &normalized_name("같은이름"),
            &normalized_name("같은이름"),
            &Coordinates::new(37.50, 127.03),
            &Coordinates::new(37.60, 127.03), // ~11 km apart
            "서울 강남구",
            "서울 강북구",
        );
        assert_eq!(score, 0.0);
    }
}
