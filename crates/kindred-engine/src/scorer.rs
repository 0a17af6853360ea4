//! Questionnaire compatibility score.

use std::collections::BTreeMap;

use kindred_types::models::{PersonalityVector, ScenarioVector};

/// Returned when two users have no scenario in common.
pub const NEUTRAL_SCORE: u8 = 50;

/// Cosine similarity in [-1, 1]. Zero when either side has no magnitude or
/// the two vectors do not cover the same traits.
pub fn cosine_similarity(a: &PersonalityVector, b: &PersonalityVector) -> f64 {
    let Some(pairs) = a.aligned(b) else {
        return 0.0;
    };

    let (dot, mag_a, mag_b) = pairs
        .iter()
        .fold((0.0, 0.0, 0.0), |(dot, ma, mb), (x, y)| {
            (dot + x * y, ma + x * x, mb + y * y)
        });

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

/// Averages per-scenario similarity over the scenarios both users answered
/// and maps it onto 0..=100.
pub fn score(a: &[ScenarioVector], b: &[ScenarioVector]) -> u8 {
    let theirs: BTreeMap<i64, &PersonalityVector> =
        b.iter().map(|s| (s.scenario_id, &s.vector)).collect();

    let similarities: Vec<f64> = a
        .iter()
        .filter_map(|s| theirs.get(&s.scenario_id).map(|v| cosine_similarity(&s.vector, v)))
        .collect();

    if similarities.is_empty() {
        return NEUTRAL_SCORE;
    }

    let avg = similarities.iter().sum::<f64>() / similarities.len() as f64;
    (((avg + 1.0) / 2.0) * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(scenario_id: i64, weights: &[(&str, f64)]) -> ScenarioVector {
        ScenarioVector {
            scenario_id,
            vector: PersonalityVector::new(weights.iter().map(|(k, v)| (*k, *v))),
        }
    }

    #[test]
    fn identical_vectors_score_100() {
        let a = vec![
            sv(1, &[("calm", 0.8), ("direct", 0.2)]),
            sv(2, &[("ambition", 0.5), ("family", 0.9)]),
        ];
        assert_eq!(score(&a, &a.clone()), 100);
    }

    #[test]
    fn opposite_vectors_score_0() {
        let a = vec![sv(1, &[("calm", 1.0), ("direct", -0.5)])];
        let b = vec![sv(1, &[("calm", -1.0), ("direct", 0.5)])];
        assert_eq!(score(&a, &b), 0);
    }

    #[test]
    fn nothing_shared_is_neutral() {
        let a = vec![sv(1, &[("calm", 1.0)])];
        let b = vec![sv(2, &[("calm", 1.0)])];
        assert_eq!(score(&a, &b), NEUTRAL_SCORE);
        assert_eq!(score(&[], &[]), NEUTRAL_SCORE);
    }

    #[test]
    fn orthogonal_vectors_land_in_the_middle() {
        let a = vec![sv(1, &[("x", 1.0), ("y", 0.0)])];
        let b = vec![sv(1, &[("x", 0.0), ("y", 1.0)])];
        assert_eq!(score(&a, &b), 50);
    }

    #[test]
    fn zero_magnitude_counts_as_zero_similarity() {
        let a = vec![sv(1, &[("x", 0.0), ("y", 0.0)])];
        let b = vec![sv(1, &[("x", 1.0), ("y", 1.0)])];
        assert_eq!(cosine_similarity(&a[0].vector, &b[0].vector), 0.0);
        assert_eq!(score(&a, &b), 50);
    }

    #[test]
    fn mismatched_traits_count_as_zero_similarity() {
        let a = sv(1, &[("x", 1.0), ("y", 1.0)]);
        let b = sv(1, &[("x", 1.0), ("z", 1.0)]);
        let c = sv(1, &[("x", 1.0)]);
        assert_eq!(cosine_similarity(&a.vector, &b.vector), 0.0);
        assert_eq!(cosine_similarity(&a.vector, &c.vector), 0.0);
    }

    #[test]
    fn averages_across_shared_scenarios() {
        // one identical (1.0), one opposite (-1.0): average 0 -> 50
        let a = vec![sv(1, &[("x", 1.0)]), sv(2, &[("x", 1.0)]), sv(3, &[("x", 1.0)])];
        let b = vec![sv(1, &[("x", 2.0)]), sv(2, &[("x", -1.0)])];
        assert_eq!(score(&a, &b), 50);
    }

    #[test]
    fn deterministic() {
        let a = vec![sv(1, &[("x", 0.3), ("y", 0.7)]), sv(4, &[("p", 0.1), ("q", 0.4)])];
        let b = vec![sv(1, &[("x", 0.6), ("y", 0.2)]), sv(4, &[("p", 0.9), ("q", 0.3)])];
        let first = score(&a, &b);
        for _ in 0..10 {
            assert_eq!(score(&a, &b), first);
        }
    }
}
