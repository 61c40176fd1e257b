use crate::models::{PreferenceWeights, RatedInteraction};

/// Midpoint of the 1-5 rating scale, used for dimensions nobody rated
const NEUTRAL_RATING: f64 = 3.0;
const MAX_RATING: f64 = 5.0;
const MIN_WEIGHT: f64 = 0.5;

/// Derives relative emphasis weights from a user's ratings.
///
/// Each of the four dimensions is averaged over the ratings that supplied it
/// and the averages are rescaled into `[0.5, 1.0]` relative to each other: the
/// dimension the user rates highest gets `1.0`, the lowest `0.5`. This measures
/// emphasis among the user's own ratings, not absolute satisfaction, so a user
/// who rates everything highly still gets a usable signal.
///
/// With no ratings at all the weights are neutral.
pub fn analyze(rated: &[RatedInteraction]) -> PreferenceWeights {
    if rated.is_empty() {
        return PreferenceWeights::NEUTRAL;
    }

    let durability = average(rated.iter().filter_map(|r| r.durability_rating)).unwrap_or(NEUTRAL_RATING);
    let repairability =
        average(rated.iter().filter_map(|r| r.repairability_rating)).unwrap_or(NEUTRAL_RATING);
    let warranty = average(rated.iter().filter_map(|r| r.warranty_rating)).unwrap_or(NEUTRAL_RATING);
    let value = average(rated.iter().filter_map(|r| r.value_rating)).unwrap_or(NEUTRAL_RATING);

    let averages = [durability, repairability, warranty, value];
    let max_avg = averages.iter().copied().fold(f64::MIN, f64::max);
    let min_avg = averages.iter().copied().fold(f64::MAX, f64::min);
    let range = max_avg - min_avg;

    let weight = |avg: f64| {
        if range == 0.0 {
            // Every dimension is tied for the highest average
            1.0
        } else {
            MIN_WEIGHT + (avg - min_avg) / range * (1.0 - MIN_WEIGHT)
        }
    };

    let overall_preference = average(rated.iter().filter_map(|r| r.overall_rating))
        .map(|avg| (avg / MAX_RATING).clamp(0.0, 1.0))
        .unwrap_or(1.0);

    PreferenceWeights {
        durability: weight(durability),
        repairability: weight(repairability),
        warranty: weight(warranty),
        value: weight(value),
        overall_preference,
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(
        durability: Option<f64>,
        repairability: Option<f64>,
        warranty: Option<f64>,
        value: Option<f64>,
        overall: Option<f64>,
    ) -> RatedInteraction {
        RatedInteraction {
            durability_rating: durability,
            repairability_rating: repairability,
            warranty_rating: warranty,
            value_rating: value,
            overall_rating: overall,
        }
    }

    fn dimensions(w: &PreferenceWeights) -> [f64; 4] {
        [w.durability, w.repairability, w.warranty, w.value]
    }

    #[test]
    fn test_empty_input_is_neutral() {
        assert_eq!(analyze(&[]), PreferenceWeights::NEUTRAL);
    }

    #[test]
    fn test_highest_dimension_gets_full_weight() {
        let weights = analyze(&[
            rating(Some(5.0), Some(2.0), Some(3.0), Some(4.0), Some(4.0)),
            rating(Some(5.0), Some(2.0), Some(4.0), Some(4.0), Some(5.0)),
        ]);

        assert_eq!(weights.durability, 1.0);
        assert_eq!(weights.repairability, 0.5);
        // warranty avg 3.5 over range [2, 5]
        assert!((weights.warranty - 0.75).abs() < 1e-9);
        assert!((weights.value - (0.5 + 2.0 / 3.0 * 0.5)).abs() < 1e-9);
        assert!((weights.overall_preference - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_missing_dimensions_use_midpoint() {
        let weights = analyze(&[rating(Some(5.0), None, None, Some(1.0), None)]);

        assert_eq!(weights.durability, 1.0);
        assert_eq!(weights.value, 0.5);
        assert_eq!(weights.repairability, 0.75);
        assert_eq!(weights.warranty, 0.75);
        assert_eq!(weights.overall_preference, 1.0);
    }

    #[test]
    fn test_uniformly_high_ratings_still_differentiate() {
        let weights = analyze(&[rating(Some(5.0), Some(4.5), Some(4.8), Some(4.6), Some(5.0))]);

        assert_eq!(weights.durability, 1.0);
        assert_eq!(weights.repairability, 0.5);
        assert!(weights.warranty > weights.value);
    }

    #[test]
    fn test_flat_ratings_give_full_weights() {
        let weights = analyze(&[rating(Some(4.0), Some(4.0), Some(4.0), Some(4.0), Some(2.0))]);

        assert_eq!(dimensions(&weights), [1.0; 4]);
        assert!((weights.overall_preference - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_weights_stay_in_bounds() {
        let samples = [
            vec![rating(Some(1.0), Some(5.0), None, None, Some(1.0))],
            vec![
                rating(Some(2.0), None, Some(3.0), Some(1.0), None),
                rating(None, Some(4.0), Some(5.0), None, Some(3.0)),
            ],
            vec![rating(None, None, None, None, None)],
            vec![
                rating(Some(3.3), Some(3.2), Some(3.1), Some(3.0), Some(5.0)),
                rating(Some(1.0), Some(1.0), Some(5.0), Some(2.0), Some(1.0)),
            ],
        ];

        for sample in &samples {
            let weights = analyze(sample);
            for w in dimensions(&weights) {
                assert!((0.5..=1.0).contains(&w), "weight {} out of bounds", w);
            }
            assert!((0.0..=1.0).contains(&weights.overall_preference));
            let max = dimensions(&weights).into_iter().fold(f64::MIN, f64::max);
            assert_eq!(max, 1.0);
        }
    }
}
