use serde::{Deserialize, Serialize};

/// One review's ratings, each on a 1-5 scale. Any dimension may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RatedInteraction {
    #[serde(default)]
    pub durability_rating: Option<f64>,
    #[serde(default)]
    pub repairability_rating: Option<f64>,
    #[serde(default)]
    pub warranty_rating: Option<f64>,
    #[serde(default)]
    pub value_rating: Option<f64>,
    #[serde(default)]
    pub overall_rating: Option<f64>,
}

/// Relative emphasis a user places on each rated dimension.
///
/// Dimension weights lie in `[0.5, 1.0]`; `overall_preference` lies in `[0.0, 1.0]`.
/// Derived on demand, never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PreferenceWeights {
    pub durability: f64,
    pub repairability: f64,
    pub warranty: f64,
    pub value: f64,
    pub overall_preference: f64,
}

impl PreferenceWeights {
    /// Weights that leave catalog scores unchanged in relative terms
    pub const NEUTRAL: PreferenceWeights = PreferenceWeights {
        durability: 1.0,
        repairability: 1.0,
        warranty: 1.0,
        value: 1.0,
        overall_preference: 1.0,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    /// Name of the dimension with the largest weight (first wins on ties)
    pub fn strongest_dimension(&self) -> &'static str {
        [
            ("durability", self.durability),
            ("repairability", self.repairability),
            ("warranty", self.warranty),
            ("value", self.value),
        ]
        .into_iter()
        .fold(("durability", f64::MIN), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0
    }
}

impl Default for PreferenceWeights {
    fn default() -> Self {
        Self::NEUTRAL
    }
}
