/// Selection weight profiles for the left and right comparison slots.
///
/// The two profiles are independent, which allows asymmetric pairing: by
/// default the left slot chases uncertain, low-vote items while the right
/// slot prefers settled items to compare them against.
///
/// Weights are combined linearly in the priority score. They are not
/// probabilities and are never normalised.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RankError, RankResult};
use crate::types::Side;

/// Four non-negative weights of the priority score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub recency: f64,
    pub low_votes: f64,
    pub instability: f64,
    pub tier_size: f64,
}

impl WeightVector {
    pub const KEYS: [&'static str; 4] = ["recency", "low_votes", "instability", "tier_size"];

    pub const fn uniform(weight: f64) -> Self {
        WeightVector {
            recency: weight,
            low_votes: weight,
            instability: weight,
            tier_size: weight,
        }
    }

    fn components(&self) -> [(&'static str, f64); 4] {
        [
            ("recency", self.recency),
            ("low_votes", self.low_votes),
            ("instability", self.instability),
            ("tier_size", self.tier_size),
        ]
    }

    pub fn validate(&self) -> RankResult<()> {
        for (key, value) in self.components() {
            if !value.is_finite() {
                return Err(RankError::validation(key, format!("{value} is not a finite number")));
            }
            if value < 0.0 {
                return Err(RankError::validation(key, format!("{value} is negative")));
            }
        }
        Ok(())
    }

    /// Build from string-keyed input, requiring all four keys.
    pub fn from_map(map: &HashMap<String, f64>) -> RankResult<Self> {
        let get = |key: &str| {
            map.get(key)
                .copied()
                .ok_or_else(|| RankError::validation(key, "missing weight"))
        };
        let weights = WeightVector {
            recency: get("recency")?,
            low_votes: get("low_votes")?,
            instability: get("instability")?,
            tier_size: get("tier_size")?,
        };
        weights.validate()?;
        Ok(weights)
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        WeightVector::uniform(0.25)
    }
}

/// Polarity flags for the vote-count and stability components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriorityPreferences {
    /// Score settled items higher instead of volatile ones.
    pub prioritize_high_stability: bool,
    /// Score heavily-voted items higher instead of lightly-voted ones.
    pub prioritize_high_votes: bool,
    /// Persisted but not consulted by selection.
    #[serde(default)]
    pub prioritize_new_images: bool,
}

impl PriorityPreferences {
    /// Right-slot default: compare against settled, well-voted items.
    pub const fn settled() -> Self {
        PriorityPreferences {
            prioritize_high_stability: true,
            prioritize_high_votes: true,
            prioritize_new_images: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightManager {
    left_weights: WeightVector,
    right_weights: WeightVector,
    left_preferences: PriorityPreferences,
    right_preferences: PriorityPreferences,
}

impl Default for WeightManager {
    fn default() -> Self {
        WeightManager {
            left_weights: WeightVector::default(),
            right_weights: WeightVector::default(),
            left_preferences: PriorityPreferences::default(),
            right_preferences: PriorityPreferences::settled(),
        }
    }
}

impl WeightManager {
    pub fn weights(&self, side: Side) -> &WeightVector {
        match side {
            Side::Left => &self.left_weights,
            Side::Right => &self.right_weights,
        }
    }

    pub fn preferences(&self, side: Side) -> &PriorityPreferences {
        match side {
            Side::Left => &self.left_preferences,
            Side::Right => &self.right_preferences,
        }
    }

    pub fn left_weights(&self) -> WeightVector {
        self.left_weights
    }

    pub fn right_weights(&self) -> WeightVector {
        self.right_weights
    }

    pub fn left_preferences(&self) -> PriorityPreferences {
        self.left_preferences
    }

    pub fn right_preferences(&self) -> PriorityPreferences {
        self.right_preferences
    }

    pub fn set_weights(&mut self, side: Side, weights: WeightVector) -> RankResult<()> {
        weights.validate()?;
        match side {
            Side::Left => self.left_weights = weights,
            Side::Right => self.right_weights = weights,
        }
        Ok(())
    }

    pub fn set_left_weights(&mut self, weights: WeightVector) -> RankResult<()> {
        self.set_weights(Side::Left, weights)
    }

    pub fn set_right_weights(&mut self, weights: WeightVector) -> RankResult<()> {
        self.set_weights(Side::Right, weights)
    }

    /// Apply one profile to both slots.
    pub fn set_both_weights(&mut self, weights: WeightVector) -> RankResult<()> {
        weights.validate()?;
        self.left_weights = weights;
        self.right_weights = weights;
        Ok(())
    }

    pub fn set_preferences(&mut self, side: Side, preferences: PriorityPreferences) {
        match side {
            Side::Left => self.left_preferences = preferences,
            Side::Right => self.right_preferences = preferences,
        }
    }

    pub fn set_left_preferences(&mut self, preferences: PriorityPreferences) {
        self.set_preferences(Side::Left, preferences);
    }

    pub fn set_right_preferences(&mut self, preferences: PriorityPreferences) {
        self.set_preferences(Side::Right, preferences);
    }

    pub fn reset_to_defaults(&mut self) {
        *self = WeightManager::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let wm = WeightManager::default();
        assert_eq!(wm.left_weights(), WeightVector::uniform(0.25));
        assert!(!wm.left_preferences().prioritize_high_stability);
        assert!(wm.right_preferences().prioritize_high_stability);
        assert!(wm.right_preferences().prioritize_high_votes);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut wm = WeightManager::default();
        let bad = WeightVector { recency: -0.1, ..WeightVector::default() };
        let err = wm.set_left_weights(bad).unwrap_err();
        assert!(matches!(err, RankError::Validation { ref field, .. } if field == "recency"));
        assert_eq!(wm.left_weights(), WeightVector::default());
    }

    #[test]
    fn test_nan_weight_rejected() {
        let mut wm = WeightManager::default();
        let bad = WeightVector { tier_size: f64::NAN, ..WeightVector::default() };
        assert!(wm.set_right_weights(bad).is_err());
        assert_eq!(wm.right_weights(), WeightVector::default());
    }

    #[test]
    fn test_sides_are_independent() {
        let mut wm = WeightManager::default();
        let w = WeightVector { recency: 1.0, low_votes: 0.0, instability: 0.0, tier_size: 0.0 };
        wm.set_left_weights(w).unwrap();
        assert_eq!(wm.left_weights(), w);
        assert_eq!(wm.right_weights(), WeightVector::default());

        wm.set_both_weights(WeightVector::uniform(2.0)).unwrap();
        assert_eq!(wm.right_weights(), WeightVector::uniform(2.0));
    }

    #[test]
    fn test_from_map_requires_all_keys() {
        let mut map: HashMap<String, f64> = WeightVector::KEYS
            .iter()
            .map(|k| (k.to_string(), 0.5))
            .collect();
        assert_eq!(WeightVector::from_map(&map).unwrap(), WeightVector::uniform(0.5));

        map.remove("tier_size");
        let err = WeightVector::from_map(&map).unwrap_err();
        assert!(matches!(err, RankError::Validation { ref field, .. } if field == "tier_size"));
    }

    #[test]
    fn test_preferences_backfill_new_images_flag() {
        let prefs: PriorityPreferences = serde_json::from_str(
            r#"{"prioritize_high_stability": true, "prioritize_high_votes": false}"#,
        )
        .unwrap();
        assert!(prefs.prioritize_high_stability);
        assert!(!prefs.prioritize_new_images);
    }

    #[test]
    fn test_weight_vector_requires_all_keys_on_deserialize() {
        let res: Result<WeightVector, _> =
            serde_json::from_str(r#"{"recency": 0.5, "low_votes": 0.5, "instability": 0.5}"#);
        assert!(res.is_err());
    }
}
