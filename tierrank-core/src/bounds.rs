/// Adaptive tier bounds.
///
/// Keeps noisy, lightly-voted items from drifting arbitrarily far from the
/// centre while letting well-evidenced items escape the normal envelope:
///
/// ```text
/// base   = floor(std × std_multiplier)
/// fixed:    [-base, base]
/// adaptive: bonus = floor(log10(n) - 2) for n > 100 active items, else 0
///           [min(lowest_tier - 1, -base - bonus), max(highest_tier + 1, base + bonus)]
/// ```
///
/// A target outside the bounds is still allowed for an item whose
/// confidence and vote count both clear the configured minimums.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::confidence;
use crate::constants::ADAPTIVE_BOUNDS_MIN_ITEMS;
use crate::error::{RankError, RankResult};
use crate::stats::StatsStore;

/// Tier bounds settings. Ephemeral: not written into snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBoundsConfig {
    pub enabled: bool,
    pub std_multiplier: f64,
    /// Confidence an item needs to move beyond the bounds.
    pub min_confidence: f64,
    /// Votes an item needs to move beyond the bounds.
    pub min_votes: u32,
    /// Widen bounds with collection size and the occupied tier range.
    pub adaptive: bool,
}

impl Default for TierBoundsConfig {
    fn default() -> Self {
        TierBoundsConfig {
            enabled: true,
            std_multiplier: 3.0,
            min_confidence: 0.8,
            min_votes: 10,
            adaptive: true,
        }
    }
}

impl TierBoundsConfig {
    pub fn validate(&self) -> RankResult<()> {
        if !self.std_multiplier.is_finite() || self.std_multiplier <= 0.0 {
            return Err(RankError::validation(
                "std_multiplier",
                format!("{} must be a positive number", self.std_multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(RankError::validation(
                "min_confidence",
                format!("{} is outside [0, 1]", self.min_confidence),
            ));
        }
        Ok(())
    }
}

/// Currently permitted tier range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TierBounds {
    Unbounded,
    Bounded { min: i32, max: i32 },
}

impl TierBounds {
    pub fn contains(&self, tier: i32) -> bool {
        match *self {
            TierBounds::Unbounded => true,
            TierBounds::Bounded { min, max } => (min..=max).contains(&tier),
        }
    }
}

impl fmt::Display for TierBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierBounds::Unbounded => f.write_str("unbounded"),
            TierBounds::Bounded { min, max } => write!(f, "[{min}, {max}]"),
        }
    }
}

/// Verdict on a single tier move. `Display` gives the human-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum MoveDecision {
    BoundsDisabled,
    WithinBounds,
    /// Outside bounds, but the item has earned it.
    Qualified { confidence: f64, votes: u32 },
    /// Outside bounds and not qualified to exceed them.
    Denied {
        confidence: f64,
        votes: u32,
        min_confidence: f64,
        min_votes: u32,
    },
}

impl MoveDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, MoveDecision::Denied { .. })
    }
}

impl fmt::Display for MoveDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveDecision::BoundsDisabled => f.write_str("Tier bounds disabled"),
            MoveDecision::WithinBounds => f.write_str("Within bounds"),
            MoveDecision::Qualified { confidence, votes } => write!(
                f,
                "High confidence ({confidence:.3}) and sufficient votes ({votes})"
            ),
            MoveDecision::Denied { confidence, votes, min_confidence, min_votes } => write!(
                f,
                "Insufficient qualification: confidence={confidence:.3} (need {min_confidence}), \
                 votes={votes} (need {min_votes})"
            ),
        }
    }
}

/// Status snapshot of the bounds, for reporting only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundsInfo {
    pub enabled: bool,
    pub bounds: TierBounds,
    pub std_multiplier: f64,
    pub min_confidence: f64,
    pub min_votes: u32,
    pub adaptive: bool,
    pub items_at_min_bound: usize,
    pub items_at_max_bound: usize,
    /// Items whose confidence and votes would let them exceed the bounds.
    pub qualified_to_exceed: usize,
    pub total_items: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierBoundsManager {
    config: TierBoundsConfig,
}

impl TierBoundsManager {
    pub fn new(config: TierBoundsConfig) -> RankResult<Self> {
        config.validate()?;
        Ok(TierBoundsManager { config })
    }

    pub fn config(&self) -> TierBoundsConfig {
        self.config
    }

    /// Replace the whole configuration; rejected configs leave the old one in place.
    pub fn set_config(&mut self, config: TierBoundsConfig) -> RankResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.config.adaptive = adaptive;
    }

    pub fn set_min_votes(&mut self, min_votes: u32) {
        self.config.min_votes = min_votes;
    }

    pub fn set_std_multiplier(&mut self, std_multiplier: f64) -> RankResult<()> {
        self.set_config(TierBoundsConfig { std_multiplier, ..self.config })
    }

    pub fn set_min_confidence(&mut self, min_confidence: f64) -> RankResult<()> {
        self.set_config(TierBoundsConfig { min_confidence, ..self.config })
    }

    pub fn reset_to_defaults(&mut self) {
        self.config = TierBoundsConfig::default();
    }

    pub fn compute_bounds(&self, tier_distribution_std: f64, store: &StatsStore) -> TierBounds {
        if !self.config.enabled {
            return TierBounds::Unbounded;
        }

        let base = (tier_distribution_std * self.config.std_multiplier).floor() as i32;
        if !self.config.adaptive {
            return TierBounds::Bounded { min: -base, max: base };
        }

        let total_items = store.active_count();
        let bonus = if total_items > ADAPTIVE_BOUNDS_MIN_ITEMS {
            ((total_items.max(10) as f64).log10() - 2.0).floor() as i32
        } else {
            0
        };

        // base and bonus are both non-negative, so the negation cannot overflow.
        let reach = base.saturating_add(bonus);
        let mut min = -reach;
        let mut max = reach;
        if let Some((lowest, highest)) = store.active_tier_range() {
            min = min.min(lowest.saturating_sub(1));
            max = max.max(highest.saturating_add(1));
        }
        TierBounds::Bounded { min, max }
    }

    /// Whether `id` may move to `target_tier`.
    pub fn can_move_to_tier(
        &self,
        id: &str,
        target_tier: i32,
        store: &StatsStore,
        tier_distribution_std: f64,
    ) -> MoveDecision {
        if !self.config.enabled {
            return MoveDecision::BoundsDisabled;
        }
        if self.compute_bounds(tier_distribution_std, store).contains(target_tier) {
            return MoveDecision::WithinBounds;
        }

        let (confidence, votes) = store
            .get_record(id)
            .map(|r| (confidence::confidence(r), r.votes()))
            .unwrap_or((0.0, 0));

        if self.qualifies(confidence, votes) {
            MoveDecision::Qualified { confidence, votes }
        } else {
            MoveDecision::Denied {
                confidence,
                votes,
                min_confidence: self.config.min_confidence,
                min_votes: self.config.min_votes,
            }
        }
    }

    fn qualifies(&self, confidence: f64, votes: u32) -> bool {
        confidence >= self.config.min_confidence && votes >= self.config.min_votes
    }

    pub fn bounds_info(&self, tier_distribution_std: f64, store: &StatsStore) -> BoundsInfo {
        let bounds = self.compute_bounds(tier_distribution_std, store);
        let (mut at_min, mut at_max, mut qualified) = (0, 0, 0);

        for (_, record) in store.active_records() {
            if let TierBounds::Bounded { min, max } = bounds {
                if record.current_tier() <= min {
                    at_min += 1;
                }
                if record.current_tier() >= max {
                    at_max += 1;
                }
            }
            if self.qualifies(confidence::confidence(record), record.votes()) {
                qualified += 1;
            }
        }

        BoundsInfo {
            enabled: self.config.enabled,
            bounds,
            std_multiplier: self.config.std_multiplier,
            min_confidence: self.config.min_confidence,
            min_votes: self.config.min_votes,
            adaptive: self.config.adaptive,
            items_at_min_bound: at_min,
            items_at_max_bound: at_max,
            qualified_to_exceed: qualified,
            total_items: store.active_count(),
        }
    }
}
