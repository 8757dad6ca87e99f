/// Expected tier shape: a discretised zero-mean Gaussian over the tiers that
/// are currently occupied, normalised to sum to 1.
///
/// Pair selection uses the actual/expected ratio of each tier to steer
/// comparisons toward tiers holding more items than the bell curve predicts.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::settings::AlgorithmSettings;
use crate::stats::StatsStore;

/// Unnormalised Gaussian density at `tier`.
fn density(tier: i32, std: f64) -> f64 {
    let t = tier as f64;
    (-(t * t) / (2.0 * std * std)).exp()
}

/// Expected share of items per occupied tier.
pub fn expected_proportions<I>(tiers: I, std: f64) -> BTreeMap<i32, f64>
where
    I: IntoIterator<Item = i32>,
{
    let mut proportions: BTreeMap<i32, f64> =
        tiers.into_iter().map(|t| (t, density(t, std))).collect();
    let total: f64 = proportions.values().sum();
    if total > 0.0 {
        for p in proportions.values_mut() {
            *p /= total;
        }
    }
    proportions
}

/// `actual / expected` per tier for a histogram of tier populations.
///
/// A tier whose expected count underflows to zero gets the ratio cap, which
/// is as over-populated as selection ever treats a tier.
pub fn overpopulation_ratios(counts: &BTreeMap<i32, usize>, std: f64) -> BTreeMap<i32, f64> {
    let total: usize = counts.values().sum();
    let proportions = expected_proportions(counts.keys().copied(), std);
    counts
        .iter()
        .map(|(&tier, &actual)| {
            let expected = total as f64 * proportions.get(&tier).copied().unwrap_or(0.0);
            let ratio = if expected > 0.0 {
                actual as f64 / expected
            } else {
                crate::constants::MAX_OVERPOPULATION_RATIO
            };
            (tier, ratio)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAnalysis {
    pub actual: usize,
    pub expected: f64,
    pub ratio: f64,
    /// `actual - expected`.
    pub deviation: f64,
    pub overpopulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierDistributionInfo {
    pub tiers: BTreeMap<i32, TierAnalysis>,
    pub total_items: usize,
    pub tier_distribution_std: f64,
}

impl TierDistributionInfo {
    pub fn overpopulated_tiers(&self) -> Vec<i32> {
        self.tiers
            .iter()
            .filter(|(_, a)| a.overpopulated)
            .map(|(&t, _)| t)
            .collect()
    }
}

/// Actual vs expected population of every tier occupied by active items.
pub fn tier_distribution_info(store: &StatsStore, settings: &AlgorithmSettings) -> TierDistributionInfo {
    let counts = store.tier_distribution();
    let total_items: usize = counts.values().sum();
    let std = settings.tier_distribution_std();
    let proportions = expected_proportions(counts.keys().copied(), std);

    let tiers = counts
        .iter()
        .map(|(&tier, &actual)| {
            let expected = total_items as f64 * proportions.get(&tier).copied().unwrap_or(0.0);
            let ratio = if expected > 0.0 { actual as f64 / expected } else { 0.0 };
            let overpopulated = actual >= settings.min_overflow_images() as usize
                && actual as f64 > expected * settings.overflow_threshold();
            let analysis = TierAnalysis {
                actual,
                expected,
                ratio,
                deviation: actual as f64 - expected,
                overpopulated,
            };
            (tier, analysis)
        })
        .collect();

    TierDistributionInfo {
        tiers,
        total_items,
        tier_distribution_std: std,
    }
}
