/// Ranking engine orchestrator.
///
/// Owns the store, weight profiles, algorithm settings, tier bounds, pair
/// selector and rankings cache, and exposes them as one synchronous API. No
/// IO: snapshots go in and out as strings.
///
/// `RankingEngine` is single-writer. `SharedEngine` wraps it in a single
/// mutex for callers that rate from several threads.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bounds::{BoundsInfo, MoveDecision, TierBounds, TierBoundsConfig, TierBoundsManager};
use crate::confidence::ConfidenceCalculator;
use crate::distribution::{self, TierDistributionInfo};
use crate::error::RankResult;
use crate::pairing::{self, PairSelector};
use crate::rankings::{Rankings, RankingsCache};
use crate::settings::AlgorithmSettings;
use crate::snapshot::{self, LoadReport};
use crate::stats::{IntegrityIssue, OverallStatistics, StatsStore, VoteOutcome};
use crate::types::{Pair, Side};
use crate::weights::{PriorityPreferences, WeightManager, WeightVector};

/// Configuration for the ranking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tier_bounds: TierBoundsConfig,
    pub algorithm: AlgorithmSettings,
    pub left_weights: WeightVector,
    pub right_weights: WeightVector,
    pub left_preferences: PriorityPreferences,
    pub right_preferences: PriorityPreferences,
    /// Fixed seed for pair selection. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let weights = WeightManager::default();
        EngineConfig {
            tier_bounds: TierBoundsConfig::default(),
            algorithm: AlgorithmSettings::default(),
            left_weights: weights.left_weights(),
            right_weights: weights.right_weights(),
            left_preferences: weights.left_preferences(),
            right_preferences: weights.right_preferences(),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> RankResult<()> {
        self.tier_bounds.validate()?;
        self.algorithm.validate()?;
        self.left_weights.validate()?;
        self.right_weights.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RankingEngine {
    image_folder: String,
    store: StatsStore,
    weights: WeightManager,
    settings: AlgorithmSettings,
    bounds: TierBoundsManager,
    selector: PairSelector,
    rankings: RankingsCache,
}

impl RankingEngine {
    pub fn new(config: EngineConfig) -> RankResult<Self> {
        config.validate()?;

        let mut weights = WeightManager::default();
        weights.set_left_weights(config.left_weights)?;
        weights.set_right_weights(config.right_weights)?;
        weights.set_left_preferences(config.left_preferences);
        weights.set_right_preferences(config.right_preferences);

        let selector = match config.seed {
            Some(seed) => PairSelector::with_seed(seed),
            None => PairSelector::new(),
        };

        Ok(RankingEngine {
            image_folder: String::new(),
            store: StatsStore::new(),
            weights,
            settings: config.algorithm,
            bounds: TierBoundsManager::new(config.tier_bounds)?,
            selector,
            rankings: RankingsCache::new(),
        })
    }

    /// Start a new collection. Settings, weights and bounds are kept.
    pub fn reset(&mut self, image_folder: impl Into<String>) {
        self.image_folder = image_folder.into();
        self.store = StatsStore::new();
        self.rankings.invalidate();
        info!(folder = %self.image_folder, "started new collection");
    }

    pub fn image_folder(&self) -> &str {
        &self.image_folder
    }

    pub fn set_image_folder(&mut self, folder: impl Into<String>) {
        self.image_folder = folder.into();
    }

    pub fn store(&self) -> &StatsStore {
        &self.store
    }

    pub fn vote_count(&self) -> u64 {
        self.store.vote_count()
    }

    pub fn initialize_item(&mut self, id: &str) -> bool {
        let created = self.store.initialize(id);
        if created {
            self.rankings.invalidate();
        }
        created
    }

    pub fn initialize_items<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let created = self.store.initialize_many(ids);
        if created > 0 {
            self.rankings.invalidate();
        }
        created
    }

    // -----------------------------------------------------------------------
    // Selection and voting
    // -----------------------------------------------------------------------

    /// Pick the next pair among `candidates`, creating records for any
    /// candidate seen for the first time.
    pub fn select_next_pair<S: AsRef<str>>(
        &mut self,
        candidates: &[S],
        exclude_pair: Option<(&str, &str)>,
    ) -> Option<Pair> {
        self.initialize_items(candidates);
        self.selector.select_next_pair(
            &self.store,
            &self.weights,
            &self.settings,
            candidates,
            exclude_pair,
        )
    }

    /// Pick the next pair among every active item.
    pub fn select_from_active(&mut self, exclude_pair: Option<(&str, &str)>) -> Option<Pair> {
        let ids = self.store.active_ids();
        self.select_next_pair(&ids, exclude_pair)
    }

    pub fn record_vote(&mut self, winner: &str, loser: &str) -> RankResult<VoteOutcome> {
        let outcome = self.store.record_vote(
            winner,
            loser,
            &self.bounds,
            self.settings.tier_distribution_std(),
        )?;
        self.rankings.invalidate();
        Ok(outcome)
    }

    pub fn exclude(&mut self, id: &str) -> RankResult<bool> {
        let changed = self.store.exclude(id)?;
        if changed {
            self.rankings.invalidate();
        }
        Ok(changed)
    }

    pub fn unexclude(&mut self, id: &str) -> RankResult<bool> {
        let changed = self.store.unexclude(id)?;
        if changed {
            self.rankings.invalidate();
        }
        Ok(changed)
    }

    pub fn explain_selection(&self, left: &str, right: &str) -> RankResult<String> {
        pairing::explain_selection(&self.store, &self.weights, &self.settings, left, right)
    }

    /// Current priority of each candidate for one slot, highest first.
    pub fn priority_scores<S: AsRef<str>>(&self, side: Side, candidates: &[S]) -> Vec<(String, f64)> {
        pairing::priority_scores(&self.store, &self.weights, &self.settings, side, candidates)
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    pub fn all_rankings(&mut self) -> Arc<Rankings> {
        self.rankings.all_rankings(&self.store)
    }

    pub fn invalidate_rankings(&mut self) {
        self.rankings.invalidate();
    }

    pub fn confidence_calculator(&self) -> ConfidenceCalculator<'_> {
        ConfidenceCalculator::new(&self.store)
    }

    pub fn confidence(&self, id: &str) -> RankResult<f64> {
        self.confidence_calculator().confidence(id)
    }

    pub fn stability(&self, id: &str) -> RankResult<f64> {
        self.confidence_calculator().stability(id)
    }

    pub fn current_bounds(&self) -> TierBounds {
        self.bounds.compute_bounds(self.settings.tier_distribution_std(), &self.store)
    }

    pub fn can_move_to_tier(&self, id: &str, target_tier: i32) -> MoveDecision {
        self.bounds.can_move_to_tier(id, target_tier, &self.store, self.settings.tier_distribution_std())
    }

    pub fn bounds_info(&self) -> BoundsInfo {
        self.bounds.bounds_info(self.settings.tier_distribution_std(), &self.store)
    }

    pub fn tier_distribution_info(&self) -> TierDistributionInfo {
        distribution::tier_distribution_info(&self.store, &self.settings)
    }

    pub fn overall_statistics(&self) -> OverallStatistics {
        self.store.overall_statistics()
    }

    pub fn validate_integrity(&self) -> Vec<IntegrityIssue> {
        self.store.validate_integrity()
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn settings(&self) -> &AlgorithmSettings {
        &self.settings
    }

    /// Write one algorithm setting by name. Rejected values change nothing.
    pub fn set_setting(&mut self, name: &str, value: f64) -> RankResult<()> {
        self.settings.set_by_name(name, value)
    }

    pub fn set_settings(&mut self, settings: AlgorithmSettings) -> RankResult<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn weights(&self) -> &WeightManager {
        &self.weights
    }

    /// Mutable access to the weight profiles. Every setter validates.
    pub fn weights_mut(&mut self) -> &mut WeightManager {
        &mut self.weights
    }

    pub fn tier_bounds_config(&self) -> TierBoundsConfig {
        self.bounds.config()
    }

    pub fn set_tier_bounds_config(&mut self, config: TierBoundsConfig) -> RankResult<()> {
        self.bounds.set_config(config)
    }

    pub fn tier_bounds_mut(&mut self) -> &mut TierBoundsManager {
        &mut self.bounds
    }

    /// Restart pair selection's random stream.
    pub fn reseed(&mut self, seed: Option<u64>) {
        self.selector.reseed(seed);
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn save_snapshot(&self) -> RankResult<String> {
        snapshot::encode(&self.image_folder, &self.store, &self.weights, &self.settings)
    }

    /// Replace the whole state from a snapshot.
    ///
    /// On error the current state is untouched. Tier bounds are not part of
    /// snapshots and keep their current configuration.
    pub fn load_snapshot(&mut self, json: &str) -> RankResult<LoadReport> {
        let decoded = snapshot::decode(json)?;
        self.image_folder = decoded.image_folder;
        self.store = decoded.store;
        self.weights = decoded.weights;
        self.settings = decoded.settings;
        self.rankings.invalidate();
        Ok(decoded.report)
    }
}

/// Cloneable, thread-safe handle to one engine.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<RankingEngine>>,
}

impl SharedEngine {
    pub fn new(engine: RankingEngine) -> Self {
        SharedEngine { inner: Arc::new(Mutex::new(engine)) }
    }

    fn lock(&self) -> MutexGuard<'_, RankingEngine> {
        // Every engine mutation validates before writing, so a panicking
        // holder cannot leave a half-applied vote behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut RankingEngine) -> R) -> R {
        let mut guard = self.lock();
        f(&mut *guard)
    }

    pub fn select_next_pair<S: AsRef<str>>(
        &self,
        candidates: &[S],
        exclude_pair: Option<(&str, &str)>,
    ) -> Option<Pair> {
        self.lock().select_next_pair(candidates, exclude_pair)
    }

    pub fn record_vote(&self, winner: &str, loser: &str) -> RankResult<VoteOutcome> {
        self.lock().record_vote(winner, loser)
    }

    pub fn exclude(&self, id: &str) -> RankResult<bool> {
        self.lock().exclude(id)
    }

    pub fn unexclude(&self, id: &str) -> RankResult<bool> {
        self.lock().unexclude(id)
    }

    pub fn all_rankings(&self) -> Arc<Rankings> {
        self.lock().all_rankings()
    }

    pub fn vote_count(&self) -> u64 {
        self.lock().vote_count()
    }

    pub fn save_snapshot(&self) -> RankResult<String> {
        self.lock().save_snapshot()
    }

    pub fn load_snapshot(&self, json: &str) -> RankResult<LoadReport> {
        self.lock().load_snapshot(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankError;
    use crate::rankings::RankingMetric;

    fn engine() -> RankingEngine {
        RankingEngine::new(EngineConfig { seed: Some(9), ..EngineConfig::default() }).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            left_weights: WeightVector { recency: -1.0, ..WeightVector::default() },
            ..EngineConfig::default()
        };
        assert!(RankingEngine::new(config).is_err());

        let mut tier_bounds = TierBoundsConfig::default();
        tier_bounds.min_confidence = 2.0;
        assert!(RankingEngine::new(EngineConfig { tier_bounds, ..EngineConfig::default() }).is_err());
    }

    #[test]
    fn test_config_defaults_match_weight_manager() {
        let e = engine();
        assert_eq!(e.weights(), &WeightManager::default());
        let config: EngineConfig = serde_json::from_str(r#"{"seed": 3}"#).unwrap();
        assert_eq!(config.seed, Some(3));
        assert!(config.right_preferences.prioritize_high_stability);
    }

    #[test]
    fn test_select_initializes_candidates() {
        let mut e = engine();
        let pair = e.select_next_pair(&["a", "b"], None).unwrap();
        assert_ne!(pair.0, pair.1);
        assert_eq!(e.store().len(), 2);
        assert_eq!(e.select_from_active(None).map(|p| p.0 != p.1), Some(true));
    }

    #[test]
    fn test_vote_flow() {
        let mut e = engine();
        e.initialize_items(&["a", "b", "c"]);
        let outcome = e.record_vote("a", "b").unwrap();
        assert_eq!(outcome.winner_tier, 1);
        assert_eq!(outcome.winner_move, MoveDecision::WithinBounds);
        assert_eq!(e.vote_count(), 1);

        let rankings = e.all_rankings();
        assert_eq!(rankings.by(RankingMetric::Tier).next().unwrap().id, "a");

        assert!(matches!(e.record_vote("a", "nope"), Err(RankError::InvalidPair { .. })));
        assert_eq!(e.vote_count(), 1);
    }

    #[test]
    fn test_exclude_invalidates_rankings() {
        let mut e = engine();
        e.initialize_items(&["a", "b", "c"]);
        assert_eq!(e.all_rankings().len(), 3);
        assert!(e.exclude("c").unwrap());
        assert_eq!(e.all_rankings().len(), 2);
        assert!(e.unexclude("c").unwrap());
        assert_eq!(e.all_rankings().len(), 3);
    }

    #[test]
    fn test_settings_rejection() {
        let mut e = engine();
        assert!(e.set_setting("tier_distribution_std", 10.0).is_err());
        assert_eq!(e.settings().tier_distribution_std(), 1.5);
        e.set_setting("tier_distribution_std", 2.0).unwrap();
        assert_eq!(e.settings().tier_distribution_std(), 2.0);
        // floor(2.0 × 3.0) = 6, no records
        assert_eq!(e.current_bounds(), TierBounds::Bounded { min: -6, max: 6 });
    }

    #[test]
    fn test_snapshot_swap() {
        let mut e = engine();
        e.reset("/photos");
        e.initialize_items(&["a", "b"]);
        e.record_vote("b", "a").unwrap();
        let json = e.save_snapshot().unwrap();

        let mut other = engine();
        let report = other.load_snapshot(&json).unwrap();
        assert_eq!(report.items, 2);
        assert_eq!(other.image_folder(), "/photos");
        assert_eq!(other.store(), e.store());
        assert_eq!(other.all_rankings().len(), 2);
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let mut e = engine();
        e.initialize_items(&["a", "b"]);
        e.record_vote("a", "b").unwrap();
        let before = e.store().clone();
        assert!(e.load_snapshot(r#"{"image_folder": "/x"}"#).is_err());
        assert_eq!(e.store(), &before);
    }

    #[test]
    fn test_shared_engine_across_threads() {
        let shared = SharedEngine::new(engine());
        shared.with(|e| e.initialize_items(&["a", "b", "c", "d"]));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let (w, l) = if i % 2 == 0 { ("a", "b") } else { ("c", "d") };
                        shared.record_vote(w, l).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(shared.vote_count(), 100);
        shared.with(|e| assert!(e.validate_integrity().is_empty()));
    }
}
