/// Whole-state snapshot encoding.
///
/// Snapshots are JSON documents with three required fields (`image_folder`,
/// `vote_count`, `image_stats`) and a set of optional sections. Decoding is
/// strict about the required fields and lenient about the rest: a missing or
/// malformed optional section falls back to its default and is listed in the
/// returned [`LoadReport`]. Inconsistent records are repaired. Records whose
/// counters or tiers are out of range are rejected.
///
/// Encoding and decoding work on strings. Reading and writing files is the
/// caller's job.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{
    LEGACY_SNAPSHOT_VERSIONS, MAX_SNAPSHOT_TIER, MAX_SNAPSHOT_VOTE_COUNT, SNAPSHOT_VERSION,
};
use crate::error::{RankError, RankResult};
use crate::settings::AlgorithmSettings;
use crate::stats::StatsStore;
use crate::types::{ItemId, ItemRecord, Side};
use crate::weights::{PriorityPreferences, WeightManager, WeightVector};

/// Version assumed for snapshots that carry none.
const UNVERSIONED: &str = "1.0";

#[derive(Serialize)]
struct SnapshotOut<'a> {
    image_folder: &'a str,
    vote_count: u64,
    image_stats: &'a BTreeMap<ItemId, ItemRecord>,
    left_weights: WeightVector,
    right_weights: WeightVector,
    /// Single-profile weights read by pre-2.0 loaders.
    weights: WeightVector,
    left_priority_preferences: PriorityPreferences,
    right_priority_preferences: PriorityPreferences,
    tier_distribution_std: f64,
    algorithm_settings: &'a AlgorithmSettings,
    binned_images: Vec<ItemId>,
    timestamp: String,
    version: &'static str,
}

#[derive(Deserialize)]
struct RawSnapshot {
    image_folder: String,
    vote_count: u64,
    image_stats: BTreeMap<ItemId, ItemRecord>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    left_weights: Option<serde_json::Value>,
    #[serde(default)]
    right_weights: Option<serde_json::Value>,
    #[serde(default)]
    weights: Option<serde_json::Value>,
    #[serde(default)]
    left_priority_preferences: Option<serde_json::Value>,
    #[serde(default)]
    right_priority_preferences: Option<serde_json::Value>,
    #[serde(default)]
    tier_distribution_std: Option<serde_json::Value>,
    #[serde(default)]
    algorithm_settings: Option<serde_json::Value>,
    #[serde(default)]
    binned_images: Option<serde_json::Value>,
    #[serde(default)]
    tier_bounds_settings: Option<serde_json::Value>,
}

/// What decoding found and fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Version the snapshot was written with.
    pub version: String,
    /// Set when the snapshot predates the current format.
    pub migrated_from: Option<String>,
    pub items: usize,
    /// Records whose `votes` disagreed with `wins + losses`.
    pub corrected_vote_counts: usize,
    /// Records whose tier history was empty or did not end in the current tier.
    pub repaired_histories: usize,
    /// Records whose never-voted marker was replaced by a spread-out default.
    pub rederived_last_voted: usize,
    /// Records newly marked excluded from `binned_images`.
    pub excluded_from_list: usize,
    /// Sections present in the file but no longer used.
    pub dropped_sections: Vec<String>,
    /// Optional sections that were malformed and replaced by defaults.
    pub defaulted_sections: Vec<String>,
}

impl LoadReport {
    /// Whether anything had to be repaired or defaulted.
    pub fn has_repairs(&self) -> bool {
        self.corrected_vote_counts > 0
            || self.repaired_histories > 0
            || !self.defaulted_sections.is_empty()
    }
}

/// Fully rebuilt state from a snapshot, ready to swap in.
#[derive(Debug, Clone)]
pub struct DecodedSnapshot {
    pub image_folder: String,
    pub store: StatsStore,
    pub weights: WeightManager,
    pub settings: AlgorithmSettings,
    pub report: LoadReport,
}

/// Serialise the full state. Stamps the current version and a local timestamp.
pub fn encode(
    image_folder: &str,
    store: &StatsStore,
    weights: &WeightManager,
    settings: &AlgorithmSettings,
) -> RankResult<String> {
    let snapshot = SnapshotOut {
        image_folder,
        vote_count: store.vote_count(),
        image_stats: store.records_map(),
        left_weights: weights.left_weights(),
        right_weights: weights.right_weights(),
        weights: weights.left_weights(),
        left_priority_preferences: weights.left_preferences(),
        right_priority_preferences: weights.right_preferences(),
        tier_distribution_std: settings.tier_distribution_std(),
        algorithm_settings: settings,
        binned_images: store.excluded_ids(),
        timestamp: chrono::Local::now().to_rfc3339(),
        version: SNAPSHOT_VERSION,
    };
    let json = serde_json::to_string_pretty(&snapshot)?;
    info!(items = store.len(), vote_count = store.vote_count(), "encoded snapshot");
    Ok(json)
}

/// Parse an optional section, or record it as defaulted.
fn section<T: DeserializeOwned>(
    name: &str,
    value: Option<serde_json::Value>,
    report: &mut LoadReport,
) -> Option<T> {
    let value = value?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(section = name, error = %e, "ignoring malformed snapshot section");
            report.defaulted_sections.push(name.to_string());
            None
        }
    }
}

fn valid_weights(
    name: &str,
    value: Option<serde_json::Value>,
    report: &mut LoadReport,
) -> Option<WeightVector> {
    let weights: WeightVector = section(name, value, report)?;
    match weights.validate() {
        Ok(()) => Some(weights),
        Err(e) => {
            warn!(section = name, error = %e, "ignoring invalid snapshot weights");
            report.defaulted_sections.push(name.to_string());
            None
        }
    }
}

fn decode_weights(raw: &mut RawSnapshot, report: &mut LoadReport) -> WeightManager {
    let mut manager = WeightManager::default();
    let legacy = valid_weights("weights", raw.weights.take(), report);
    let left = valid_weights("left_weights", raw.left_weights.take(), report).or(legacy);
    let right = valid_weights("right_weights", raw.right_weights.take(), report).or(legacy);

    for (side, weights) in [(Side::Left, left), (Side::Right, right)] {
        let Some(w) = weights else { continue };
        if let Err(e) = manager.set_weights(side, w) {
            warn!(side = %side, error = %e, "ignoring rejected snapshot weights");
            report.defaulted_sections.push(format!("{side}_weights"));
        }
    }

    let left_prefs = raw.left_priority_preferences.take();
    if let Some(p) = section("left_priority_preferences", left_prefs, report) {
        manager.set_left_preferences(p);
    }
    let right_prefs = raw.right_priority_preferences.take();
    if let Some(p) = section("right_priority_preferences", right_prefs, report) {
        manager.set_right_preferences(p);
    }
    manager
}

fn decode_settings(raw: &mut RawSnapshot, report: &mut LoadReport) -> AlgorithmSettings {
    let parsed = section::<AlgorithmSettings>("algorithm_settings", raw.algorithm_settings.take(), report);
    if let Some(settings) = parsed {
        if settings.validate().is_ok() {
            return settings;
        }
        warn!("ignoring out-of-range algorithm settings");
        report.defaulted_sections.push("algorithm_settings".to_string());
    }

    let mut settings = AlgorithmSettings::default();
    if let Some(std) = section::<f64>("tier_distribution_std", raw.tier_distribution_std.take(), report) {
        if settings.set_tier_distribution_std(std).is_err() {
            report.defaulted_sections.push("tier_distribution_std".to_string());
        }
    }
    settings
}

fn check_ranges(vote_count: u64, records: &BTreeMap<ItemId, ItemRecord>) -> RankResult<()> {
    if vote_count > MAX_SNAPSHOT_VOTE_COUNT {
        return Err(RankError::snapshot_format(format!("vote_count {vote_count} is out of range")));
    }
    let tier_ok = |t: i32| (-MAX_SNAPSHOT_TIER..=MAX_SNAPSHOT_TIER).contains(&t);
    for (id, r) in records {
        if r.wins.checked_add(r.losses).is_none() {
            return Err(RankError::snapshot_format(format!(
                "{id}: wins {} and losses {} overflow the vote counter",
                r.wins, r.losses
            )));
        }
        if !tier_ok(r.current_tier) {
            return Err(RankError::snapshot_format(format!(
                "{id}: current_tier {} is out of range",
                r.current_tier
            )));
        }
        if let Some(t) = r.tier_history.iter().copied().find(|&t| !tier_ok(t)) {
            return Err(RankError::snapshot_format(format!("{id}: tier_history entry {t} is out of range")));
        }
    }
    Ok(())
}

/// Rebuild state from a snapshot.
///
/// Fails on unparsable JSON, a missing/mistyped required field, or counters
/// and tiers outside the range voting can produce.
pub fn decode(json: &str) -> RankResult<DecodedSnapshot> {
    let mut raw: RawSnapshot = serde_json::from_str(json)?;
    check_ranges(raw.vote_count, &raw.image_stats)?;
    let version = raw.version.take().unwrap_or_else(|| UNVERSIONED.to_string());

    let mut report = LoadReport {
        version: version.clone(),
        ..LoadReport::default()
    };
    if LEGACY_SNAPSHOT_VERSIONS.contains(&version.as_str()) {
        report.migrated_from = Some(version.clone());
    } else if version != SNAPSHOT_VERSION {
        warn!(version = %version, "unrecognised snapshot version, loading as {SNAPSHOT_VERSION}");
    }
    if raw.tier_bounds_settings.take().is_some() {
        report.dropped_sections.push("tier_bounds_settings".to_string());
    }

    let image_folder = std::mem::take(&mut raw.image_folder);
    let records = std::mem::take(&mut raw.image_stats);
    let mut store = StatsStore::from_parts(raw.vote_count, records);

    report.corrected_vote_counts = store.fix_vote_counts();
    report.repaired_histories = store.repair_histories();

    let binned: Vec<ItemId> = section("binned_images", raw.binned_images.take(), &mut report).unwrap_or_default();
    report.excluded_from_list = binned.iter().filter(|id| store.mark_excluded(id)).count();
    store.pin_excluded();
    report.rederived_last_voted = store.rederive_never_voted();
    report.items = store.len();

    let weights = decode_weights(&mut raw, &mut report);
    let settings = decode_settings(&mut raw, &mut report);

    if report.corrected_vote_counts > 0 {
        warn!(count = report.corrected_vote_counts, "corrected vote count inconsistencies");
    }
    info!(
        items = report.items,
        vote_count = store.vote_count(),
        version = %report.version,
        "decoded snapshot"
    );

    Ok(DecodedSnapshot {
        image_folder,
        store,
        weights,
        settings,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{TierBoundsConfig, TierBoundsManager};
    use crate::constants::EXCLUDED_TIER;
    use crate::types::LastVoted;

    fn sample_state() -> (StatsStore, WeightManager, AlgorithmSettings) {
        let bounds =
            TierBoundsManager::new(TierBoundsConfig { enabled: false, ..Default::default() }).unwrap();
        let mut store = StatsStore::new();
        store.initialize_many(&["a.png", "b.png", "c.png"]);
        store.record_vote("a.png", "b.png", &bounds, 1.5).unwrap();
        store.exclude("c.png").unwrap();

        let mut weights = WeightManager::default();
        weights.set_left_weights(WeightVector::uniform(0.5)).unwrap();
        let mut settings = AlgorithmSettings::default();
        settings.set_tier_distribution_std(2.0).unwrap();
        (store, weights, settings)
    }

    #[test]
    fn test_encode_decode_preserves_state() {
        let (store, weights, settings) = sample_state();
        let json = encode("/photos", &store, &weights, &settings).unwrap();
        let decoded = decode(&json).unwrap();

        assert_eq!(decoded.image_folder, "/photos");
        assert_eq!(decoded.store, store);
        assert_eq!(decoded.weights, weights);
        assert_eq!(decoded.settings, settings);
        assert_eq!(decoded.report.version, SNAPSHOT_VERSION);
        assert_eq!(decoded.report.migrated_from, None);
        assert!(!decoded.report.has_repairs());
    }

    #[test]
    fn test_encoded_layout() {
        let (store, weights, settings) = sample_state();
        let json = encode("/photos", &store, &weights, &settings).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "2.2");
        assert_eq!(value["binned_images"], serde_json::json!(["c.png"]));
        assert_eq!(value["image_stats"]["a.png"]["tier_history"], serde_json::json!([0, 1]));
        assert_eq!(value["image_stats"]["a.png"]["matchup_history"][0], serde_json::json!(["b.png", true, 1]));
        assert_eq!(value["tier_distribution_std"], 2.0);
        assert!(value.get("tier_bounds_settings").is_none());
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_missing_required_field() {
        let err = decode(r#"{"image_folder": "/x", "image_stats": {}}"#).unwrap_err();
        assert!(matches!(err, RankError::SnapshotFormat { ref message } if message.contains("vote_count")));
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"image_folder": 3, "vote_count": 0, "image_stats": {}}"#).is_err());
    }

    #[test]
    fn test_vote_count_correction() {
        let json = r#"{
            "image_folder": "/x",
            "vote_count": 5,
            "image_stats": {"X": {"wins": 3, "losses": 2, "votes": 4, "current_tier": 1,
                                  "tier_history": [0, 1, 2, 1, 0, 1], "last_voted": 5}}
        }"#;
        let decoded = decode(json).unwrap();
        assert_eq!(decoded.store.get_record("X").unwrap().votes(), 5);
        assert_eq!(decoded.report.corrected_vote_counts, 1);
        assert!(decoded.report.has_repairs());
    }

    #[test]
    fn test_legacy_version_migrates() {
        let json = r#"{
            "image_folder": "/x",
            "vote_count": 0,
            "image_stats": {"a": {}},
            "version": "2.1",
            "tier_bounds_settings": {"enabled": true},
            "weights": {"recency": 1.0, "low_votes": 0.0, "instability": 0.0, "tier_size": 0.0}
        }"#;
        let decoded = decode(json).unwrap();
        assert_eq!(decoded.report.migrated_from.as_deref(), Some("2.1"));
        assert_eq!(decoded.report.dropped_sections, vec!["tier_bounds_settings".to_string()]);
        let legacy = WeightVector { recency: 1.0, low_votes: 0.0, instability: 0.0, tier_size: 0.0 };
        assert_eq!(decoded.weights.left_weights(), legacy);
        assert_eq!(decoded.weights.right_weights(), legacy);

        // Empty record: history repaired to [current_tier].
        let a = decoded.store.get_record("a").unwrap();
        assert_eq!(a.tier_history(), &[0]);
        assert_eq!(decoded.report.repaired_histories, 1);

        let unversioned = decode(r#"{"image_folder": "", "vote_count": 0, "image_stats": {}}"#).unwrap();
        assert_eq!(unversioned.report.migrated_from.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_malformed_optional_sections_default() {
        let json = r#"{
            "image_folder": "/x",
            "vote_count": 0,
            "image_stats": {},
            "left_weights": {"recency": -1.0, "low_votes": 0.0, "instability": 0.0, "tier_size": 0.0},
            "right_weights": "nonsense",
            "algorithm_settings": {"tier_distribution_std": 99.0},
            "tier_distribution_std": 2.5,
            "left_priority_preferences": {"prioritize_high_stability": true, "prioritize_high_votes": true}
        }"#;
        let decoded = decode(json).unwrap();
        assert_eq!(decoded.weights.left_weights(), WeightVector::default());
        assert_eq!(decoded.weights.right_weights(), WeightVector::default());
        assert!(decoded.weights.left_preferences().prioritize_high_votes);
        assert!(!decoded.weights.left_preferences().prioritize_new_images);
        // algorithm_settings out of range, so the top-level std is used.
        assert_eq!(decoded.settings.tier_distribution_std(), 2.5);
        assert_eq!(
            decoded.report.defaulted_sections,
            vec!["left_weights".to_string(), "right_weights".to_string(), "algorithm_settings".to_string()]
        );
    }

    #[test]
    fn test_binned_list_excludes() {
        let json = r#"{
            "image_folder": "/x",
            "vote_count": 0,
            "image_stats": {"a": {"tier_history": [0], "last_voted": 0}},
            "binned_images": ["a", "gone.png"]
        }"#;
        let decoded = decode(json).unwrap();
        assert_eq!(decoded.report.excluded_from_list, 2);
        for id in ["a", "gone.png"] {
            let r = decoded.store.get_record(id).unwrap();
            assert!(r.is_excluded());
            assert_eq!(r.current_tier(), EXCLUDED_TIER);
        }
    }

    #[test]
    fn test_never_voted_rederived() {
        let json = r#"{
            "image_folder": "/x",
            "vote_count": 20,
            "image_stats": {
                "a": {"tier_history": [0], "last_voted": 20},
                "b": {"tier_history": [0], "last_voted": -1}
            }
        }"#;
        let decoded = decode(json).unwrap();
        assert_eq!(decoded.report.rederived_last_voted, 1);
        assert_eq!(decoded.store.get_record("b").unwrap().last_voted(), LastVoted::At(11));
    }

    fn with_record(vote_count: &str, record: &str) -> String {
        format!(r#"{{"image_folder": "/x", "vote_count": {vote_count}, "image_stats": {{"a": {record}}}}}"#)
    }

    #[test]
    fn test_out_of_range_counters_rejected() {
        let cases = [
            with_record("1", r#"{"wins": 4294967295, "losses": 1, "tier_history": [0]}"#),
            with_record("0", r#"{"current_tier": 2147483647, "tier_history": [2147483647]}"#),
            with_record("0", r#"{"current_tier": -2147483648, "tier_history": [0]}"#),
            with_record("0", r#"{"current_tier": 0, "tier_history": [2147483647, 0]}"#),
            with_record("18446744073709551615", r#"{"tier_history": [0]}"#),
        ];
        for json in &cases {
            let err = decode(json).unwrap_err();
            assert!(matches!(err, RankError::SnapshotFormat { .. }), "{json}: {err:?}");
        }
    }

    #[test]
    fn test_saturated_counter_loads_but_refuses_votes() {
        let json = r#"{
            "image_folder": "/x",
            "vote_count": 4294967295,
            "image_stats": {
                "a": {"wins": 4294967295, "losses": 0, "votes": 4294967295,
                      "current_tier": 3, "tier_history": [3], "last_voted": 10},
                "b": {"tier_history": [0], "last_voted": 10}
            }
        }"#;
        let mut decoded = decode(json).unwrap();
        assert_eq!(decoded.store.get_record("a").unwrap().votes(), u32::MAX);

        let bounds = TierBoundsManager::new(TierBoundsConfig::default()).unwrap();
        let err = decoded.store.record_vote("a", "b", &bounds, 1.5).unwrap_err();
        assert!(matches!(err, RankError::Validation { .. }));
        assert_eq!(decoded.store.vote_count(), u32::MAX as u64);
        assert_eq!(decoded.store.get_record("b").unwrap().votes(), 0);
    }

    #[test]
    fn test_rejected_side_weights_fall_back_to_legacy() {
        let json = r#"{
            "image_folder": "/x",
            "vote_count": 0,
            "image_stats": {},
            "weights": {"recency": 0.0, "low_votes": 1.0, "instability": 0.0, "tier_size": 0.0},
            "left_weights": {"recency": -1.0, "low_votes": 0.0, "instability": 0.0, "tier_size": 0.0}
        }"#;
        let decoded = decode(json).unwrap();
        let legacy = WeightVector { recency: 0.0, low_votes: 1.0, instability: 0.0, tier_size: 0.0 };
        assert_eq!(decoded.weights.left_weights(), legacy);
        assert_eq!(decoded.weights.right_weights(), legacy);
        assert_eq!(decoded.report.defaulted_sections, vec!["left_weights".to_string()]);
    }
}
