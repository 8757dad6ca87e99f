//! Invariants that must hold for any sequence of votes.

use proptest::prelude::*;
use serde_json::json;
use tierrank_core::{EngineConfig, MoveDecision, RankError, RankingEngine, TierBoundsConfig};

const ITEMS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn engine_with_votes(votes: &[(usize, usize)], seed: u64) -> RankingEngine {
    let mut engine =
        RankingEngine::new(EngineConfig { seed: Some(seed), ..EngineConfig::default() }).unwrap();
    engine.initialize_items(&ITEMS);
    for &(w, l) in votes {
        // identical pairs are rejected and leave no trace
        let _ = engine.record_vote(ITEMS[w], ITEMS[l]);
    }
    engine
}

fn votes_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..ITEMS.len(), 0..ITEMS.len()), 0..80)
}

fn counter() -> impl Strategy<Value = u32> {
    prop_oneof![any::<u32>(), 0u32..20, Just(u32::MAX)]
}

fn tier() -> impl Strategy<Value = i32> {
    prop_oneof![any::<i32>(), -5i32..5, Just(i32::MAX), Just(i32::MIN)]
}

fn record_json() -> impl Strategy<Value = serde_json::Value> {
    (
        counter(),
        counter(),
        counter(),
        tier(),
        prop::collection::vec(tier(), 0..4),
        any::<i64>(),
        any::<bool>(),
    )
        .prop_map(|(wins, losses, votes, current, history, last_voted, binned)| {
            json!({
                "wins": wins,
                "losses": losses,
                "votes": votes,
                "current_tier": current,
                "tier_history": history,
                "last_voted": last_voted,
                "binned": binned,
            })
        })
}

fn snapshot_json() -> impl Strategy<Value = String> {
    (
        prop_oneof![any::<u64>(), 0u64..50, Just(i64::MAX as u64)],
        prop::collection::vec(record_json(), 2..5),
    )
        .prop_map(|(vote_count, records)| {
            let stats: serde_json::Map<String, serde_json::Value> = records
                .into_iter()
                .enumerate()
                .map(|(i, r)| (format!("img{i}.png"), r))
                .collect();
            json!({"image_folder": "/x", "vote_count": vote_count, "image_stats": stats}).to_string()
        })
}

proptest! {
    #[test]
    fn wins_plus_losses_equals_votes(votes in votes_strategy()) {
        let engine = engine_with_votes(&votes, 0);
        for (id, r) in engine.store().records() {
            prop_assert_eq!(r.wins() + r.losses(), r.votes(), "item {}", id);
            prop_assert_eq!(r.tier_history().len(), r.votes() as usize + 1);
            prop_assert_eq!(r.tier_history().last().copied(), Some(r.current_tier()));
        }
        let expected = votes.iter().filter(|(w, l)| w != l).count() as u64;
        prop_assert_eq!(engine.vote_count(), expected);
        prop_assert!(engine.validate_integrity().is_empty());
    }

    #[test]
    fn each_vote_adds_exactly_one_history_entry(votes in votes_strategy(), w in 0..6usize, l in 0..6usize) {
        prop_assume!(w != l);
        let mut engine = engine_with_votes(&votes, 1);
        let before_w = engine.store().get_record(ITEMS[w]).unwrap().clone();
        let before_l = engine.store().get_record(ITEMS[l]).unwrap().clone();

        engine.record_vote(ITEMS[w], ITEMS[l]).unwrap();
        let after_w = engine.store().get_record(ITEMS[w]).unwrap();
        let after_l = engine.store().get_record(ITEMS[l]).unwrap();
        prop_assert_eq!(after_w.votes(), before_w.votes() + 1);
        prop_assert_eq!(after_l.votes(), before_l.votes() + 1);
        prop_assert_eq!(after_w.tier_history().len(), before_w.tier_history().len() + 1);
        prop_assert_eq!(after_l.tier_history().len(), before_l.tier_history().len() + 1);
    }

    #[test]
    fn confidence_zero_iff_no_votes(votes in votes_strategy()) {
        let engine = engine_with_votes(&votes, 2);
        for id in ITEMS {
            let r = engine.store().get_record(id).unwrap();
            let c = engine.confidence(id).unwrap();
            if r.votes() == 0 {
                prop_assert_eq!(c, 0.0);
            } else {
                prop_assert!(c > 0.0 && c <= 1.0, "confidence {} out of range", c);
            }
            if r.tier_history().len() <= 1 {
                prop_assert_eq!(engine.stability(id).unwrap(), 0.0);
            }
        }
    }

    #[test]
    fn selection_respects_exclusion(
        votes in votes_strategy(),
        seed in any::<u64>(),
        x in 0..6usize,
        y in 0..6usize,
        n in 2..=6usize,
    ) {
        let mut engine = engine_with_votes(&votes, seed);
        let candidates = &ITEMS[..n];
        let exclude = (ITEMS[x], ITEMS[y]);
        for _ in 0..5 {
            if let Some((l, r)) = engine.select_next_pair(candidates, Some(exclude)) {
                prop_assert_ne!(&l, &r);
                prop_assert!(candidates.contains(&l.as_str()) && candidates.contains(&r.as_str()));
                let hit = (l == exclude.0 && r == exclude.1) || (l == exclude.1 && r == exclude.0);
                prop_assert!(!hit, "returned the excluded pair ({}, {})", l, r);
            } else {
                // Only possible when the excluded pair is the only pair.
                prop_assert!(n == 2 && x != y && x < 2 && y < 2);
            }
        }
    }

    #[test]
    fn targets_inside_bounds_always_allowed(votes in votes_strategy(), target in -20i32..20) {
        let mut engine = engine_with_votes(&votes, 3);
        let config = TierBoundsConfig { adaptive: false, ..TierBoundsConfig::default() };
        engine.set_tier_bounds_config(config).unwrap();
        // floor(1.5 × 3.0) = 4
        let decision = engine.can_move_to_tier("a", target);
        if (-4..=4).contains(&target) {
            prop_assert_eq!(decision, MoveDecision::WithinBounds);
        }

        engine.tier_bounds_mut().set_enabled(false);
        prop_assert!(engine.can_move_to_tier("a", target).is_allowed());
    }

    #[test]
    fn snapshot_reload_preserves_store(votes in votes_strategy()) {
        let engine = engine_with_votes(&votes, 4);
        let json = engine.save_snapshot().unwrap();
        let mut reloaded = RankingEngine::new(EngineConfig::default()).unwrap();
        let report = reloaded.load_snapshot(&json).unwrap();
        prop_assert_eq!(reloaded.store(), engine.store());
        prop_assert_eq!(report.corrected_vote_counts, 0);
        prop_assert_eq!(report.repaired_histories, 0);
    }

    #[test]
    fn extreme_snapshots_load_or_fail_cleanly(json in snapshot_json()) {
        let mut engine = RankingEngine::new(EngineConfig { seed: Some(5), ..EngineConfig::default() }).unwrap();
        match engine.load_snapshot(&json) {
            Err(e) => prop_assert!(matches!(e, RankError::SnapshotFormat { .. }), "{:?}", e),
            Ok(_) => {
                let _ = engine.validate_integrity();
                let _ = engine.all_rankings();
                let _ = engine.bounds_info();
                let _ = engine.tier_distribution_info();
                if let Some((left, right)) = engine.select_from_active(None) {
                    let _ = engine.record_vote(&left, &right);
                }
                let _ = engine.record_vote("img0.png", "img1.png");
                prop_assert!(engine.save_snapshot().is_ok());
            }
        }
    }
}
