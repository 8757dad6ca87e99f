/// Next-pair selection.
///
/// Every candidate gets two priority scores, one per comparison slot, from
/// the left and right weight profiles:
///
/// ```text
/// recency     = never voted ? 1 : (global - last_voted) / (global + 1)
/// votes       = votes / (max_votes + 1)              (inverted unless prioritize_high_votes)
/// stability   = stability / (max_stability + 0.1)    (inverted if prioritize_high_stability)
/// tier_size   = min(actual / expected, 3) / 3
/// priority    = Σ weight × component
/// ```
///
/// Selection then tries, in order: same-tier pairs (80% of the time),
/// adjacent-tier pairs, the overall top 5 × top 5, and finally uniform random
/// sampling. Every step honours the excluded pair and never pairs an item
/// with itself.
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::confidence;
use crate::constants::{
    FALLBACK_TOP_N, MAX_OVERPOPULATION_RATIO, RANDOM_PAIR_ATTEMPTS, SAME_TIER_PROBABILITY,
    SAME_TIER_TOP_N, STABILITY_NORMALIZATION_EPSILON,
};
use crate::distribution;
use crate::error::{RankError, RankResult};
use crate::settings::AlgorithmSettings;
use crate::stats::StatsStore;
use crate::types::{ItemId, ItemRecord, Pair, Side};
use crate::weights::{PriorityPreferences, WeightManager, WeightVector};

/// Collection-wide maxima the per-item components are normalised against.
struct ScoringContext {
    global_vote_count: u64,
    max_votes: u32,
    max_stability: f64,
    tier_ratios: BTreeMap<i32, f64>,
}

impl ScoringContext {
    fn new(store: &StatsStore, records: &[(&str, &ItemRecord, f64)], std: f64) -> Self {
        let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
        for (_, record, _) in records {
            *counts.entry(record.current_tier()).or_insert(0) += 1;
        }
        ScoringContext {
            global_vote_count: store.vote_count(),
            max_votes: records.iter().map(|(_, r, _)| r.votes()).max().unwrap_or(0),
            max_stability: records.iter().map(|(_, _, s)| *s).fold(0.0, f64::max),
            tier_ratios: distribution::overpopulation_ratios(&counts, std),
        }
    }

    fn score(
        &self,
        record: &ItemRecord,
        stability: f64,
        weights: &WeightVector,
        prefs: &PriorityPreferences,
    ) -> f64 {
        let recency = match record.votes_since_last(self.global_vote_count) {
            None => 1.0,
            Some(since) => since as f64 / (self.global_vote_count as f64 + 1.0),
        };

        let vote_share = record.votes() as f64 / (self.max_votes as f64 + 1.0);
        let votes = if prefs.prioritize_high_votes { vote_share } else { 1.0 - vote_share };

        let spread = stability / (self.max_stability + STABILITY_NORMALIZATION_EPSILON);
        let instability = if prefs.prioritize_high_stability { 1.0 - spread } else { spread };

        let ratio = self.tier_ratios.get(&record.current_tier()).copied().unwrap_or(0.0);
        let tier_size = ratio.min(MAX_OVERPOPULATION_RATIO) / MAX_OVERPOPULATION_RATIO;

        weights.recency * recency
            + weights.low_votes * votes
            + weights.instability * instability
            + weights.tier_size * tier_size
    }
}

struct Scored<'a> {
    id: &'a str,
    tier: i32,
    left: f64,
    right: f64,
}

/// Known, non-excluded, de-duplicated candidates with both slot scores, in ID order.
fn score_candidates<'a, S: AsRef<str>>(
    store: &'a StatsStore,
    weights: &WeightManager,
    settings: &AlgorithmSettings,
    candidates: &[S],
) -> Vec<Scored<'a>> {
    let ids: BTreeSet<&str> = candidates.iter().map(|c| c.as_ref()).collect();
    let records: Vec<(&'a str, &'a ItemRecord, f64)> = store
        .records()
        .filter(|(id, r)| ids.contains(id.as_str()) && !r.is_excluded())
        .map(|(id, r)| (id.as_str(), r, confidence::stability(r)))
        .collect();

    let ctx = ScoringContext::new(store, &records, settings.tier_distribution_std());
    let (lw, lp) = (weights.weights(Side::Left), weights.preferences(Side::Left));
    let (rw, rp) = (weights.weights(Side::Right), weights.preferences(Side::Right));

    records
        .iter()
        .map(|&(id, record, stability)| Scored {
            id,
            tier: record.current_tier(),
            left: ctx.score(record, stability, lw, lp),
            right: ctx.score(record, stability, rw, rp),
        })
        .collect()
}

/// Priority of every usable candidate for one slot, highest first.
pub fn priority_scores<S: AsRef<str>>(
    store: &StatsStore,
    weights: &WeightManager,
    settings: &AlgorithmSettings,
    side: Side,
    candidates: &[S],
) -> Vec<(ItemId, f64)> {
    let mut scores: Vec<(ItemId, f64)> = score_candidates(store, weights, settings, candidates)
        .into_iter()
        .map(|s| {
            let score = match side {
                Side::Left => s.left,
                Side::Right => s.right,
            };
            (s.id.to_string(), score)
        })
        .collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores
}

/// Candidate indices of one tier, ordered by each slot's priority.
#[derive(Default)]
struct TierGroup {
    left: Vec<usize>,
    right: Vec<usize>,
}

fn ranked(scored: &[Scored<'_>], mut indices: Vec<usize>, side: Side) -> Vec<usize> {
    let key = |i: usize| match side {
        Side::Left => scored[i].left,
        Side::Right => scored[i].right,
    };
    indices.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
    indices
}

fn group_by_tier(scored: &[Scored<'_>]) -> BTreeMap<i32, TierGroup> {
    let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, s) in scored.iter().enumerate() {
        members.entry(s.tier).or_default().push(i);
    }
    members
        .into_iter()
        .map(|(tier, idx)| {
            let group = TierGroup {
                left: ranked(scored, idx.clone(), Side::Left),
                right: ranked(scored, idx, Side::Right),
            };
            (tier, group)
        })
        .collect()
}

fn is_excluded_pair(left: &str, right: &str, exclude: Option<(&str, &str)>) -> bool {
    match exclude {
        Some((a, b)) => (left == a && right == b) || (left == b && right == a),
        None => false,
    }
}

/// First left × right combination, in rank order, that forms a usable pair.
fn first_valid<F>(lefts: &[usize], rights: &[usize], valid: &F) -> Option<(usize, usize)>
where
    F: Fn(usize, usize) -> bool,
{
    for &l in lefts {
        for &r in rights {
            if valid(l, r) {
                return Some((l, r));
            }
        }
    }
    None
}

fn same_tier<F>(groups: &BTreeMap<i32, TierGroup>, valid: &F) -> Option<(usize, usize)>
where
    F: Fn(usize, usize) -> bool,
{
    let mut tiers: Vec<(&i32, &TierGroup)> = groups.iter().collect();
    tiers.sort_by_key(|(tier, group)| (Reverse(group.left.len()), **tier));

    tiers.into_iter().find_map(|(_, group)| {
        let n = SAME_TIER_TOP_N.min(group.left.len());
        first_valid(&group.left[..n], &group.right[..n], valid)
    })
}

fn adjacent_tier<F>(groups: &BTreeMap<i32, TierGroup>, valid: &F) -> Option<(usize, usize)>
where
    F: Fn(usize, usize) -> bool,
{
    for (tier, lower) in groups {
        let Some(upper) = tier.checked_add(1).and_then(|next| groups.get(&next)) else {
            continue;
        };
        for (a, b) in [(lower, upper), (upper, lower), (lower, lower), (upper, upper)] {
            if let (Some(&l), Some(&r)) = (a.left.first(), b.right.first()) {
                if valid(l, r) {
                    return Some((l, r));
                }
            }
        }
    }
    None
}

/// Picks comparison pairs. Owns the random source so a seeded selector is
/// fully reproducible.
#[derive(Debug, Clone)]
pub struct PairSelector {
    rng: StdRng,
}

impl Default for PairSelector {
    fn default() -> Self {
        PairSelector::new()
    }
}

impl PairSelector {
    /// Selector seeded from the operating system.
    pub fn new() -> Self {
        PairSelector { rng: StdRng::from_os_rng() }
    }

    pub fn with_seed(seed: u64) -> Self {
        PairSelector { rng: StdRng::seed_from_u64(seed) }
    }

    /// Restart the random stream; `None` reseeds from the operating system.
    pub fn reseed(&mut self, seed: Option<u64>) {
        *self = match seed {
            Some(seed) => PairSelector::with_seed(seed),
            None => PairSelector::new(),
        };
    }

    /// Choose the next `(left, right)` pair among `candidates`.
    ///
    /// Unknown and excluded candidates are ignored. Returns `None` when fewer
    /// than two usable candidates remain or every combination is the
    /// excluded pair.
    pub fn select_next_pair<S: AsRef<str>>(
        &mut self,
        store: &StatsStore,
        weights: &WeightManager,
        settings: &AlgorithmSettings,
        candidates: &[S],
        exclude_pair: Option<(&str, &str)>,
    ) -> Option<Pair> {
        let scored = score_candidates(store, weights, settings, candidates);
        if scored.len() < 2 {
            debug!(candidates = scored.len(), "not enough candidates for a pair");
            return None;
        }

        let valid = |l: usize, r: usize| {
            l != r && !is_excluded_pair(scored[l].id, scored[r].id, exclude_pair)
        };
        let pair = |(l, r): (usize, usize)| (scored[l].id.to_string(), scored[r].id.to_string());
        let groups = group_by_tier(&scored);

        if self.rng.random::<f64>() < SAME_TIER_PROBABILITY {
            if let Some(found) = same_tier(&groups, &valid) {
                debug!(strategy = "same_tier", tier = scored[found.0].tier, "selected pair");
                return Some(pair(found));
            }
        }

        if let Some(found) = adjacent_tier(&groups, &valid) {
            debug!(
                strategy = "adjacent_tier",
                left_tier = scored[found.0].tier,
                right_tier = scored[found.1].tier,
                "selected pair"
            );
            return Some(pair(found));
        }

        let all: Vec<usize> = (0..scored.len()).collect();
        let lefts = ranked(&scored, all.clone(), Side::Left);
        let rights = ranked(&scored, all, Side::Right);
        let n = FALLBACK_TOP_N.min(scored.len());
        if let Some(found) = first_valid(&lefts[..n], &rights[..n], &valid) {
            debug!(strategy = "top_overall", "selected pair");
            return Some(pair(found));
        }

        for _ in 0..RANDOM_PAIR_ATTEMPTS {
            let picks = rand::seq::index::sample(&mut self.rng, scored.len(), 2);
            let (l, r) = (picks.index(0), picks.index(1));
            if valid(l, r) {
                debug!(strategy = "random", "selected pair");
                return Some(pair((l, r)));
            }
        }

        debug!(candidates = scored.len(), "no valid pair found");
        None
    }
}

fn describe_profile(weights: &WeightVector, prefs: &PriorityPreferences) -> String {
    let votes = if prefs.prioritize_high_votes { "high votes" } else { "low votes" };
    let stability = if prefs.prioritize_high_stability { "stable history" } else { "unstable history" };
    format!(
        "weights [recency={:.2}, low_votes={:.2}, instability={:.2}, tier_size={:.2}] favouring {votes} and {stability}",
        weights.recency, weights.low_votes, weights.instability, weights.tier_size
    )
}

/// Human-readable account of why `left` and `right` would be paired.
pub fn explain_selection(
    store: &StatsStore,
    weights: &WeightManager,
    settings: &AlgorithmSettings,
    left: &str,
    right: &str,
) -> RankResult<String> {
    let left_record = store.get_record(left).ok_or_else(|| RankError::unknown_item(left))?;
    let right_record = store.get_record(right).ok_or_else(|| RankError::unknown_item(right))?;
    let (left_tier, right_tier) = (left_record.current_tier(), right_record.current_tier());

    let mut lines = Vec::new();
    for (side, id, tier) in [(Side::Left, left, left_tier), (Side::Right, right, right_tier)] {
        lines.push(format!(
            "{} item {id} (Tier {tier}) selected using {side} {}.",
            if side == Side::Left { "Left" } else { "Right" },
            describe_profile(weights.weights(side), weights.preferences(side)),
        ));
    }

    let info = distribution::tier_distribution_info(store, settings);
    let crowded = info.overpopulated_tiers();
    if left_tier == right_tier {
        if crowded.contains(&left_tier) {
            lines.push(format!("Same-tier comparison in over-populated Tier {left_tier}."));
        } else {
            lines.push(format!("Same-tier comparison in Tier {left_tier}."));
        }
    } else {
        lines.push(format!("Cross-tier comparison: Tier {left_tier} vs Tier {right_tier}."));
        for tier in [left_tier, right_tier] {
            if crowded.contains(&tier) {
                lines.push(format!("Tier {tier} is over-populated."));
            }
        }
    }
    Ok(lines.join("\n"))
}
