/// Sorted rankings over all active items, cached per vote count.
///
/// One pass builds an entry per active item; five index orderings over the
/// same entries give the per-metric views. All sorts are stable, so ties keep
/// ID order.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::confidence;
use crate::error::RankError;
use crate::stats::StatsStore;
use crate::types::ItemId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub id: ItemId,
    pub vote_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub current_tier: i32,
    pub stability: f64,
    pub confidence: f64,
    /// Votes since the item last took part; `None` if it never has.
    pub recency: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    /// Most votes first.
    Votes,
    /// Highest win rate first.
    WinRate,
    /// Highest tier first.
    Tier,
    /// Most stable (lowest std dev) first.
    Stability,
    /// Longest since last vote first; never-voted items lead.
    Recency,
}

impl RankingMetric {
    pub const ALL: [RankingMetric; 5] = [
        RankingMetric::Votes,
        RankingMetric::WinRate,
        RankingMetric::Tier,
        RankingMetric::Stability,
        RankingMetric::Recency,
    ];
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RankingMetric::Votes => "votes",
            RankingMetric::WinRate => "win-rate",
            RankingMetric::Tier => "tier",
            RankingMetric::Stability => "stability",
            RankingMetric::Recency => "recency",
        })
    }
}

impl FromStr for RankingMetric {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "votes" => Ok(RankingMetric::Votes),
            "win-rate" | "win_rate" => Ok(RankingMetric::WinRate),
            "tier" => Ok(RankingMetric::Tier),
            "stability" => Ok(RankingMetric::Stability),
            "recency" => Ok(RankingMetric::Recency),
            other => Err(RankError::validation("metric", format!("unknown ranking metric '{other}'"))),
        }
    }
}

/// All five orderings, computed at one vote count.
#[derive(Debug, Clone, PartialEq)]
pub struct Rankings {
    vote_count: u64,
    computed_at: DateTime<Utc>,
    entries: Vec<RankingEntry>,
    by_votes: Vec<usize>,
    by_win_rate: Vec<usize>,
    by_tier: Vec<usize>,
    by_stability: Vec<usize>,
    by_recency: Vec<usize>,
}

fn order_by<F>(entries: &[RankingEntry], cmp: F) -> Vec<usize>
where
    F: Fn(&RankingEntry, &RankingEntry) -> Ordering,
{
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| cmp(&entries[a], &entries[b]));
    order
}

/// `None` (never voted) counts as the stalest possible value.
fn recency_desc(a: &RankingEntry, b: &RankingEntry) -> Ordering {
    match (a.recency, b.recency) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    }
}

impl Rankings {
    pub fn compute(store: &StatsStore) -> Self {
        let global = store.vote_count();
        let entries: Vec<RankingEntry> = store
            .active_records()
            .map(|(id, r)| RankingEntry {
                id: id.clone(),
                vote_count: r.votes(),
                wins: r.wins(),
                losses: r.losses(),
                win_rate: r.win_rate(),
                current_tier: r.current_tier(),
                stability: confidence::stability(r),
                confidence: confidence::confidence(r),
                recency: r.votes_since_last(global),
            })
            .collect();

        Rankings {
            vote_count: global,
            computed_at: Utc::now(),
            by_votes: order_by(&entries, |a, b| b.vote_count.cmp(&a.vote_count)),
            by_win_rate: order_by(&entries, |a, b| b.win_rate.total_cmp(&a.win_rate)),
            by_tier: order_by(&entries, |a, b| b.current_tier.cmp(&a.current_tier)),
            by_stability: order_by(&entries, |a, b| a.stability.total_cmp(&b.stability)),
            by_recency: order_by(&entries, recency_desc),
            entries,
        }
    }

    /// Vote count these rankings were computed at.
    pub fn vote_count(&self) -> u64 {
        self.vote_count
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ID order.
    pub fn entries(&self) -> &[RankingEntry] {
        &self.entries
    }

    pub fn by(&self, metric: RankingMetric) -> impl Iterator<Item = &RankingEntry> + '_ {
        let order = match metric {
            RankingMetric::Votes => &self.by_votes,
            RankingMetric::WinRate => &self.by_win_rate,
            RankingMetric::Tier => &self.by_tier,
            RankingMetric::Stability => &self.by_stability,
            RankingMetric::Recency => &self.by_recency,
        };
        order.iter().map(move |&i| &self.entries[i])
    }
}

/// Caches the last computed `Rankings` until the vote count moves on or
/// `invalidate` is called.
#[derive(Debug, Clone, Default)]
pub struct RankingsCache {
    cached: Option<Arc<Rankings>>,
}

impl RankingsCache {
    pub fn new() -> Self {
        RankingsCache::default()
    }

    pub fn all_rankings(&mut self, store: &StatsStore) -> Arc<Rankings> {
        if let Some(cached) = &self.cached {
            if cached.vote_count() == store.vote_count() {
                return Arc::clone(cached);
            }
        }
        let rankings = Arc::new(Rankings::compute(store));
        debug!(items = rankings.len(), vote_count = rankings.vote_count(), "computed rankings");
        self.cached = Some(Arc::clone(&rankings));
        rankings
    }

    /// Drop the cached rankings, for mutations that leave the vote count unchanged.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{TierBoundsConfig, TierBoundsManager};

    fn voted_store() -> StatsStore {
        let bounds =
            TierBoundsManager::new(TierBoundsConfig { enabled: false, ..Default::default() }).unwrap();
        let mut store = StatsStore::new();
        store.initialize_many(&["a", "b", "c", "d"]);
        store.record_vote("a", "b", &bounds, 1.5).unwrap();
        store.record_vote("a", "c", &bounds, 1.5).unwrap();
        store.record_vote("c", "b", &bounds, 1.5).unwrap();
        store
    }

    fn ids<'a>(iter: impl Iterator<Item = &'a RankingEntry>) -> Vec<&'a str> {
        iter.map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_orderings() {
        let store = voted_store();
        let rankings = Rankings::compute(&store);
        assert_eq!(rankings.len(), 4);

        // votes: a=2, b=2, c=2, d=0
        assert_eq!(ids(rankings.by(RankingMetric::Votes)), vec!["a", "b", "c", "d"]);
        // win rate: a=1.0, c=0.5, b=0.0, d=0.0
        assert_eq!(ids(rankings.by(RankingMetric::WinRate)), vec!["a", "c", "b", "d"]);
        // tiers: a=2, c=0, d=0, b=-2
        assert_eq!(ids(rankings.by(RankingMetric::Tier)), vec!["a", "c", "d", "b"]);
        // d has a single-entry history, c went 0 -> -1 -> 0
        assert_eq!(rankings.by(RankingMetric::Stability).next().unwrap().id, "d");
        // d was initialised at vote 0 and never voted since
        assert_eq!(rankings.by(RankingMetric::Recency).next().unwrap().id, "d");
    }

    #[test]
    fn test_recency_never_voted_first() {
        let mut a = RankingEntry {
            id: "a".into(),
            vote_count: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            current_tier: 0,
            stability: 0.0,
            confidence: 0.0,
            recency: Some(50),
        };
        let mut b = a.clone();
        b.id = "b".into();
        b.recency = None;
        assert_eq!(recency_desc(&b, &a), Ordering::Less);
        a.recency = Some(1);
        b.recency = Some(2);
        assert_eq!(recency_desc(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_excluded_items_not_ranked() {
        let mut store = voted_store();
        store.exclude("d").unwrap();
        let rankings = Rankings::compute(&store);
        assert_eq!(rankings.len(), 3);
        assert!(rankings.entries().iter().all(|e| e.id != "d"));
    }

    #[test]
    fn test_cache_reuse_and_invalidation() {
        let mut store = voted_store();
        let mut cache = RankingsCache::new();
        assert!(!cache.is_cached());

        let first = cache.all_rankings(&store);
        let second = cache.all_rankings(&store);
        assert!(Arc::ptr_eq(&first, &second));

        let bounds = TierBoundsManager::default();
        store.record_vote("d", "a", &bounds, 1.5).unwrap();
        let third = cache.all_rankings(&store);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.vote_count(), 4);

        cache.invalidate();
        assert!(!cache.is_cached());
        let fourth = cache.all_rankings(&store);
        assert!(!Arc::ptr_eq(&third, &fourth));
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("win-rate".parse::<RankingMetric>().unwrap(), RankingMetric::WinRate);
        assert_eq!(RankingMetric::WinRate.to_string(), "win-rate");
        assert!("elo".parse::<RankingMetric>().is_err());
    }
}
