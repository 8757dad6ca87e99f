/// Stability and confidence derived from an item's voting record.
///
/// Stability is the sample standard deviation of the tier history (lower =
/// more settled). Confidence folds in the vote count:
///
/// ```text
/// confidence = 1 / (1 + stability / sqrt(votes))      votes > 0
/// confidence = 0                                       votes = 0
/// ```
///
/// Pure functions. Nothing here is cached, every call is linear in the
/// history length.
use serde::Serialize;

use crate::error::{RankError, RankResult};
use crate::stats::StatsStore;
use crate::types::{ItemId, ItemRecord};

/// Sample standard deviation (n - 1 denominator). 0 for fewer than 2 values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 1 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Standard deviation of the tier history; 0 when it has one entry or none.
pub fn stability(record: &ItemRecord) -> f64 {
    let history: Vec<f64> = record.tier_history().iter().map(|&t| t as f64).collect();
    sample_std_dev(&history)
}

/// Confidence in `[0, 1]`. Exactly 0 without votes; excluded items are
/// pinned and report full confidence.
pub fn confidence(record: &ItemRecord) -> f64 {
    if record.is_excluded() {
        return 1.0;
    }
    let votes = record.votes();
    if votes == 0 {
        return 0.0;
    }
    1.0 / (1.0 + stability(record) / (votes as f64).sqrt())
}

/// Step-by-step confidence calculation, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub confidence: f64,
    pub votes: u32,
    pub stability: f64,
    pub effective_stability: f64,
    pub calculation: String,
}

pub fn breakdown(record: &ItemRecord) -> ConfidenceBreakdown {
    let votes = record.votes();
    let stability = stability(record);

    if record.is_excluded() {
        return ConfidenceBreakdown {
            confidence: 1.0,
            votes,
            stability,
            effective_stability: 0.0,
            calculation: "Excluded item: pinned at full confidence".to_string(),
        };
    }
    if votes == 0 {
        return ConfidenceBreakdown {
            confidence: 0.0,
            votes: 0,
            stability,
            effective_stability: 0.0,
            calculation: "No votes: confidence 0".to_string(),
        };
    }

    let effective_stability = stability / (votes as f64).sqrt();
    let confidence = 1.0 / (1.0 + effective_stability);
    ConfidenceBreakdown {
        confidence,
        votes,
        stability,
        effective_stability,
        calculation: format!("1 / (1 + {stability:.3} / sqrt({votes})) = {confidence:.3}"),
    }
}

/// Side-by-side confidence of two items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceComparison {
    pub first: (ItemId, ConfidenceBreakdown),
    pub second: (ItemId, ConfidenceBreakdown),
    /// The less confident item, which benefits most from more votes.
    pub needs_attention: ItemId,
    pub difference: f64,
}

/// Aggregate confidence over a set of items.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ConfidenceStatistics {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

/// Confidence queries against a store.
pub struct ConfidenceCalculator<'a> {
    store: &'a StatsStore,
}

impl<'a> ConfidenceCalculator<'a> {
    pub fn new(store: &'a StatsStore) -> Self {
        ConfidenceCalculator { store }
    }

    fn record(&self, id: &str) -> RankResult<&'a ItemRecord> {
        self.store.get_record(id).ok_or_else(|| RankError::unknown_item(id))
    }

    pub fn stability(&self, id: &str) -> RankResult<f64> {
        self.record(id).map(stability)
    }

    pub fn confidence(&self, id: &str) -> RankResult<f64> {
        self.record(id).map(confidence)
    }

    pub fn breakdown(&self, id: &str) -> RankResult<ConfidenceBreakdown> {
        self.record(id).map(breakdown)
    }

    pub fn compare(&self, first: &str, second: &str) -> RankResult<ConfidenceComparison> {
        let a = self.breakdown(first)?;
        let b = self.breakdown(second)?;
        let needs_attention = if a.confidence < b.confidence { first } else { second };
        let difference = (a.confidence - b.confidence).abs();
        Ok(ConfidenceComparison {
            needs_attention: needs_attention.to_string(),
            difference,
            first: (first.to_string(), a),
            second: (second.to_string(), b),
        })
    }

    /// `(id, confidence)` for every known id, in input order. Unknown ids are skipped.
    fn scored<S: AsRef<str>>(&self, ids: &[S]) -> Vec<(ItemId, f64)> {
        ids.iter()
            .filter_map(|id| {
                let id = id.as_ref();
                self.store.get_record(id).map(|r| (id.to_string(), confidence(r)))
            })
            .collect()
    }

    /// The `count` least confident items, lowest first.
    pub fn lowest<S: AsRef<str>>(&self, ids: &[S], count: usize) -> Vec<(ItemId, f64)> {
        let mut scored = self.scored(ids);
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(count);
        scored
    }

    /// The `count` most confident items, highest first.
    pub fn highest<S: AsRef<str>>(&self, ids: &[S], count: usize) -> Vec<(ItemId, f64)> {
        let mut scored = self.scored(ids);
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(count);
        scored
    }

    pub fn statistics<S: AsRef<str>>(&self, ids: &[S]) -> ConfidenceStatistics {
        let values: Vec<f64> = self.scored(ids).into_iter().map(|(_, c)| c).collect();
        if values.is_empty() {
            return ConfidenceStatistics::default();
        }
        ConfidenceStatistics {
            count: values.len(),
            mean: values.iter().sum::<f64>() / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: sample_std_dev(&values),
        }
    }
}
