/// Per-item voting records and the global vote counter.
///
/// The store is the single source of truth for tier state. `record_vote` is
/// the only path that moves an item between tiers; exclusion pins an item to
/// `EXCLUDED_TIER` and restoring puts it back at the initial tier.
///
/// Records are kept in a `BTreeMap` so every iteration (and therefore pair
/// selection under a fixed seed) is deterministic.
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bounds::{MoveDecision, TierBoundsManager};
use crate::constants::{EXCLUDED_TIER, INITIAL_TIER};
use crate::error::{RankError, RankResult};
use crate::types::{ItemId, ItemRecord, LastVoted, Matchup};

/// What a recorded vote did to both participants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    /// Global vote counter value assigned to this vote.
    pub vote_index: u64,
    pub winner_tier: i32,
    pub loser_tier: i32,
    pub winner_move: MoveDecision,
    pub loser_move: MoveDecision,
}

/// Collection-wide summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStatistics {
    pub total_items: usize,
    pub active_items: usize,
    pub excluded_items: usize,
    pub total_votes: u64,
    pub avg_votes_per_item: f64,
    pub tier_distribution: BTreeMap<i32, usize>,
}

/// A broken invariant found by `validate_integrity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntegrityIssue {
    WinLossMismatch { id: ItemId, wins: u32, losses: u32, votes: u32 },
    EmptyHistory { id: ItemId },
    HistoryMismatch { id: ItemId, last: i32, current: i32 },
    GlobalVoteMismatch { recorded: u64, expected: u64 },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::WinLossMismatch { id, wins, losses, votes } => {
                write!(f, "{id}: wins ({wins}) + losses ({losses}) != votes ({votes})")
            }
            IntegrityIssue::EmptyHistory { id } => write!(f, "{id}: empty tier history"),
            IntegrityIssue::HistoryMismatch { id, last, current } => {
                write!(f, "{id}: last history entry {last} != current tier {current}")
            }
            IntegrityIssue::GlobalVoteMismatch { recorded, expected } => write!(
                f,
                "per-item votes sum to {recorded}, expected {expected} (two per recorded vote)"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsStore {
    vote_count: u64,
    records: BTreeMap<ItemId, ItemRecord>,
}

impl StatsStore {
    pub fn new() -> Self {
        StatsStore::default()
    }

    pub(crate) fn from_parts(vote_count: u64, records: BTreeMap<ItemId, ItemRecord>) -> Self {
        StatsStore { vote_count, records }
    }

    pub(crate) fn records_map(&self) -> &BTreeMap<ItemId, ItemRecord> {
        &self.records
    }

    /// Global vote counter. Monotonic; one increment per recorded vote.
    pub fn vote_count(&self) -> u64 {
        self.vote_count
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get_record(&self, id: &str) -> Option<&ItemRecord> {
        self.records.get(id)
    }

    /// All records, excluded ones included, in ID order.
    pub fn records(&self) -> impl Iterator<Item = (&ItemId, &ItemRecord)> {
        self.records.iter()
    }

    /// Records that are still candidates for selection.
    pub fn active_records(&self) -> impl Iterator<Item = (&ItemId, &ItemRecord)> {
        self.records.iter().filter(|(_, r)| !r.is_excluded())
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.records.keys().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_records().count()
    }

    pub fn active_ids(&self) -> Vec<ItemId> {
        self.active_records().map(|(id, _)| id.clone()).collect()
    }

    pub fn excluded_ids(&self) -> Vec<ItemId> {
        self.records
            .iter()
            .filter(|(_, r)| r.is_excluded())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Lowest and highest tier among active records.
    pub fn active_tier_range(&self) -> Option<(i32, i32)> {
        self.active_records().map(|(_, r)| r.current_tier()).fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }

    /// `last_voted` for a newly seen item.
    ///
    /// New items land roughly mid-way into the existing recency range so a
    /// batch of them does not all tie for "most stale".
    pub fn strategic_last_voted(&self) -> LastVoted {
        if self.records.is_empty() {
            return LastVoted::At(0);
        }
        let highest = self
            .records
            .values()
            .filter_map(|r| r.last_voted().at())
            .max()
            .unwrap_or(0);
        LastVoted::At(1 + highest / 2)
    }

    /// Create a record for `id` if it has none. Returns `true` if created.
    ///
    /// On an existing record this only backfills an empty tier history.
    pub fn initialize(&mut self, id: &str) -> bool {
        if let Some(record) = self.records.get_mut(id) {
            if record.tier_history.is_empty() {
                record.tier_history.push(record.current_tier);
            }
            return false;
        }
        let last_voted = self.strategic_last_voted();
        self.records.insert(id.to_string(), ItemRecord::new(last_voted));
        debug!(item = id, ?last_voted, "initialized item record");
        true
    }

    /// Initialize every ID; returns how many records were created.
    pub fn initialize_many<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        ids.iter().filter(|id| self.initialize(id.as_ref())).count()
    }

    /// Record that `winner` beat `loser`.
    ///
    /// Fails without touching any state if either ID is unknown or excluded,
    /// both name the same item, or a vote counter is at its limit. A move refused by `bounds` keeps the tier
    /// where it is, but the unchanged tier is still appended to the history
    /// and the vote still counts.
    pub fn record_vote(
        &mut self,
        winner: &str,
        loser: &str,
        bounds: &TierBoundsManager,
        tier_distribution_std: f64,
    ) -> RankResult<VoteOutcome> {
        if winner == loser {
            return Err(RankError::invalid_pair(winner, loser, "winner and loser are the same item"));
        }
        let winner_record = self
            .records
            .get(winner)
            .ok_or_else(|| RankError::invalid_pair(winner, loser, format!("unknown item {winner}")))?;
        let loser_record = self
            .records
            .get(loser)
            .ok_or_else(|| RankError::invalid_pair(winner, loser, format!("unknown item {loser}")))?;
        for (id, record) in [(winner, winner_record), (loser, loser_record)] {
            if record.is_excluded() {
                return Err(RankError::invalid_pair(winner, loser, format!("{id} is excluded")));
            }
            if record.votes() == u32::MAX {
                return Err(RankError::validation("votes", format!("{id} has reached the vote limit")));
            }
        }
        let vote_index = self
            .vote_count
            .checked_add(1)
            .ok_or_else(|| RankError::validation("vote_count", "global vote counter is exhausted"))?;

        let winner_current = winner_record.current_tier();
        let loser_current = loser_record.current_tier();
        let winner_target = winner_current.saturating_add(1);
        let loser_target = loser_current.saturating_sub(1);

        self.vote_count = vote_index;

        let winner_move = bounds.can_move_to_tier(winner, winner_target, self, tier_distribution_std);
        let loser_move = bounds.can_move_to_tier(loser, loser_target, self, tier_distribution_std);

        let winner_tier = if winner_move.is_allowed() { winner_target } else { winner_current };
        let loser_tier = if loser_move.is_allowed() { loser_target } else { loser_current };

        self.apply_result(winner, loser, true, winner_tier, vote_index);
        self.apply_result(loser, winner, false, loser_tier, vote_index);

        debug!(
            vote = vote_index,
            winner,
            loser,
            winner_tier,
            loser_tier,
            winner_move = %winner_move,
            loser_move = %loser_move,
            "recorded vote"
        );

        Ok(VoteOutcome {
            vote_index,
            winner_tier,
            loser_tier,
            winner_move,
            loser_move,
        })
    }

    fn apply_result(&mut self, id: &str, opponent: &str, won: bool, tier: i32, vote_index: u64) {
        // Both IDs were checked by record_vote before any mutation.
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        record.votes = record.votes.saturating_add(1);
        if won {
            record.wins = record.wins.saturating_add(1);
        } else {
            record.losses = record.losses.saturating_add(1);
        }
        record.push_tier(tier);
        record.last_voted = LastVoted::At(vote_index);
        record.matchup_history.push(Matchup {
            opponent: opponent.to_string(),
            won,
            vote_index,
        });
    }

    /// Remove an item from future selection, keeping its record.
    /// Returns `false` if it was already excluded.
    pub fn exclude(&mut self, id: &str) -> RankResult<bool> {
        let vote_count = self.vote_count;
        let record = self.records.get_mut(id).ok_or_else(|| RankError::unknown_item(id))?;
        if record.is_excluded() {
            return Ok(false);
        }
        record.excluded = true;
        record.excluded_at = Some(vote_count);
        record.push_tier(EXCLUDED_TIER);
        record.notes.push(format!("Excluded at vote {vote_count}"));
        info!(item = id, vote = vote_count, "excluded item");
        Ok(true)
    }

    /// Return an excluded item to the candidate pool at the initial tier.
    /// History is kept. Returns `false` if it was not excluded.
    pub fn unexclude(&mut self, id: &str) -> RankResult<bool> {
        let vote_count = self.vote_count;
        let record = self.records.get_mut(id).ok_or_else(|| RankError::unknown_item(id))?;
        if !record.is_excluded() {
            return Ok(false);
        }
        record.excluded = false;
        record.excluded_at = None;
        record.push_tier(INITIAL_TIER);
        record.notes.push(format!("Restored at vote {vote_count}"));
        info!(item = id, vote = vote_count, "restored item");
        Ok(true)
    }

    /// Histogram of `current_tier` over active records.
    pub fn tier_distribution(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for (_, record) in self.active_records() {
            *counts.entry(record.current_tier()).or_insert(0) += 1;
        }
        counts
    }

    pub fn overall_statistics(&self) -> OverallStatistics {
        let total_items = self.records.len();
        let active_items = self.active_count();
        let avg_votes_per_item = if total_items == 0 {
            0.0
        } else {
            self.records.values().map(|r| r.votes() as f64).sum::<f64>() / total_items as f64
        };
        OverallStatistics {
            total_items,
            active_items,
            excluded_items: total_items - active_items,
            total_votes: self.vote_count,
            avg_votes_per_item,
            tier_distribution: self.tier_distribution(),
        }
    }

    /// Audit the record invariants without fixing anything.
    pub fn validate_integrity(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        let mut recorded: u64 = 0;
        for (id, r) in &self.records {
            recorded = recorded.saturating_add(u64::from(r.votes()));
            if r.wins().checked_add(r.losses()) != Some(r.votes()) {
                issues.push(IntegrityIssue::WinLossMismatch {
                    id: id.clone(),
                    wins: r.wins(),
                    losses: r.losses(),
                    votes: r.votes(),
                });
            }
            match r.tier_history().last() {
                None => issues.push(IntegrityIssue::EmptyHistory { id: id.clone() }),
                Some(&last) if last != r.current_tier() => {
                    issues.push(IntegrityIssue::HistoryMismatch {
                        id: id.clone(),
                        last,
                        current: r.current_tier(),
                    })
                }
                Some(_) => {}
            }
        }
        let expected = self.vote_count.saturating_mul(2);
        if recorded != expected {
            issues.push(IntegrityIssue::GlobalVoteMismatch { recorded, expected });
        }
        issues
    }

    // -----------------------------------------------------------------------
    // Load-time repairs (used by snapshot decoding)
    // -----------------------------------------------------------------------

    /// Set `votes = wins + losses` wherever they disagree. Returns the number fixed.
    ///
    /// Snapshot decoding rejects records whose sum overflows before calling this.
    pub(crate) fn fix_vote_counts(&mut self) -> usize {
        let mut fixed = 0;
        for (id, record) in self.records.iter_mut() {
            let expected = record.wins.saturating_add(record.losses);
            if record.votes != expected {
                warn!(item = %id, stored = record.votes, corrected = expected, "corrected vote count");
                record.votes = expected;
                fixed += 1;
            }
        }
        fixed
    }

    /// Make every history non-empty and ending in the current tier.
    pub(crate) fn repair_histories(&mut self) -> usize {
        let mut repaired = 0;
        for (id, record) in self.records.iter_mut() {
            if record.tier_history.last() != Some(&record.current_tier) {
                warn!(item = %id, tier = record.current_tier, "repaired tier history");
                record.tier_history.push(record.current_tier);
                repaired += 1;
            }
        }
        repaired
    }

    /// Mark `id` excluded without a history note, creating the record if
    /// needed. Returns `true` if it was not excluded before.
    pub(crate) fn mark_excluded(&mut self, id: &str) -> bool {
        self.initialize(id);
        let vote_count = self.vote_count;
        match self.records.get_mut(id) {
            Some(record) if !record.excluded => {
                record.excluded = true;
                record.excluded_at.get_or_insert(vote_count);
                true
            }
            _ => false,
        }
    }

    /// Pin every excluded record to `EXCLUDED_TIER`.
    pub(crate) fn pin_excluded(&mut self) {
        for record in self.records.values_mut() {
            if record.excluded && record.current_tier != EXCLUDED_TIER {
                record.push_tier(EXCLUDED_TIER);
            }
        }
    }

    /// Replace every `Never` last-voted value using the strategic default,
    /// one record at a time in ID order. Returns the number replaced.
    pub(crate) fn rederive_never_voted(&mut self) -> usize {
        let pending: Vec<ItemId> = self
            .records
            .iter()
            .filter(|(_, r)| r.last_voted == LastVoted::Never)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &pending {
            let highest = self
                .records
                .values()
                .filter_map(|r| r.last_voted().at())
                .max()
                .unwrap_or(0);
            if let Some(record) = self.records.get_mut(id) {
                record.last_voted = LastVoted::At(1 + highest / 2);
            }
        }
        pending.len()
    }
}

#[cfg(test)]
impl StatsStore {
    pub(crate) fn insert_record(&mut self, id: &str, record: ItemRecord) {
        self.records.insert(id.to_string(), record);
    }
}
