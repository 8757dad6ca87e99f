use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{INITIAL_TIER, NEVER_VOTED_SENTINEL};

/// Caller-provided stable item identifier (an image filename in practice).
pub type ItemId = String;

/// A pairing: (left, right) item IDs to be compared.
pub type Pair = (ItemId, ItemId);

/// When an item last took part in a vote, in global vote-counter units.
///
/// On the wire this is a plain integer with `-1` meaning "never".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum LastVoted {
    #[default]
    Never,
    At(u64),
}

impl LastVoted {
    pub fn at(self) -> Option<u64> {
        match self {
            LastVoted::Never => None,
            LastVoted::At(n) => Some(n),
        }
    }
}

impl From<i64> for LastVoted {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            LastVoted::Never
        } else {
            LastVoted::At(raw as u64)
        }
    }
}

impl From<LastVoted> for i64 {
    fn from(value: LastVoted) -> Self {
        match value {
            LastVoted::Never => NEVER_VOTED_SENTINEL,
            LastVoted::At(n) => i64::try_from(n).unwrap_or(i64::MAX),
        }
    }
}

/// One entry of an item's matchup history.
///
/// Serialised as `[opponent, won, vote_index]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(ItemId, bool, u64)", into = "(ItemId, bool, u64)")]
pub struct Matchup {
    pub opponent: ItemId,
    pub won: bool,
    /// Global vote counter value of this vote.
    pub vote_index: u64,
}

impl From<(ItemId, bool, u64)> for Matchup {
    fn from((opponent, won, vote_index): (ItemId, bool, u64)) -> Self {
        Matchup { opponent, won, vote_index }
    }
}

impl From<Matchup> for (ItemId, bool, u64) {
    fn from(m: Matchup) -> Self {
        (m.opponent, m.won, m.vote_index)
    }
}

/// Voting record of a single item.
///
/// Only `StatsStore` mutates records, which keeps `wins + losses == votes`
/// and `tier_history.last() == current_tier` true between calls. Every field
/// has a serde default so snapshots written by older versions still load;
/// the load path repairs whatever the defaults leave inconsistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(default)]
    pub(crate) votes: u32,
    #[serde(default)]
    pub(crate) wins: u32,
    #[serde(default)]
    pub(crate) losses: u32,
    #[serde(default)]
    pub(crate) current_tier: i32,
    #[serde(default)]
    pub(crate) tier_history: Vec<i32>,
    #[serde(default)]
    pub(crate) last_voted: LastVoted,
    #[serde(default)]
    pub(crate) matchup_history: Vec<Matchup>,
    #[serde(default, rename = "binned")]
    pub(crate) excluded: bool,
    /// Global vote count at the time of exclusion.
    #[serde(default, rename = "binned_vote_count", skip_serializing_if = "Option::is_none")]
    pub(crate) excluded_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) notes: Vec<String>,
}

impl ItemRecord {
    pub(crate) fn new(last_voted: LastVoted) -> Self {
        ItemRecord {
            votes: 0,
            wins: 0,
            losses: 0,
            current_tier: INITIAL_TIER,
            tier_history: vec![INITIAL_TIER],
            last_voted,
            matchup_history: Vec::new(),
            excluded: false,
            excluded_at: None,
            notes: Vec::new(),
        }
    }

    pub fn votes(&self) -> u32 {
        self.votes
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    pub fn current_tier(&self) -> i32 {
        self.current_tier
    }

    pub fn tier_history(&self) -> &[i32] {
        &self.tier_history
    }

    pub fn last_voted(&self) -> LastVoted {
        self.last_voted
    }

    pub fn matchup_history(&self) -> &[Matchup] {
        &self.matchup_history
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn excluded_at(&self) -> Option<u64> {
        self.excluded_at
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Fraction of votes won, 0 for an item that has never been voted on.
    pub fn win_rate(&self) -> f64 {
        if self.votes == 0 {
            0.0
        } else {
            self.wins as f64 / self.votes as f64
        }
    }

    /// Votes since this item last took part; `None` if it never has.
    pub fn votes_since_last(&self, global_vote_count: u64) -> Option<u64> {
        self.last_voted.at().map(|n| global_vote_count.saturating_sub(n))
    }

    /// Move to `tier` and record it.
    pub(crate) fn push_tier(&mut self, tier: i32) {
        self.current_tier = tier;
        self.tier_history.push(tier);
    }
}

/// Which slot of the comparison a candidate is scored for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

#[cfg(test)]
impl ItemRecord {
    /// Build a record with an explicit history; wins/losses split from `wins`.
    pub(crate) fn with_history(wins: u32, losses: u32, history: Vec<i32>) -> Self {
        let current_tier = history.last().copied().unwrap_or(INITIAL_TIER);
        ItemRecord {
            votes: wins + losses,
            wins,
            losses,
            current_tier,
            tier_history: history,
            last_voted: LastVoted::At(0),
            matchup_history: Vec::new(),
            excluded: false,
            excluded_at: None,
            notes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_voted_wire_format() {
        assert_eq!(serde_json::to_string(&LastVoted::Never).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&LastVoted::At(7)).unwrap(), "7");
        assert_eq!(serde_json::from_str::<LastVoted>("-1").unwrap(), LastVoted::Never);
        assert_eq!(serde_json::from_str::<LastVoted>("12").unwrap(), LastVoted::At(12));
    }

    #[test]
    fn test_last_voted_ordering() {
        assert!(LastVoted::Never < LastVoted::At(0));
        assert!(LastVoted::At(3) < LastVoted::At(4));
    }

    #[test]
    fn test_matchup_wire_format() {
        let m = Matchup { opponent: "b.png".to_string(), won: true, vote_index: 3 };
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"["b.png",true,3]"#);
        let back: Matchup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_new_record_invariants() {
        let r = ItemRecord::new(LastVoted::At(0));
        assert_eq!(r.votes(), 0);
        assert_eq!(r.tier_history(), &[0]);
        assert_eq!(r.current_tier(), 0);
        assert_eq!(r.win_rate(), 0.0);
        assert!(!r.is_excluded());
    }

    #[test]
    fn test_record_missing_fields_use_defaults() {
        let r: ItemRecord = serde_json::from_str(r#"{"votes": 2, "wins": 1, "losses": 1}"#).unwrap();
        assert_eq!(r.votes(), 2);
        assert!(r.tier_history().is_empty());
        assert_eq!(r.last_voted(), LastVoted::Never);
    }

    #[test]
    fn test_votes_since_last() {
        let r = ItemRecord::new(LastVoted::At(10));
        assert_eq!(r.votes_since_last(15), Some(5));
        assert_eq!(r.votes_since_last(4), Some(0));
        assert_eq!(ItemRecord::new(LastVoted::Never).votes_since_last(4), None);
    }
}
