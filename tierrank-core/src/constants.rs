/// Tier every item starts in, and the tier a restored item returns to.
pub const INITIAL_TIER: i32 = 0;

/// Tier an excluded item is pinned to.
///
/// Tiers only move ±1 per vote, so no active item gets anywhere near this.
pub const EXCLUDED_TIER: i32 = -999;

/// Wire value of a "never voted" `last_voted` field.
pub const NEVER_VOTED_SENTINEL: i64 = -1;

/// Probability of attempting same-tier selection before the adjacent-tier pass.
///
/// Comparisons inside one tier are the ones that actually separate items,
/// so most picks stay in-tier. The remainder keeps neighbouring tiers mixing.
pub const SAME_TIER_PROBABILITY: f64 = 0.8;

/// Top-ranked candidates per side tried during same-tier selection.
pub const SAME_TIER_TOP_N: usize = 3;

/// Top-ranked candidates per side tried during the overall fallback.
pub const FALLBACK_TOP_N: usize = 5;

/// Attempts at uniform random sampling before giving up on a pair.
pub const RANDOM_PAIR_ATTEMPTS: usize = 10;

/// Cap on a tier's overpopulation ratio before normalising it into [0, 1].
pub const MAX_OVERPOPULATION_RATIO: f64 = 3.0;

/// Added to the maximum stability when normalising stability scores, so a
/// candidate set where every history is flat still yields finite scores.
pub const STABILITY_NORMALIZATION_EPSILON: f64 = 0.1;

/// Collections larger than this earn wider adaptive bounds.
pub const ADAPTIVE_BOUNDS_MIN_ITEMS: usize = 100;

/// Snapshot format version stamped on every save.
pub const SNAPSHOT_VERSION: &str = "2.2";

/// Snapshot versions that predate the current format but still load.
pub const LEGACY_SNAPSHOT_VERSIONS: &[&str] = &["1.0", "1.5", "2.0", "2.1"];

/// Largest tier magnitude a snapshot may carry. Votes move tiers one step at
/// a time, so anything beyond this was not produced by voting.
pub const MAX_SNAPSHOT_TIER: i32 = 1_000_000;

/// Largest global vote counter a snapshot may carry.
pub const MAX_SNAPSHOT_VOTE_COUNT: u64 = i64::MAX as u64;
