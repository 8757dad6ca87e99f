//! tierrank-core: pairwise-vote tiering engine.
//!
//! Pick a pair → record which item won → tiers move by ±1 within adaptive
//! bounds → confidence grows as tier histories settle. No IO, no UI, no
//! filesystem. Snapshots are plain JSON strings and the caller owns storage.
//!
//! Items are identified by caller-provided string IDs (image filenames in
//! practice). Records are created the first time an ID is seen.
//!
//! # Quick start
//!
//! ```rust
//! use tierrank_core::{EngineConfig, RankingEngine, RankingMetric};
//!
//! let mut engine = RankingEngine::new(EngineConfig { seed: Some(7), ..EngineConfig::default() })?;
//! let images = ["a.png", "b.png", "c.png"];
//!
//! for _ in 0..10 {
//!     let (left, right) = engine.select_next_pair(&images, None).expect("three candidates");
//!     // Ask a human. Here the alphabetically first file always wins.
//!     let (winner, loser) = if left < right { (left, right) } else { (right, left) };
//!     engine.record_vote(&winner, &loser)?;
//! }
//!
//! let rankings = engine.all_rankings();
//! for entry in rankings.by(RankingMetric::Tier) {
//!     println!("{}: tier {} ({} votes)", entry.id, entry.current_tier, entry.vote_count);
//! }
//!
//! let json = engine.save_snapshot()?;
//! let mut restored = RankingEngine::new(EngineConfig::default())?;
//! restored.load_snapshot(&json)?;
//! assert_eq!(restored.vote_count(), 10);
//! # Ok::<(), tierrank_core::RankError>(())
//! ```

pub mod bounds;
pub mod confidence;
pub mod constants;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod pairing;
pub mod rankings;
pub mod settings;
pub mod snapshot;
pub mod stats;
pub mod types;
pub mod weights;

// Re-export primary public API at crate root.
pub use bounds::{BoundsInfo, MoveDecision, TierBounds, TierBoundsConfig, TierBoundsManager};
pub use confidence::{ConfidenceBreakdown, ConfidenceCalculator, ConfidenceComparison, ConfidenceStatistics};
pub use distribution::{TierAnalysis, TierDistributionInfo};
pub use engine::{EngineConfig, RankingEngine, SharedEngine};
pub use error::{RankError, RankResult};
pub use pairing::PairSelector;
pub use rankings::{RankingEntry, RankingMetric, Rankings, RankingsCache};
pub use settings::{AlgorithmSettings, SettingInfo};
pub use snapshot::LoadReport;
pub use stats::{IntegrityIssue, OverallStatistics, StatsStore, VoteOutcome};
pub use types::{ItemId, ItemRecord, LastVoted, Matchup, Pair, Side};
pub use weights::{PriorityPreferences, WeightManager, WeightVector};
