/// Algorithm settings with range validation on every write.
///
/// A rejected write returns `RankError::Validation` and leaves the previous
/// value in place. Values are never clamped.
use serde::{Deserialize, Serialize};

use crate::error::{RankError, RankResult};

pub const DEFAULT_TIER_DISTRIBUTION_STD: f64 = 1.5;
pub const DEFAULT_CONFIDENCE_VOTE_SCALE: f64 = 20.0;
pub const DEFAULT_CONFIDENCE_BALANCE: f64 = 0.5;
pub const DEFAULT_OVERFLOW_THRESHOLD: f64 = 1.0;
pub const DEFAULT_MIN_OVERFLOW_IMAGES: u32 = 2;
pub const DEFAULT_MIN_VOTES_FOR_STABILITY: u32 = 6;

/// Static description of one tunable setting.
#[derive(Debug, Clone, Copy)]
struct SettingDef {
    name: &'static str,
    min: f64,
    max: f64,
    integer: bool,
    default: f64,
    description: &'static str,
}

const SETTING_DEFS: [SettingDef; 6] = [
    SettingDef {
        name: "tier_distribution_std",
        min: 0.5,
        max: 5.0,
        integer: false,
        default: DEFAULT_TIER_DISTRIBUTION_STD,
        description: "Standard deviation of the expected tier distribution",
    },
    SettingDef {
        name: "confidence_vote_scale",
        min: 1.0,
        max: 100.0,
        integer: false,
        default: DEFAULT_CONFIDENCE_VOTE_SCALE,
        description: "Scale factor for confidence calculation",
    },
    SettingDef {
        name: "confidence_balance",
        min: 0.0,
        max: 1.0,
        integer: false,
        default: DEFAULT_CONFIDENCE_BALANCE,
        description: "Balance between stability and vote count",
    },
    SettingDef {
        name: "overflow_threshold",
        min: 0.5,
        max: 3.0,
        integer: false,
        default: DEFAULT_OVERFLOW_THRESHOLD,
        description: "Actual/expected ratio above which a tier counts as over-populated",
    },
    SettingDef {
        name: "min_overflow_images",
        min: 1.0,
        max: 20.0,
        integer: true,
        default: DEFAULT_MIN_OVERFLOW_IMAGES as f64,
        description: "Minimum items in a tier before it can count as over-populated",
    },
    SettingDef {
        name: "min_votes_for_stability",
        min: 1.0,
        max: 50.0,
        integer: true,
        default: DEFAULT_MIN_VOTES_FOR_STABILITY as f64,
        description: "Minimum votes for stability calculation",
    },
];

fn lookup(name: &str) -> RankResult<&'static SettingDef> {
    SETTING_DEFS
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| RankError::validation(name, "unknown setting"))
}

fn check(def: &SettingDef, value: f64) -> RankResult<()> {
    if !value.is_finite() {
        return Err(RankError::validation(def.name, format!("{value} is not a finite number")));
    }
    if def.integer && value.fract() != 0.0 {
        return Err(RankError::validation(def.name, format!("{value} is not an integer")));
    }
    if value < def.min || value > def.max {
        return Err(RankError::validation(
            def.name,
            format!("{value} is outside [{}, {}]", def.min, def.max),
        ));
    }
    Ok(())
}

/// Current value and limits of one setting, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingInfo {
    pub name: &'static str,
    pub value: f64,
    pub default: f64,
    pub range: (f64, f64),
    pub description: &'static str,
}

/// Tunable parameters of the tiering algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmSettings {
    tier_distribution_std: f64,
    confidence_vote_scale: f64,
    confidence_balance: f64,
    overflow_threshold: f64,
    min_overflow_images: u32,
    min_votes_for_stability: u32,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        AlgorithmSettings {
            tier_distribution_std: DEFAULT_TIER_DISTRIBUTION_STD,
            confidence_vote_scale: DEFAULT_CONFIDENCE_VOTE_SCALE,
            confidence_balance: DEFAULT_CONFIDENCE_BALANCE,
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
            min_overflow_images: DEFAULT_MIN_OVERFLOW_IMAGES,
            min_votes_for_stability: DEFAULT_MIN_VOTES_FOR_STABILITY,
        }
    }
}

impl AlgorithmSettings {
    pub fn tier_distribution_std(&self) -> f64 {
        self.tier_distribution_std
    }

    pub fn confidence_vote_scale(&self) -> f64 {
        self.confidence_vote_scale
    }

    pub fn confidence_balance(&self) -> f64 {
        self.confidence_balance
    }

    pub fn overflow_threshold(&self) -> f64 {
        self.overflow_threshold
    }

    pub fn min_overflow_images(&self) -> u32 {
        self.min_overflow_images
    }

    pub fn min_votes_for_stability(&self) -> u32 {
        self.min_votes_for_stability
    }

    pub fn set_tier_distribution_std(&mut self, value: f64) -> RankResult<()> {
        self.set_by_name("tier_distribution_std", value)
    }

    pub fn set_confidence_vote_scale(&mut self, value: f64) -> RankResult<()> {
        self.set_by_name("confidence_vote_scale", value)
    }

    pub fn set_confidence_balance(&mut self, value: f64) -> RankResult<()> {
        self.set_by_name("confidence_balance", value)
    }

    pub fn set_overflow_threshold(&mut self, value: f64) -> RankResult<()> {
        self.set_by_name("overflow_threshold", value)
    }

    pub fn set_min_overflow_images(&mut self, value: u32) -> RankResult<()> {
        self.set_by_name("min_overflow_images", value as f64)
    }

    pub fn set_min_votes_for_stability(&mut self, value: u32) -> RankResult<()> {
        self.set_by_name("min_votes_for_stability", value as f64)
    }

    /// Write a setting by its snake_case name. Integer settings reject
    /// values with a fractional part.
    pub fn set_by_name(&mut self, name: &str, value: f64) -> RankResult<()> {
        let def = lookup(name)?;
        check(def, value)?;
        match def.name {
            "tier_distribution_std" => self.tier_distribution_std = value,
            "confidence_vote_scale" => self.confidence_vote_scale = value,
            "confidence_balance" => self.confidence_balance = value,
            "overflow_threshold" => self.overflow_threshold = value,
            "min_overflow_images" => self.min_overflow_images = value as u32,
            "min_votes_for_stability" => self.min_votes_for_stability = value as u32,
            _ => unreachable!("every setting name has a field"),
        }
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        match name {
            "tier_distribution_std" => Some(self.tier_distribution_std),
            "confidence_vote_scale" => Some(self.confidence_vote_scale),
            "confidence_balance" => Some(self.confidence_balance),
            "overflow_threshold" => Some(self.overflow_threshold),
            "min_overflow_images" => Some(self.min_overflow_images as f64),
            "min_votes_for_stability" => Some(self.min_votes_for_stability as f64),
            _ => None,
        }
    }

    /// Check every field, e.g. after deserialising from a file.
    pub fn validate(&self) -> RankResult<()> {
        for def in &SETTING_DEFS {
            if let Some(value) = self.get_by_name(def.name) {
                check(def, value)?;
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> Vec<SettingInfo> {
        SETTING_DEFS
            .iter()
            .map(|def| SettingInfo {
                name: def.name,
                value: self.get_by_name(def.name).unwrap_or(def.default),
                default: def.default,
                range: (def.min, def.max),
                description: def.description,
            })
            .collect()
    }

    pub fn reset_to_defaults(&mut self) {
        *self = AlgorithmSettings::default();
    }
}
