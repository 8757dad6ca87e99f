/// Config file loading and creation for the tierrank CLI.
///
/// Config lives at ~/.config/tierrank/config.toml.
/// All fields are optional; CLI args override config values.
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tierrank_core::{AlgorithmSettings, EngineConfig, PriorityPreferences, TierBoundsConfig, WeightVector};

use crate::bail;

#[derive(Deserialize, Default)]
pub struct TierrankConfig {
    pub state: Option<PathBuf>,
    pub seed: Option<u64>,
    pub tier_bounds: Option<TierBoundsConfig>,
    pub algorithm: Option<AlgorithmSettings>,
    pub left_weights: Option<WeightVector>,
    pub right_weights: Option<WeightVector>,
    pub left_preferences: Option<PriorityPreferences>,
    pub right_preferences: Option<PriorityPreferences>,
}

impl TierrankConfig {
    /// Engine configuration with every unset key at its default.
    pub fn engine_config(&self, seed: Option<u64>) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            tier_bounds: self.tier_bounds.unwrap_or(defaults.tier_bounds),
            algorithm: self.algorithm.clone().unwrap_or(defaults.algorithm),
            left_weights: self.left_weights.unwrap_or(defaults.left_weights),
            right_weights: self.right_weights.unwrap_or(defaults.right_weights),
            left_preferences: self.left_preferences.unwrap_or(defaults.left_preferences),
            right_preferences: self.right_preferences.unwrap_or(defaults.right_preferences),
            seed: seed.or(self.seed),
        }
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# tierrank configuration
# All values here can be overridden by CLI flags.

# Snapshot file used when --state is not given
# state = \"/home/me/pictures/tierrank.json\"

# Fixed seed for pair selection (omit for a fresh random stream each run)
# seed = 42

# Tier bounds are not stored in snapshots; they always come from here.
# [tier_bounds]
# enabled = true
# std_multiplier = 3.0
# min_confidence = 0.8
# min_votes = 10
# adaptive = true

# Algorithm settings for new collections. A loaded snapshot brings its own;
# change those with `tierrank settings --set name=value`.
# [algorithm]
# tier_distribution_std = 1.5
# overflow_threshold = 1.0
# min_overflow_images = 2

# Selection weights per comparison slot (all four keys required).
# [left_weights]
# recency = 0.25
# low_votes = 0.25
# instability = 0.25
# tier_size = 0.25

# [right_preferences]
# prioritize_high_stability = true
# prioritize_high_votes = true
";

/// Returns the default config path: ~/.config/tierrank/config.toml
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home).join(".config").join("tierrank").join("config.toml")
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> TierrankConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => TierrankConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

fn parse_config(content: &str) -> Result<TierrankConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config() -> PathBuf {
    let path = config_path();

    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));

    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let cfg = parse_config(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert!(cfg.state.is_none());
        assert_eq!(cfg.engine_config(None), EngineConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = parse_config(
            r#"
            seed = 5
            [tier_bounds]
            adaptive = false
            [algorithm]
            tier_distribution_std = 2.0
            "#,
        )
        .unwrap();
        let engine = cfg.engine_config(None);
        assert_eq!(engine.seed, Some(5));
        assert!(!engine.tier_bounds.adaptive);
        assert_eq!(engine.tier_bounds.min_votes, 10);
        assert_eq!(engine.algorithm.tier_distribution_std(), 2.0);
        assert_eq!(cfg.engine_config(Some(9)).seed, Some(9));
    }

    #[test]
    fn test_incomplete_weights_rejected() {
        assert!(parse_config("[left_weights]\nrecency = 1.0\n").is_err());
    }
}
