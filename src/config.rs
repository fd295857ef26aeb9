//! Tracker configuration.
//!
//! Values come from three layers: built-in defaults, an optional JSON file
//! (missing file means defaults), and `PT_*` environment variables.

use crate::coins::Amount;
use crate::threshold::MinimumHoldings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One whole token in micro-units.
pub const MICRO_UNIT: Amount = 1_000_000;

/// Default leaderboard length.
pub const DEFAULT_LEADERBOARD_SIZE: usize = 1_000;

/// Default cap on unbonding delegations read per account.
pub const DEFAULT_MAX_UNBONDING_ENTRIES: usize = 100;

/// Blocks per week at six-second blocks.
pub const DEFAULT_BLOCKS_PER_EPOCH: u64 = 100_800;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    /// File could not be read.
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    /// File is not valid configuration JSON.
    Parse(#[from] serde_json::Error),
    #[error("invalid {key}: {value}")]
    /// An environment override could not be parsed.
    Env {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Settings for snapshot tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Directory receiving artifacts.
    pub output_dir: PathBuf,
    /// Entries per asset leaderboard.
    pub leaderboard_size: usize,
    /// Entries in the delegator leaderboard; `None` disables it.
    pub delegator_leaderboard_size: Option<usize>,
    /// Minimum holding applied to every tracked asset.
    pub min_holding: Amount,
    /// Per-asset minimum overrides.
    pub min_holding_overrides: BTreeMap<String, Amount>,
    /// Cap on unbonding delegations read per account.
    pub max_unbonding_entries: usize,
    /// Snapshot every this many blocks.
    pub blocks_per_epoch: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            output_dir: env::temp_dir().join("power_tracker"),
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            delegator_leaderboard_size: None,
            min_holding: MICRO_UNIT,
            min_holding_overrides: BTreeMap::new(),
            max_unbonding_entries: DEFAULT_MAX_UNBONDING_ENTRIES,
            blocks_per_epoch: DEFAULT_BLOCKS_PER_EPOCH,
        }
    }
}

impl TrackingConfig {
    /// Load from JSON; missing file -> defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Applies `PT_*` environment overrides on top of `self`.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = value("PT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = value("PT_LEADERBOARD_SIZE") {
            self.leaderboard_size = parse("PT_LEADERBOARD_SIZE", &raw)?;
        }
        if let Some(raw) = value("PT_DELEGATOR_LEADERBOARD_SIZE") {
            let size: usize = parse("PT_DELEGATOR_LEADERBOARD_SIZE", &raw)?;
            self.delegator_leaderboard_size = (size > 0).then_some(size);
        }
        if let Some(raw) = value("PT_MIN_HOLDING") {
            self.min_holding = parse("PT_MIN_HOLDING", &raw)?;
        }
        if let Some(raw) = value("PT_MAX_UNBONDING_ENTRIES") {
            self.max_unbonding_entries = parse("PT_MAX_UNBONDING_ENTRIES", &raw)?;
        }
        if let Some(raw) = value("PT_BLOCKS_PER_EPOCH") {
            self.blocks_per_epoch = parse("PT_BLOCKS_PER_EPOCH", &raw)?;
        }
        Ok(self)
    }

    /// Minimum-holding filter for `assets`.
    pub fn minimums_for<S: AsRef<str>>(&self, assets: &[S]) -> MinimumHoldings {
        let mut minimums = MinimumHoldings::uniform(assets, self.min_holding);
        for asset in assets {
            if let Some(min) = self.min_holding_overrides.get(asset.as_ref()) {
                minimums = minimums.with_minimum(asset.as_ref(), *min);
            }
        }
        minimums
    }

    /// True when a snapshot is due at `height`.
    pub fn is_epoch_boundary(&self, height: u64) -> bool {
        self.blocks_per_epoch > 0 && height > 0 && height % self.blocks_per_epoch == 0
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Env {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::temp_path;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = TrackingConfig::load(&temp_path("absent.json")).unwrap();
        assert_eq!(cfg, TrackingConfig::default());
        assert_eq!(cfg.leaderboard_size, 1_000);
        assert_eq!(cfg.min_holding, MICRO_UNIT);
        assert_eq!(cfg.max_unbonding_entries, 100);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = temp_path("tracking.json");
        fs::write(
            &path,
            r#"{"leaderboard_size": 5, "min_holding": 10, "min_holding_overrides": {"ukrw": 1}}"#,
        )
        .unwrap();
        let cfg = TrackingConfig::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(cfg.leaderboard_size, 5);
        assert_eq!(cfg.min_holding, 10);
        assert_eq!(cfg.blocks_per_epoch, DEFAULT_BLOCKS_PER_EPOCH);

        let minimums = cfg.minimums_for(&["uluna", "ukrw"]);
        assert_eq!(minimums.minimum_of("uluna"), Some(10));
        assert_eq!(minimums.minimum_of("ukrw"), Some(1));
    }

    #[test]
    fn overrides_apply_and_reject_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PT_LEADERBOARD_SIZE", "25"),
            ("PT_DELEGATOR_LEADERBOARD_SIZE", "20"),
            ("PT_OUTPUT_DIR", "/var/lib/tracking"),
            ("PT_MIN_HOLDING", " "),
        ]);
        let cfg = TrackingConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.leaderboard_size, 25);
        assert_eq!(cfg.delegator_leaderboard_size, Some(20));
        assert_eq!(cfg.output_dir, PathBuf::from("/var/lib/tracking"));
        assert_eq!(cfg.min_holding, MICRO_UNIT);

        let err = TrackingConfig::default()
            .with_overrides(|k| (k == "PT_BLOCKS_PER_EPOCH").then(|| "weekly".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env {
                key: "PT_BLOCKS_PER_EPOCH",
                ..
            }
        ));
    }

    #[test]
    fn epoch_boundaries() {
        let cfg = TrackingConfig {
            blocks_per_epoch: 10,
            ..TrackingConfig::default()
        };
        assert!(!cfg.is_epoch_boundary(0));
        assert!(!cfg.is_epoch_boundary(9));
        assert!(cfg.is_epoch_boundary(10));
        assert!(cfg.is_epoch_boundary(30));
        let never = TrackingConfig {
            blocks_per_epoch: 0,
            ..TrackingConfig::default()
        };
        assert!(!never.is_epoch_boundary(10));
    }
}
