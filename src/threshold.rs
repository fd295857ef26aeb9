//! Minimum-holding admission filter.

use crate::coins::{Amount, Coins};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-asset minimums an account must reach in at least one asset to be ranked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumHoldings {
    minimums: BTreeMap<String, Amount>,
}

impl MinimumHoldings {
    /// Same minimum for every asset in `assets`.
    pub fn uniform<S: AsRef<str>>(assets: &[S], minimum: Amount) -> Self {
        let minimums = assets
            .iter()
            .map(|asset| (asset.as_ref().to_string(), minimum))
            .collect();
        Self { minimums }
    }

    /// Replaces the minimum of `asset`, tracking it if it was not yet.
    pub fn with_minimum(mut self, asset: impl Into<String>, minimum: Amount) -> Self {
        self.minimums.insert(asset.into(), minimum);
        self
    }

    /// Minimum configured for `asset`.
    pub fn minimum_of(&self, asset: &str) -> Option<Amount> {
        self.minimums.get(asset).copied()
    }

    /// True if `holdings` reaches the minimum of any tracked asset.
    pub fn admits(&self, holdings: &Coins) -> bool {
        admit(holdings, &self.minimums)
    }
}

/// Logical OR over assets: one qualifying asset is enough.
///
/// A zero minimum admits every account.  An empty minimum map admits nothing.
pub fn admit(holdings: &Coins, minimums: &BTreeMap<String, Amount>) -> bool {
    minimums
        .iter()
        .any(|(asset, minimum)| holdings.amount_of(asset) >= *minimum)
}
