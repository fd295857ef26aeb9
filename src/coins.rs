//! Multi-asset amount vectors.
//!
//! A [`Coins`] value maps an asset identifier (denom) to a non-zero amount.
//! Zero entries are never stored, so two vectors holding the same value
//! always compare and serialize identically.  Serialization follows the
//! ledger's `[{"denom": .., "amount": ".."}]` convention with amounts encoded
//! as decimal strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Atomic token units.
pub type Amount = u128;

/// Errors raised by checked coin arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoinsError {
    #[error("amount overflow in {denom}")]
    /// The sum no longer fits in an [`Amount`].
    Overflow {
        /// Denom whose running total overflowed.
        denom: String,
    },
}

/// One `{denom, amount}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Asset identifier.
    pub denom: String,
    /// Amount in atomic units.
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

impl Coin {
    /// Builds a coin.
    pub fn new(denom: impl Into<String>, amount: Amount) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// Amount vector keyed by denom, ordered by denom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Coin>", try_from = "Vec<Coin>")]
pub struct Coins(BTreeMap<String, Amount>);

impl Coins {
    /// Returns the empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a vector from `(denom, amount)` pairs, summing repeated denoms.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, CoinsError>
    where
        I: IntoIterator<Item = (S, Amount)>,
        S: Into<String>,
    {
        let mut coins = Self::new();
        for (denom, amount) in pairs {
            let denom: String = denom.into();
            coins.try_add_amount(&denom, amount)?;
        }
        Ok(coins)
    }

    /// Amount held in `denom`, zero when absent.
    pub fn amount_of(&self, denom: &str) -> Amount {
        self.0.get(denom).copied().unwrap_or(0)
    }

    /// True when no denom carries a positive amount.
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of denoms with a positive amount.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(denom, amount)` in denom order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Amount)> {
        self.0.iter().map(|(denom, amount)| (denom.as_str(), *amount))
    }

    /// Adds `amount` of `denom` in place.
    ///
    /// On overflow the vector is left unchanged.
    pub fn try_add_amount(&mut self, denom: &str, amount: Amount) -> Result<(), CoinsError> {
        if amount == 0 {
            return Ok(());
        }
        let current = self.amount_of(denom);
        let next = current
            .checked_add(amount)
            .ok_or_else(|| CoinsError::Overflow {
                denom: denom.to_string(),
            })?;
        self.0.insert(denom.to_string(), next);
        Ok(())
    }

    /// Adds every entry of `other` in place.
    ///
    /// All sums are checked before anything is written, so a failed call
    /// leaves `self` untouched.
    pub fn try_add(&mut self, other: &Coins) -> Result<(), CoinsError> {
        let mut staged = Vec::with_capacity(other.len());
        for (denom, amount) in other.iter() {
            let next = self
                .amount_of(denom)
                .checked_add(amount)
                .ok_or_else(|| CoinsError::Overflow {
                    denom: denom.to_string(),
                })?;
            staged.push((denom.to_string(), next));
        }
        self.0.extend(staged);
        Ok(())
    }

    /// Per-denom saturating subtraction; denoms that reach zero are dropped.
    pub fn saturating_sub(&self, other: &Coins) -> Coins {
        let mut out = BTreeMap::new();
        for (denom, amount) in self.iter() {
            let left = amount.saturating_sub(other.amount_of(denom));
            if left > 0 {
                out.insert(denom.to_string(), left);
            }
        }
        Coins(out)
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins
            .0
            .into_iter()
            .map(|(denom, amount)| Coin { denom, amount })
            .collect()
    }
}

impl TryFrom<Vec<Coin>> for Coins {
    type Error = CoinsError;

    fn try_from(list: Vec<Coin>) -> Result<Self, Self::Error> {
        Coins::from_pairs(list.into_iter().map(|coin| (coin.denom, coin.amount)))
    }
}

/// Serde helper encoding an [`Amount`] as a decimal string.
pub(crate) mod amount_string {
    use super::Amount;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Amount>().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coins(pairs: &[(&str, Amount)]) -> Coins {
        Coins::from_pairs(pairs.iter().map(|(d, a)| (*d, *a))).unwrap()
    }

    #[test]
    fn zero_amounts_are_not_stored() {
        let c = coins(&[("uluna", 0), ("ukrw", 5)]);
        assert_eq!(c.len(), 1);
        assert_eq!(c.amount_of("uluna"), 0);
        assert_eq!(c, coins(&[("ukrw", 5)]));
    }

    #[test]
    fn overflow_leaves_vector_untouched() {
        let mut c = coins(&[("uluna", Amount::MAX), ("ukrw", 1)]);
        let before = c.clone();
        let err = c
            .try_add(&coins(&[("ukrw", 1), ("uluna", 1)]))
            .unwrap_err();
        assert_eq!(
            err,
            CoinsError::Overflow {
                denom: "uluna".into()
            }
        );
        assert_eq!(c, before);
    }

    #[test]
    fn saturating_sub_drops_exhausted_denoms() {
        let left = coins(&[("uluna", 10), ("ukrw", 3)]).saturating_sub(&coins(&[("ukrw", 7)]));
        assert_eq!(left, coins(&[("uluna", 10)]));
    }

    #[test]
    fn json_uses_sorted_string_amounts() {
        let c = coins(&[("uusd", 2), ("uluna", 340282366920938463463374607431768211455)]);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(
            json,
            r#"[{"denom":"uluna","amount":"340282366920938463463374607431768211455"},{"denom":"uusd","amount":"2"}]"#
        );
        let back: Coins = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
