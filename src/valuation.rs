//! Share-to-token valuation of staking positions.
//!
//! A delegation is a share claim on a validator pool.  Its token value is
//! `shares * tokens / delegator_shares`, truncated toward zero so that the
//! reported stake never exceeds what the delegator could withdraw.  Only bonded
//! validators carry a rate; claims on any other validator are valued at zero.
//! Pending unbonding balances are already token-denominated and count in full.

use crate::coins::Amount;
use crate::ledger::{Delegation, UnbondingDelegation, Validator};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while valuing one account's staking positions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValuationError {
    #[error("negative shares delegated to {validator}")]
    /// Share amount below zero.
    NegativeShares {
        /// Validator the delegation points at.
        validator: String,
    },
    #[error("delegation value overflow on {validator}")]
    /// `shares * rate` does not fit.
    DelegationOverflow {
        /// Validator the delegation points at.
        validator: String,
    },
    #[error("staked amount overflow")]
    /// Running total does not fit in an [`Amount`].
    TotalOverflow,
}

/// Token-per-share rates of bonded validators.
#[derive(Debug, Clone, Default)]
pub struct ShareRateIndex {
    rates: HashMap<String, Decimal>,
}

impl ShareRateIndex {
    /// Builds the index from every validator the ledger knows about.
    ///
    /// Validators that are not bonded, have no shares outstanding, or whose
    /// pool exceeds the decimal range are left out.
    pub fn build<'a, I>(validators: I) -> Self
    where
        I: IntoIterator<Item = &'a Validator>,
    {
        let mut rates = HashMap::new();
        for validator in validators {
            if !validator.is_bonded() || validator.delegator_shares <= Decimal::ZERO {
                continue;
            }
            let Some(tokens) = Decimal::from_u128(validator.tokens) else {
                log::warn!(
                    "QSYS|mod=VALUATION|evt=RATE_SKIPPED|validator={}|reason=tokens_out_of_range",
                    validator.operator
                );
                continue;
            };
            if let Some(rate) = tokens.checked_div(validator.delegator_shares) {
                rates.insert(validator.operator.clone(), rate);
            }
        }
        Self { rates }
    }

    /// Rate for `validator`, `None` if it is not bonded.
    pub fn rate(&self, validator: &str) -> Option<Decimal> {
        self.rates.get(validator).copied()
    }

    /// Number of bonded validators indexed.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// True if no validator is bonded.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Token value of `shares` at `rate`, truncated toward zero.
pub fn shares_to_tokens(
    shares: Decimal,
    rate: Decimal,
    validator: &str,
) -> Result<Amount, ValuationError> {
    if shares.is_sign_negative() && !shares.is_zero() {
        return Err(ValuationError::NegativeShares {
            validator: validator.to_string(),
        });
    }
    shares
        .checked_mul(rate)
        .and_then(|value| value.trunc().to_u128())
        .ok_or_else(|| ValuationError::DelegationOverflow {
            validator: validator.to_string(),
        })
}

/// Staked value of one account, split by origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StakeBreakdown {
    /// Value of active delegations to bonded validators.
    pub bonded: Amount,
    /// Pending unbonding balances.
    pub unbonding: Amount,
}

impl StakeBreakdown {
    /// Bonded plus unbonding.
    pub fn total(&self) -> Result<Amount, ValuationError> {
        self.bonded
            .checked_add(self.unbonding)
            .ok_or(ValuationError::TotalOverflow)
    }
}

/// Values the staking positions of `delegator`.
///
/// Records owned by other delegators are ignored, so callers may pass a
/// ledger-wide list.
pub fn compute_effective_stake(
    delegator: &str,
    delegations: &[Delegation],
    unbonding_delegations: &[UnbondingDelegation],
    index: &ShareRateIndex,
) -> Result<StakeBreakdown, ValuationError> {
    let mut stake = StakeBreakdown::default();

    for delegation in delegations.iter().filter(|d| d.delegator == delegator) {
        let Some(rate) = index.rate(&delegation.validator) else {
            continue;
        };
        let tokens = shares_to_tokens(delegation.shares, rate, &delegation.validator)?;
        stake.bonded = stake
            .bonded
            .checked_add(tokens)
            .ok_or(ValuationError::TotalOverflow)?;
    }

    for unbonding in unbonding_delegations
        .iter()
        .filter(|u| u.delegator == delegator)
    {
        for entry in &unbonding.entries {
            stake.unbonding = stake
                .unbonding
                .checked_add(entry.balance)
                .ok_or(ValuationError::TotalOverflow)?;
        }
    }

    Ok(stake)
}
