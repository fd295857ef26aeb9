//! Read-only ledger view consumed by the tracker.
//!
//! The tracker never owns chain state.  Hosts implement [`LedgerView`] over
//! their own account and staking stores; [`MemoryLedger`] is a plain in-memory
//! implementation that can also be loaded from a JSON snapshot file.

use crate::coins::{Amount, Coins};
use crate::vesting::{Timestamp, VestingSchedule};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading or writing a ledger snapshot file.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger snapshot io error: {0}")]
    /// File could not be read or written.
    Io(#[from] std::io::Error),
    #[error("ledger snapshot parse error: {0}")]
    /// File is not a valid snapshot, or the snapshot could not be encoded.
    Parse(#[from] serde_json::Error),
}

/// Opaque account address.
pub type Address = String;

/// Account as stored by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account address.
    pub address: Address,
    /// Spendable balance.
    #[serde(default)]
    pub balance: Coins,
    /// Vesting schedule attached to the account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting: Option<VestingSchedule>,
}

impl Account {
    /// Account without a vesting schedule.
    pub fn new(address: impl Into<Address>, balance: Coins) -> Self {
        Self {
            address: address.into(),
            balance,
            vesting: None,
        }
    }

    /// Attaches a vesting schedule.
    pub fn with_vesting(mut self, schedule: VestingSchedule) -> Self {
        self.vesting = Some(schedule);
        self
    }
}

/// Validator participation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStatus {
    /// Active in consensus.
    Bonded,
    /// Leaving the active set.
    Unbonding,
    /// Not in the active set.
    Unbonded,
}

/// Validator with its bonded pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Operator identity.
    pub operator: String,
    /// Tokens held in the validator's pool.
    #[serde(with = "crate::coins::amount_string")]
    pub tokens: Amount,
    /// Total shares issued to delegators.
    pub delegator_shares: Decimal,
    /// Participation status.
    pub status: BondStatus,
}

impl Validator {
    /// True if the validator is in the active set.
    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }
}

/// Share claim of a delegator on a validator pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Delegator address.
    pub delegator: Address,
    /// Validator operator identity.
    pub validator: String,
    /// Shares held.
    pub shares: Decimal,
}

/// One pending withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    /// Height at which the unbonding started.
    pub creation_height: u64,
    /// Maturity time.
    pub completion_time: Timestamp,
    /// Tokens initially scheduled for release.
    #[serde(with = "crate::coins::amount_string")]
    pub initial_balance: Amount,
    /// Tokens still to be released, denominated in the bond denom.
    #[serde(with = "crate::coins::amount_string")]
    pub balance: Amount,
}

/// All pending withdrawals of one delegator from one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    /// Delegator address.
    pub delegator: Address,
    /// Validator operator identity.
    pub validator: String,
    /// Pending entries.
    pub entries: Vec<UnbondingEntry>,
}

/// Point-in-time view of the ledger.
///
/// Implementations must present one consistent block: the tracker reads
/// every method during a single scan and assumes nothing changes in between.
pub trait LedgerView {
    /// Height of the observed block.
    fn block_height(&self) -> u64;

    /// Time of the observed block.
    fn block_time(&self) -> Timestamp;

    /// Denom of the staking asset.
    fn bond_denom(&self) -> String;

    /// Whitelisted assets the tracker should rank.
    fn asset_whitelist(&self) -> Vec<String>;

    /// Visits accounts in storage order until `visit` breaks.
    fn iterate_accounts(&self, visit: &mut dyn FnMut(&Account) -> ControlFlow<()>);

    /// Every validator regardless of status.
    fn validators(&self) -> Vec<Validator>;

    /// Delegations held by `delegator`.
    fn delegations_of(&self, delegator: &str) -> Vec<Delegation>;

    /// Unbonding delegations of `delegator`, at most `max_entries` of them.
    fn unbonding_delegations_of(
        &self,
        delegator: &str,
        max_entries: usize,
    ) -> Vec<UnbondingDelegation>;
}

/// In-memory ledger snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLedger {
    /// Block height.
    pub height: u64,
    /// Block time.
    pub time: Timestamp,
    /// Staking denom.
    pub bond_denom: String,
    /// Whitelisted assets.
    pub whitelist: Vec<String>,
    /// Accounts in storage order.
    pub accounts: Vec<Account>,
    /// Validators.
    pub validators: Vec<Validator>,
    /// Delegations.
    pub delegations: Vec<Delegation>,
    /// Unbonding delegations.
    pub unbonding_delegations: Vec<UnbondingDelegation>,
}

impl MemoryLedger {
    /// Empty ledger at `height`/`time` staking `bond_denom`.
    pub fn new(height: u64, time: Timestamp, bond_denom: impl Into<String>) -> Self {
        Self {
            height,
            time,
            bond_denom: bond_denom.into(),
            ..Self::default()
        }
    }

    /// Reads a snapshot written by [`MemoryLedger::save`].
    ///
    /// A missing file is an empty ledger at height zero.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the snapshot as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Adds a whitelisted asset.
    pub fn whitelist_asset(&mut self, denom: impl Into<String>) -> &mut Self {
        self.whitelist.push(denom.into());
        self
    }

    /// Appends an account.
    pub fn push_account(&mut self, account: Account) -> &mut Self {
        self.accounts.push(account);
        self
    }

    /// Appends a validator.
    pub fn push_validator(
        &mut self,
        operator: impl Into<String>,
        tokens: Amount,
        delegator_shares: Decimal,
        status: BondStatus,
    ) -> &mut Self {
        self.validators.push(Validator {
            operator: operator.into(),
            tokens,
            delegator_shares,
            status,
        });
        self
    }

    /// Appends a delegation.
    pub fn delegate(
        &mut self,
        delegator: impl Into<Address>,
        validator: impl Into<String>,
        shares: Decimal,
    ) -> &mut Self {
        self.delegations.push(Delegation {
            delegator: delegator.into(),
            validator: validator.into(),
            shares,
        });
        self
    }

    /// Appends a single-entry unbonding delegation.
    pub fn unbond(
        &mut self,
        delegator: impl Into<Address>,
        validator: impl Into<String>,
        balance: Amount,
        completion_time: Timestamp,
    ) -> &mut Self {
        let height = self.height;
        self.unbonding_delegations.push(UnbondingDelegation {
            delegator: delegator.into(),
            validator: validator.into(),
            entries: vec![UnbondingEntry {
                creation_height: height,
                completion_time,
                initial_balance: balance,
                balance,
            }],
        });
        self
    }
}

impl LedgerView for MemoryLedger {
    fn block_height(&self) -> u64 {
        self.height
    }

    fn block_time(&self) -> Timestamp {
        self.time
    }

    fn bond_denom(&self) -> String {
        self.bond_denom.clone()
    }

    fn asset_whitelist(&self) -> Vec<String> {
        self.whitelist.clone()
    }

    fn iterate_accounts(&self, visit: &mut dyn FnMut(&Account) -> ControlFlow<()>) {
        for account in &self.accounts {
            if visit(account).is_break() {
                break;
            }
        }
    }

    fn validators(&self) -> Vec<Validator> {
        self.validators.clone()
    }

    fn delegations_of(&self, delegator: &str) -> Vec<Delegation> {
        self.delegations
            .iter()
            .filter(|d| d.delegator == delegator)
            .cloned()
            .collect()
    }

    fn unbonding_delegations_of(
        &self,
        delegator: &str,
        max_entries: usize,
    ) -> Vec<UnbondingDelegation> {
        self.unbonding_delegations
            .iter()
            .filter(|u| u.delegator == delegator)
            .take(max_entries)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::temp_path;
    use rust_decimal_macros::dec;

    #[test]
    fn iteration_stops_on_break() {
        let mut ledger = MemoryLedger::new(1, 0, "uluna");
        for name in ["a", "b", "c"] {
            ledger.push_account(Account::new(name, Coins::new()));
        }
        let mut seen = Vec::new();
        ledger.iterate_accounts(&mut |acct| {
            seen.push(acct.address.clone());
            if acct.address == "b" {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn unbonding_query_is_capped() {
        let mut ledger = MemoryLedger::new(1, 0, "uluna");
        for i in 0..5 {
            ledger.unbond("a", format!("val{i}"), 10, 100);
        }
        ledger.unbond("b", "val0", 10, 100);
        assert_eq!(ledger.unbonding_delegations_of("a", 3).len(), 3);
        assert_eq!(ledger.unbonding_delegations_of("b", 3).len(), 1);
    }

    #[test]
    fn missing_file_loads_empty_and_save_roundtrips() {
        let path = temp_path("ledger.json");
        assert_eq!(MemoryLedger::load(&path).unwrap(), MemoryLedger::default());

        let mut ledger = MemoryLedger::new(7, 1_700_000_000, "uluna");
        ledger
            .whitelist_asset("ukrw")
            .push_validator("val", 200, dec!(100), BondStatus::Bonded)
            .delegate("a", "val", dec!(12.5))
            .push_account(Account::new(
                "a",
                Coins::from_pairs([("ukrw", 3)]).unwrap(),
            ));
        ledger.save(&path).unwrap();
        let loaded = MemoryLedger::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, ledger);
    }

    #[test]
    fn malformed_snapshot_is_a_parse_error() {
        let path = temp_path("ledger_bad.json");
        std::fs::write(&path, b"{\"height\": \"tall\"}").unwrap();
        let err = MemoryLedger::load(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, LedgerError::Parse(_)));
    }
}
