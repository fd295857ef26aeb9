#![deny(missing_docs)]

//! # power_tracker
//!
//! **power_tracker** takes epoch snapshots of a proof-of-stake ledger and
//! exports them as auxiliary analytics artifacts:
//!
//! * the locked supply held by vesting accounts;
//! * one top-K leaderboard per tracked asset, ranked on *effective holdings*
//!   (spendable balance plus delegations valued at the validator share rate
//!   plus pending unbonding balances);
//! * optionally, a leaderboard of delegators by bonded stake.
//!
//! The crate never mutates ledger state.  Hosts expose their stores through the
//! [`LedgerView`](ledger/trait.LedgerView.html) trait and call
//! [`Tracker::on_block`](engine/struct.Tracker.html#method.on_block) from their
//! block hook; exports then run on the tokio blocking pool while block
//! processing continues.
//!
//! ## Modules
//!
//! * [`coins`](coins/index.html): multi-asset amount vectors with checked
//!   arithmetic.
//! * [`valuation`](valuation/index.html): share-rate index and per-account
//!   staking valuation.
//! * [`threshold`](threshold/index.html): minimum-holding admission.
//! * [`leaderboard`](leaderboard/index.html): top-K extraction with a
//!   deterministic first-in-input-order tie-break.
//! * [`vesting`](vesting/index.html): vesting schedules and locked-supply sums.
//! * [`export`](export/index.html): per-artifact serialization and persistence.
//! * [`engine`](engine/index.html): the scan and the background tracker.
//!
//! ## Usage
//!
//! ```rust
//! use power_tracker::{
//!     compute_results, scan_ledger, Account, BondStatus, Coins, MemoryLedger, TrackingConfig,
//! };
//! use rust_decimal::Decimal;
//!
//! let mut ledger = MemoryLedger::new(100_800, 1_700_000_000, "uluna");
//! ledger
//!     .push_validator("val", 200, Decimal::from(100), BondStatus::Bonded)
//!     .push_account(Account::new("alice", Coins::from_pairs([("uluna", 100)]).unwrap()))
//!     .push_account(Account::new("bob", Coins::new()))
//!     .delegate("bob", "val", Decimal::from(60));
//!
//! let config = TrackingConfig {
//!     min_holding: 1,
//!     ..TrackingConfig::default()
//! };
//! let scan = scan_ledger(&ledger, &config);
//! let results = compute_results(&scan, &config).unwrap();
//! let (asset, board) = &results.leaderboards[0];
//! assert_eq!(asset, "uluna");
//! assert_eq!(board[0].address, "bob");
//! assert_eq!(board[0].amount, 120);
//! ```

pub mod coins;
pub mod config;
pub mod engine;
pub mod export;
pub mod leaderboard;
pub mod ledger;
pub mod threshold;
pub mod valuation;
pub mod vesting;

#[cfg(test)]
mod test_util;

pub use coins::{Amount, Coin, Coins, CoinsError};
pub use config::{ConfigError, TrackingConfig};
pub use engine::{
    compute_results, delegator_leaderboard, scan_ledger, tracked_assets, vesting_supply,
    AccountError, DelegatorStake, ExportOutcome, SkippedAccount, SnapshotResults, SnapshotScan,
    Tracker, TrackingError,
};
pub use export::{
    ArtifactKind, ArtifactSink, ExportError, ExportRecord, FileSink, SnapshotExporter,
};
pub use leaderboard::{select_top_k, select_top_k_by, AdmittedAccount, LeaderboardEntry};
pub use ledger::{
    Account, Address, BondStatus, Delegation, LedgerError, LedgerView, MemoryLedger,
    UnbondingDelegation, UnbondingEntry, Validator,
};
pub use threshold::{admit, MinimumHoldings};
pub use valuation::{compute_effective_stake, ShareRateIndex, StakeBreakdown, ValuationError};
pub use vesting::{sum_locked, Timestamp, VestingPeriod, VestingSchedule};
