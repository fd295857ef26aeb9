//! Snapshot engine.
//!
//! [`scan_ledger`] walks the ledger once, in storage order, and produces an
//! immutable [`SnapshotScan`].  [`Tracker`] wraps the scan with the epoch
//! trigger and the background export fan-out: one task for the vesting supply
//! and one per tracked asset leaderboard, all reading the same `Arc`-shared
//! scan.  Task handles stay with the tracker until they are drained or
//! explicitly abandoned.

use crate::coins::{Amount, Coins, CoinsError};
use crate::config::TrackingConfig;
use crate::export::{ArtifactKind, ExportError, ExportRecord, SnapshotExporter};
use crate::leaderboard::{select_top_k, select_top_k_by, AdmittedAccount, LeaderboardEntry};
use crate::ledger::{Account, Address, LedgerView};
use crate::valuation::{compute_effective_stake, ShareRateIndex, StakeBreakdown, ValuationError};
use crate::vesting::{sum_locked, Timestamp, VestingSchedule};
use rayon::prelude::*;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Why an account was left out of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("valuation failed: {0}")]
    /// Staking positions could not be valued.
    Valuation(#[from] ValuationError),
    #[error("balance merge failed: {0}")]
    /// Staked value could not be added to the spendable balance.
    Merge(#[from] CoinsError),
}

/// Account whose processing halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAccount {
    /// Account address.
    pub address: Address,
    /// Failure that halted it.
    pub error: AccountError,
}

/// Bonded stake of one delegator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatorStake {
    /// Delegator address.
    pub address: Address,
    /// Value of active delegations.
    pub bonded: Amount,
}

/// Immutable output of one ledger scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotScan {
    /// Observed block height.
    pub height: u64,
    /// Observed block time.
    pub block_time: Timestamp,
    /// Staking denom.
    pub bond_denom: String,
    /// Ranked assets: whitelist then bond denom, without duplicates.
    pub assets: Vec<String>,
    /// Accounts over the minimum, in ledger iteration order.
    pub admitted: Vec<AdmittedAccount>,
    /// Every vesting schedule seen, admitted or not.
    pub vesting: Vec<VestingSchedule>,
    /// Delegators with a positive bonded stake, in ledger iteration order.
    pub delegators: Vec<DelegatorStake>,
    /// Accounts whose processing failed.
    pub skipped: Vec<SkippedAccount>,
}

/// Whitelist followed by the bond denom, first occurrence kept.
pub fn tracked_assets(whitelist: Vec<String>, bond_denom: &str) -> Vec<String> {
    let mut assets: Vec<String> = Vec::with_capacity(whitelist.len() + 1);
    for asset in whitelist.into_iter().chain(std::iter::once(bond_denom.to_string())) {
        if !assets.contains(&asset) {
            assets.push(asset);
        }
    }
    assets
}

/// Spendable balance plus staked value, checked.
pub fn effective_holdings(
    account: &Account,
    bond_denom: &str,
    stake: &StakeBreakdown,
) -> Result<Coins, AccountError> {
    let mut holdings = account.balance.clone();
    holdings.try_add_amount(bond_denom, stake.total()?)?;
    Ok(holdings)
}

/// Walks `ledger` once and values every account.
///
/// A failing account is logged and recorded in [`SnapshotScan::skipped`]; the
/// scan carries on with the next one.
pub fn scan_ledger(ledger: &dyn LedgerView, config: &TrackingConfig) -> SnapshotScan {
    let bond_denom = ledger.bond_denom();
    let assets = tracked_assets(ledger.asset_whitelist(), &bond_denom);
    let minimums = config.minimums_for(&assets);
    let validators = ledger.validators();
    let index = ShareRateIndex::build(&validators);

    let mut scan = SnapshotScan {
        height: ledger.block_height(),
        block_time: ledger.block_time(),
        bond_denom,
        assets,
        ..SnapshotScan::default()
    };

    ledger.iterate_accounts(&mut |account| {
        if let Some(schedule) = &account.vesting {
            scan.vesting.push(schedule.clone());
        }

        let delegations = ledger.delegations_of(&account.address);
        let unbondings =
            ledger.unbonding_delegations_of(&account.address, config.max_unbonding_entries);
        let valued = compute_effective_stake(&account.address, &delegations, &unbondings, &index)
            .map_err(AccountError::from)
            .and_then(|stake| {
                effective_holdings(account, &scan.bond_denom, &stake).map(|h| (stake, h))
            });

        match valued {
            Ok((stake, holdings)) => {
                if stake.bonded > 0 {
                    scan.delegators.push(DelegatorStake {
                        address: account.address.clone(),
                        bonded: stake.bonded,
                    });
                }
                if minimums.admits(&holdings) {
                    scan.admitted.push(AdmittedAccount {
                        address: account.address.clone(),
                        holdings,
                    });
                }
            }
            Err(error) => {
                log::error!(
                    "QSYS|mod=TRACK|evt=ACCOUNT_SKIPPED|height={}|address={}|err={error}",
                    scan.height,
                    account.address
                );
                scan.skipped.push(SkippedAccount {
                    address: account.address.clone(),
                    error,
                });
            }
        }
        ControlFlow::Continue(())
    });

    log::info!(
        "QSYS|mod=TRACK|evt=SCANNED|height={}|bonded_validators={}|admitted={}|vesting={}|skipped={}",
        scan.height,
        index.len(),
        scan.admitted.len(),
        scan.vesting.len(),
        scan.skipped.len()
    );
    scan
}

/// Locked supply across every vesting schedule of the scan.
pub fn vesting_supply(scan: &SnapshotScan) -> Result<Coins, CoinsError> {
    sum_locked(&scan.vesting, scan.block_time)
}

/// Top delegators by bonded stake.
pub fn delegator_leaderboard(scan: &SnapshotScan, k: usize) -> Vec<LeaderboardEntry> {
    select_top_k_by(&scan.delegators, k, |d| d.address.as_str(), |d| d.bonded)
}

/// Every result of one snapshot, computed in-process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotResults {
    /// Locked vesting supply.
    pub vesting: Coins,
    /// One leaderboard per tracked asset, in asset order.
    pub leaderboards: Vec<(String, Vec<LeaderboardEntry>)>,
    /// Delegator leaderboard when configured.
    pub delegators: Option<Vec<LeaderboardEntry>>,
}

/// Computes every result of `scan` without exporting.
///
/// Leaderboards fan out over the rayon pool; the output order follows
/// `scan.assets` regardless.
pub fn compute_results(
    scan: &SnapshotScan,
    config: &TrackingConfig,
) -> Result<SnapshotResults, CoinsError> {
    let k = config.leaderboard_size;
    let leaderboards = scan
        .assets
        .par_iter()
        .map(|asset| (asset.clone(), select_top_k(&scan.admitted, asset, k)))
        .collect();
    Ok(SnapshotResults {
        vesting: vesting_supply(scan)?,
        leaderboards,
        delegators: config
            .delegator_leaderboard_size
            .map(|k| delegator_leaderboard(scan, k)),
    })
}

/// Errors raised by the tracker itself.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("no tokio runtime available: {0}")]
    /// The tracker was created outside a tokio runtime.
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Result of one background export.
#[derive(Debug)]
pub struct ExportOutcome {
    /// Block height of the snapshot.
    pub height: u64,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// What happened.
    pub result: Result<ExportRecord, ExportError>,
}

struct PendingExport {
    height: u64,
    kind: ArtifactKind,
    handle: JoinHandle<Result<ExportRecord, ExportError>>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Epoch-triggered snapshot tracker.
pub struct Tracker {
    config: TrackingConfig,
    exporter: Arc<SnapshotExporter>,
    runtime: Handle,
    pending: Vec<PendingExport>,
}

impl Tracker {
    /// Tracker exporting to `config.output_dir` on the current tokio runtime.
    pub fn new(config: TrackingConfig) -> Result<Self, TrackingError> {
        let exporter = SnapshotExporter::to_dir(config.output_dir.clone());
        Ok(Self::with_exporter(config, exporter, Handle::try_current()?))
    }

    /// Tracker with an explicit exporter and runtime.
    pub fn with_exporter(
        config: TrackingConfig,
        exporter: SnapshotExporter,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            exporter: Arc::new(exporter),
            runtime,
            pending: Vec::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Block hook: snapshots `ledger` when its height closes an epoch.
    ///
    /// Returns the number of export tasks started.
    pub fn on_block(&mut self, ledger: &dyn LedgerView) -> usize {
        if self.config.is_epoch_boundary(ledger.block_height()) {
            self.track(ledger)
        } else {
            0
        }
    }

    /// Scans `ledger` now and starts the export tasks without waiting for them.
    ///
    /// Returns the number of export tasks started.
    pub fn track(&mut self, ledger: &dyn LedgerView) -> usize {
        self.reap_finished();
        let scan = Arc::new(scan_ledger(ledger, &self.config));
        let generated_at_ms = now_millis();
        let height = scan.height;
        let before = self.pending.len();

        {
            let scan = Arc::clone(&scan);
            self.spawn(height, ArtifactKind::VestingSupply, move |exporter| {
                let supply = vesting_supply(&scan).map_err(|err| {
                    log::error!("QSYS|mod=TRACK|evt=VESTING_FAILED|height={height}|err={err}");
                    ExportError::Compute {
                        artifact: ArtifactKind::VestingSupply.label(),
                        reason: err.to_string(),
                    }
                })?;
                exporter.export(ArtifactKind::VestingSupply, height, generated_at_ms, &supply)
            });
        }

        let k = self.config.leaderboard_size;
        for asset in scan.assets.clone() {
            let scan = Arc::clone(&scan);
            let kind = ArtifactKind::Leaderboard {
                asset: asset.clone(),
            };
            self.spawn(height, kind.clone(), move |exporter| {
                let board = select_top_k(&scan.admitted, &asset, k);
                exporter.export(kind, height, generated_at_ms, &board)
            });
        }

        if let Some(k) = self.config.delegator_leaderboard_size {
            let scan = Arc::clone(&scan);
            self.spawn(height, ArtifactKind::DelegatorLeaderboard, move |exporter| {
                let board = delegator_leaderboard(&scan, k);
                exporter.export(ArtifactKind::DelegatorLeaderboard, height, generated_at_ms, &board)
            });
        }

        let started = self.pending.len() - before;
        log::info!("QSYS|mod=TRACK|evt=EXPORTS_STARTED|height={height}|tasks={started}");
        started
    }

    fn spawn<F>(&mut self, height: u64, kind: ArtifactKind, job: F)
    where
        F: FnOnce(&SnapshotExporter) -> Result<ExportRecord, ExportError> + Send + 'static,
    {
        let exporter = Arc::clone(&self.exporter);
        let handle = self.runtime.spawn_blocking(move || job(&exporter));
        self.pending.push(PendingExport {
            height,
            kind,
            handle,
        });
    }

    fn reap_finished(&mut self) {
        self.pending.retain(|task| !task.handle.is_finished());
    }

    /// Export tasks started and not yet collected.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Waits for every started export and returns the outcomes in start order.
    pub async fn drain(&mut self) -> Vec<ExportOutcome> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        for task in self.pending.drain(..) {
            let result = match task.handle.await {
                Ok(result) => result,
                Err(err) => {
                    log::error!(
                        "QSYS|mod=TRACK|evt=TASK_FAILED|height={}|artifact={}|err={err}",
                        task.height,
                        task.kind.label()
                    );
                    Err(ExportError::Task {
                        artifact: task.kind.label(),
                        reason: err.to_string(),
                    })
                }
            };
            outcomes.push(ExportOutcome {
                height: task.height,
                kind: task.kind,
                result,
            });
        }
        outcomes
    }

    /// Stops tracking the started exports; they keep running detached.
    ///
    /// Returns how many were still running.
    pub fn abandon(mut self) -> usize {
        self.reap_finished();
        let running = self.pending.len();
        if running > 0 {
            log::warn!("QSYS|mod=TRACK|evt=EXPORTS_ABANDONED|tasks={running}");
        }
        self.pending.clear();
        running
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.reap_finished();
        if !self.pending.is_empty() {
            log::warn!(
                "QSYS|mod=TRACK|evt=DROPPED_WITH_PENDING|tasks={}",
                self.pending.len()
            );
        }
    }
}
