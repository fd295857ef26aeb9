//! Vesting schedules and the locked-supply accumulator.
//!
//! Time model: seconds since the Unix epoch (`i64`), always the block time of
//! the snapshot being evaluated, never the wall clock.

use crate::coins::{Amount, Coins, CoinsError};
use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// One unlock step of a periodic schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingPeriod {
    /// Period length in seconds.
    pub length: i64,
    /// Coins released when the period ends.
    pub amount: Coins,
}

/// Rule deciding which part of an account's original allocation is still locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VestingSchedule {
    /// Linear unlock between `start_time` and `end_time`.
    Continuous {
        /// Allocation subject to vesting.
        original: Coins,
        /// Unlocking begins after this instant.
        start_time: Timestamp,
        /// Everything is unlocked from this instant on.
        end_time: Timestamp,
    },
    /// Fully locked until `end_time`.
    Delayed {
        /// Allocation subject to vesting.
        original: Coins,
        /// Everything is unlocked from this instant on.
        end_time: Timestamp,
    },
    /// Consecutive periods, each releasing its own amount when it ends.
    Periodic {
        /// Allocation subject to vesting.
        original: Coins,
        /// Start of the first period.
        start_time: Timestamp,
        /// Unlock steps in chronological order.
        periods: Vec<VestingPeriod>,
    },
}

impl VestingSchedule {
    /// Allocation the schedule started from.
    pub fn original(&self) -> &Coins {
        match self {
            Self::Continuous { original, .. }
            | Self::Delayed { original, .. }
            | Self::Periodic { original, .. } => original,
        }
    }

    /// Coins already unlocked at `now`.
    ///
    /// Fails only when a periodic schedule releases more than `Amount` can hold.
    pub fn vested_at(&self, now: Timestamp) -> Result<Coins, CoinsError> {
        match self {
            Self::Continuous {
                original,
                start_time,
                end_time,
            } => {
                if now <= *start_time {
                    return Ok(Coins::new());
                }
                if now >= *end_time {
                    return Ok(original.clone());
                }
                // start < now < end, both spans are positive.
                let elapsed = span(*start_time, now);
                let duration = span(*start_time, *end_time);
                Coins::from_pairs(
                    original
                        .iter()
                        .map(|(denom, amount)| (denom, pro_rata(amount, elapsed, duration))),
                )
            }
            Self::Delayed { original, end_time } => {
                if now >= *end_time {
                    Ok(original.clone())
                } else {
                    Ok(Coins::new())
                }
            }
            Self::Periodic {
                original,
                start_time,
                periods,
            } => {
                let mut vested = Coins::new();
                let mut cursor = *start_time;
                for period in periods {
                    cursor = cursor.saturating_add(period.length);
                    if cursor > now {
                        break;
                    }
                    vested.try_add(&period.amount)?;
                }
                // Periods may not release more than was allocated.
                Ok(original.saturating_sub(&original.saturating_sub(&vested)))
            }
        }
    }

    /// Coins still locked at `now`.
    pub fn locked_at(&self, now: Timestamp) -> Result<Coins, CoinsError> {
        Ok(self.original().saturating_sub(&self.vested_at(now)?))
    }
}

/// Seconds from `from` to `to`, computed wide so no `i64` pair overflows.
fn span(from: Timestamp, to: Timestamp) -> u128 {
    (i128::from(to) - i128::from(from)).unsigned_abs()
}

/// `floor(amount * elapsed / duration)` without widening past `u128`.
fn pro_rata(amount: Amount, elapsed: u128, duration: u128) -> Amount {
    let whole = (amount / duration).saturating_mul(elapsed);
    let part = (amount % duration).saturating_mul(elapsed) / duration;
    whole.saturating_add(part)
}

/// Sums the coins still locked across `schedules` at `now`.
///
/// Accounts without a schedule are simply not part of the input.
pub fn sum_locked<'a, I>(schedules: I, now: Timestamp) -> Result<Coins, CoinsError>
where
    I: IntoIterator<Item = &'a VestingSchedule>,
{
    let mut total = Coins::new();
    for schedule in schedules {
        total.try_add(&schedule.locked_at(now)?)?;
    }
    Ok(total)
}
