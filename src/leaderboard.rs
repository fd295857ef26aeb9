//! Top-K extraction.
//!
//! Repeated-maximum selection: each of the `k` rounds scans every remaining
//! candidate once and takes the largest amount.  Candidates live in a working
//! array of input positions; the winner is removed by swapping in the last
//! position and shrinking, which scrambles the array.  Ties are broken on the
//! input position itself, so the first candidate in input order wins no matter
//! how the working array was reshuffled.  Cost is `O(k * n)`, fine for boards of
//! a few thousand entries.

use crate::coins::{amount_string, Amount, Coins};
use serde::{Deserialize, Serialize};

/// One row of a leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Account address.
    pub address: String,
    /// Amount ranked on.
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

/// Account that passed the minimum-holding filter, with its effective holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmittedAccount {
    /// Account address.
    pub address: String,
    /// Spendable plus staked plus unbonding holdings.
    pub holdings: Coins,
}

/// Selects up to `k` entries by descending `amount`, ties resolved in input order.
pub fn select_top_k_by<T, A, F>(
    candidates: &[T],
    k: usize,
    address: A,
    amount: F,
) -> Vec<LeaderboardEntry>
where
    A: Fn(&T) -> &str,
    F: Fn(&T) -> Amount,
{
    let rounds = k.min(candidates.len());
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut board = Vec::with_capacity(rounds);

    for _ in 0..rounds {
        let mut best_slot = 0;
        let mut best_pos = remaining[0];
        let mut best_amount = amount(&candidates[best_pos]);
        for (slot, &pos) in remaining.iter().enumerate().skip(1) {
            let value = amount(&candidates[pos]);
            if value > best_amount || (value == best_amount && pos < best_pos) {
                best_slot = slot;
                best_pos = pos;
                best_amount = value;
            }
        }
        board.push(LeaderboardEntry {
            address: address(&candidates[best_pos]).to_string(),
            amount: best_amount,
        });
        remaining.swap_remove(best_slot);
    }

    board
}

/// Top `k` admitted accounts by their holdings of `asset`.
pub fn select_top_k(admitted: &[AdmittedAccount], asset: &str, k: usize) -> Vec<LeaderboardEntry> {
    select_top_k_by(
        admitted,
        k,
        |acct| acct.address.as_str(),
        |acct| acct.holdings.amount_of(asset),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn admitted(address: &str, amount: Amount) -> AdmittedAccount {
        AdmittedAccount {
            address: address.into(),
            holdings: Coins::from_pairs([("uluna", amount)]).unwrap(),
        }
    }

    fn entry(address: &str, amount: Amount) -> LeaderboardEntry {
        LeaderboardEntry {
            address: address.into(),
            amount,
        }
    }

    #[test]
    fn ties_go_to_the_first_candidate_in_input_order() {
        let accounts = vec![admitted("A", 100), admitted("B", 100), admitted("C", 130)];
        assert_eq!(
            select_top_k(&accounts, "uluna", 2),
            vec![entry("C", 130), entry("A", 100)]
        );

        let reordered = vec![admitted("B", 100), admitted("A", 100), admitted("C", 130)];
        assert_eq!(
            select_top_k(&reordered, "uluna", 2),
            vec![entry("C", 130), entry("B", 100)]
        );
    }

    #[test]
    fn ties_survive_swap_removal() {
        // Taking "top" swaps "d" to the front; "b" must still win the tie.
        let accounts = vec![
            admitted("top", 9),
            admitted("b", 1),
            admitted("c", 1),
            admitted("d", 1),
        ];
        let board = select_top_k(&accounts, "uluna", 4);
        let order: Vec<_> = board.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(order, vec!["top", "b", "c", "d"]);
    }

    #[test]
    fn short_candidate_lists_are_returned_whole() {
        let accounts: Vec<_> = [5, 1, 4, 2, 3]
            .iter()
            .enumerate()
            .map(|(i, amt)| admitted(&format!("acct{i}"), *amt))
            .collect();
        let board = select_top_k(&accounts, "uluna", 1000);
        assert_eq!(board.len(), 5);
        let amounts: Vec<_> = board.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn empty_inputs_and_zero_k() {
        assert!(select_top_k(&[], "uluna", 10).is_empty());
        assert!(select_top_k(&[admitted("a", 1)], "uluna", 0).is_empty());
    }

    #[test]
    fn accounts_without_the_asset_rank_at_zero() {
        let accounts = vec![
            AdmittedAccount {
                address: "krw-only".into(),
                holdings: Coins::from_pairs([("ukrw", 50)]).unwrap(),
            },
            admitted("luna", 1),
        ];
        assert_eq!(
            select_top_k(&accounts, "uluna", 2),
            vec![entry("luna", 1), entry("krw-only", 0)]
        );
    }

    proptest! {
        #[test]
        fn board_matches_a_stable_descending_sort(
            amounts in prop::collection::vec(0u128..50, 0..60),
            k in 0usize..80,
        ) {
            let accounts: Vec<_> = amounts
                .iter()
                .enumerate()
                .map(|(i, amt)| admitted(&format!("acct{i}"), *amt))
                .collect();
            let board = select_top_k(&accounts, "uluna", k);

            prop_assert_eq!(board.len(), k.min(accounts.len()));
            for pair in board.windows(2) {
                prop_assert!(pair[0].amount >= pair[1].amount);
            }
            if let Some(floor) = board.last().map(|e| e.amount) {
                for acct in &accounts {
                    if !board.iter().any(|e| e.address == acct.address) {
                        prop_assert!(acct.holdings.amount_of("uluna") <= floor);
                    }
                }
            }

            let mut expected = accounts.clone();
            expected.sort_by_key(|a| std::cmp::Reverse(a.holdings.amount_of("uluna")));
            let expected: Vec<_> = expected
                .into_iter()
                .take(k)
                .map(|a| entry(&a.address, a.holdings.amount_of("uluna")))
                .collect();
            prop_assert_eq!(board, expected);
        }
    }
}
