//! # Ballot tally
//!
//! Turns one pair's ballots into a rate:
//!
//! 1. sort by `(rate, voter)`
//! 2. weighted median: first rate whose cumulative power reaches `⌈T/2⌉`
//! 3. `σ = sqrt(Σ p·(r − m)² / T)`
//! 4. `spread = max(σ, m · reward_band / 2)`
//! 5. abstaining or in-spread ballots win: `reward_weight += power`, `win_count += 1`

use crate::error::{OracleError, Result};
use crate::types::{ExchangeRateBallot, ValidatorPerformances};
use tessera_core::{AssetPair, Dec};

/// Sum of ballot power
pub fn total_power(ballots: &[ExchangeRateBallot]) -> i64 {
    ballots.iter().map(|b| b.power).sum()
}

/// Ballots with a positive rate
pub fn num_valid_voters(ballots: &[ExchangeRateBallot]) -> usize {
    ballots.iter().filter(|b| !b.is_abstain()).count()
}

/// Sort ballots by rate, ties by voter address bytes
pub fn sort_ballots(ballots: &mut [ExchangeRateBallot]) {
    ballots.sort_by(|a, b| a.rate.cmp(&b.rate).then_with(|| a.voter.cmp(&b.voter)));
}

/// Weighted median of sorted ballots; `None` when total power is zero
pub fn weighted_median(sorted: &[ExchangeRateBallot]) -> Option<Dec> {
    let total = total_power(sorted);
    if total <= 0 {
        return None;
    }
    let target = (total + 1) / 2;
    let mut cumulative = 0i64;
    for ballot in sorted {
        cumulative += ballot.power;
        if cumulative >= target {
            return Some(ballot.rate.clone());
        }
    }
    None
}

/// Power-weighted standard deviation about `median`
pub fn standard_deviation(ballots: &[ExchangeRateBallot], median: &Dec) -> Result<Dec> {
    let total = total_power(ballots);
    if total <= 0 {
        return Ok(Dec::zero());
    }
    let mut sum = Dec::zero();
    for ballot in ballots {
        let deviation = ballot.rate.checked_sub(median)?;
        let squared = deviation.checked_mul(&deviation)?;
        sum = sum.checked_add(&squared.checked_mul(&Dec::from(ballot.power))?)?;
    }
    let variance = sum.checked_quo(&Dec::from(total))?;
    Ok(variance.sqrt()?)
}

/// Tally one pair, crediting winners in `performances`, and return the median
///
/// Callers guarantee positive total power; a pair without it never reaches
/// the tally.
pub fn tally(
    pair: &AssetPair,
    ballots: &[ExchangeRateBallot],
    reward_band: &Dec,
    performances: &mut ValidatorPerformances,
) -> Result<Dec> {
    let mut sorted = ballots.to_vec();
    sort_ballots(&mut sorted);
    let median =
        weighted_median(&sorted).ok_or_else(|| OracleError::EmptyBallot(pair.clone()))?;

    let std_dev = standard_deviation(&sorted, &median)?;
    let band_spread = median.checked_mul(reward_band)?.checked_quo(&Dec::from(2i64))?;
    let spread = std::cmp::max(std_dev, band_spread);
    let lower = median.checked_sub(&spread)?;
    let upper = median.checked_add(&spread)?;

    for ballot in &sorted {
        let inside = ballot.rate >= lower && ballot.rate <= upper;
        if ballot.is_abstain() || inside {
            if let Some(perf) = performances.get_mut(&ballot.voter) {
                perf.reward_weight += ballot.power;
                perf.win_count += 1;
            }
        }
    }

    tracing::debug!(
        %pair,
        %median,
        %spread,
        "tallied ballot"
    );
    Ok(median)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidatorPerformance;
    use proptest::prelude::*;
    use tessera_core::ValAddress;

    fn pair() -> AssetPair {
        "ubtc:uusd".parse().unwrap()
    }

    fn ballot(seed: &str, rate: i64, power: i64) -> ExchangeRateBallot {
        ExchangeRateBallot {
            pair: pair(),
            rate: Dec::from(rate),
            voter: ValAddress::from_seed(seed),
            power,
        }
    }

    fn performances(ballots: &[ExchangeRateBallot]) -> ValidatorPerformances {
        let mut perfs = ValidatorPerformances::default();
        for b in ballots {
            perfs.insert(ValidatorPerformance::new(b.voter, b.power));
        }
        perfs
    }

    #[test]
    fn test_three_voter_median() {
        let ballots = vec![
            ballot("a", 1000, 10),
            ballot("b", 1020, 20),
            ballot("c", 1040, 10),
        ];
        let mut perfs = performances(&ballots);
        let median = tally(&pair(), &ballots, &Dec::percent(2), &mut perfs).unwrap();
        assert_eq!(median, Dec::from(1020i64));

        // σ = sqrt(200) ≈ 14.14 exceeds the band spread of 10.2; the outer
        // ballots sit 20 away and do not win
        let b = &ballots[1].voter;
        assert_eq!(perfs.get(b).unwrap().win_count, 1);
        assert_eq!(perfs.get(b).unwrap().reward_weight, 20);
        assert_eq!(perfs.get(&ballots[0].voter).unwrap().win_count, 0);
        assert_eq!(perfs.get(&ballots[2].voter).unwrap().win_count, 0);
    }

    #[test]
    fn test_three_voter_wide_band_all_win() {
        let ballots = vec![
            ballot("a", 1000, 10),
            ballot("b", 1020, 20),
            ballot("c", 1040, 10),
        ];
        let mut perfs = performances(&ballots);
        let median = tally(&pair(), &ballots, &Dec::percent(5), &mut perfs).unwrap();
        assert_eq!(median, Dec::from(1020i64));
        assert!(perfs.iter().all(|p| p.win_count == 1));
        assert_eq!(perfs.total_reward_weight(), 40);
    }

    #[test]
    fn test_single_ballot() {
        let ballots = vec![ballot("solo", 42, 7)];
        let mut perfs = performances(&ballots);
        assert_eq!(tally(&pair(), &ballots, &Dec::percent(2), &mut perfs).unwrap(), Dec::from(42i64));
        assert_eq!(standard_deviation(&ballots, &Dec::from(42i64)).unwrap(), Dec::zero());
    }

    #[test]
    fn test_abstain_wins_without_weight() {
        let ballots = vec![
            ballot("a", 100, 10),
            ballot("b", 101, 10),
            ExchangeRateBallot {
                power: 0,
                ..ballot("abstain", 0, 0)
            },
        ];
        let mut perfs = performances(&ballots);
        tally(&pair(), &ballots, &Dec::percent(2), &mut perfs).unwrap();
        let abstainer = perfs.get(&ValAddress::from_seed("abstain")).unwrap();
        assert_eq!(abstainer.win_count, 1);
        assert_eq!(abstainer.reward_weight, 0);
    }

    #[test]
    fn test_zero_power_orders_but_does_not_weigh() {
        let mut ballots = vec![ballot("z", 1, 0), ballot("a", 5, 3), ballot("b", 9, 1)];
        sort_ballots(&mut ballots);
        assert_eq!(weighted_median(&ballots), Some(Dec::from(5i64)));
    }

    #[test]
    fn test_tie_broken_by_voter() {
        let mut ballots = vec![ballot("x", 5, 1), ballot("y", 5, 1)];
        sort_ballots(&mut ballots);
        assert!(ballots[0].voter < ballots[1].voter);
    }

    #[test]
    fn test_empty_power_is_error() {
        let ballots = vec![ballot("a", 0, 0)];
        let mut perfs = performances(&ballots);
        assert!(matches!(
            tally(&pair(), &ballots, &Dec::percent(2), &mut perfs),
            Err(OracleError::EmptyBallot(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_identical_ballots_all_win(rate in 1i64..1_000_000, power in 1i64..1_000, n in 1usize..8) {
            let ballots: Vec<_> = (0..n).map(|i| ballot(&format!("v{i}"), rate, power)).collect();
            let mut perfs = performances(&ballots);
            let median = tally(&pair(), &ballots, &Dec::percent(2), &mut perfs).unwrap();
            prop_assert_eq!(median, Dec::from(rate));
            prop_assert!(perfs.iter().all(|p| p.win_count == 1));
        }

        #[test]
        fn prop_negation_negates_median(
            entries in proptest::collection::vec((-1_000i64..1_000, 1i64..50), 1..9)
        ) {
            let mut ballots: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (r, p))| ballot(&format!("v{i}"), *r, *p))
                .collect();
            // odd total power keeps the median unique
            if total_power(&ballots) % 2 == 0 {
                ballots[0].power += 1;
            }
            let mut negated: Vec<_> = ballots
                .iter()
                .map(|b| ExchangeRateBallot { rate: -&b.rate, ..b.clone() })
                .collect();
            sort_ballots(&mut ballots);
            sort_ballots(&mut negated);
            let m = weighted_median(&ballots).unwrap();
            let n = weighted_median(&negated).unwrap();
            prop_assert_eq!(n, -m);
        }
    }
}
