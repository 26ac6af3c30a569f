//! Time-weighted averages over timestamped observations

use crate::dec::Dec;

/// Time-weighted average of `points` over `(now - lookback, now]`
///
/// `points` are `(timestamp_ms, value)` ordered newest first, all at or
/// before `now_ms`. Each value is weighted by how long it stood before the
/// next newer one (or `now`). The oldest point reaching past the window is
/// clipped to the window start. Returns the newest value when the window has
/// no duration and `None` when there are no points.
pub fn time_weighted_average(points: &[(i64, Dec)], now_ms: i64, lookback_ms: i64) -> Option<Dec> {
    let (_, newest) = points.first()?;
    let lower = now_ms - lookback_ms.max(0);
    let mut prev = now_ms;
    let mut weighted = Dec::zero();
    let mut total_ms: i64 = 0;

    for (ts, value) in points {
        let start = (*ts).max(lower);
        let duration = prev - start;
        if duration > 0 {
            weighted += value * &Dec::from(duration);
            total_ms += duration;
        }
        prev = start;
        if *ts <= lower {
            break;
        }
    }

    if total_ms == 0 {
        return Some(newest.clone());
    }
    Some(weighted / Dec::from(total_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Dec {
        Dec::from(v)
    }

    #[test]
    fn test_single_point_is_its_value() {
        assert_eq!(time_weighted_average(&[(0, d(10))], 1_000, 500), Some(d(10)));
    }

    #[test]
    fn test_weights_by_duration() {
        // 10 stood for 300ms (clipped), 20 stood for the last 100ms
        let points = [(900, d(20)), (100, d(10))];
        assert_eq!(time_weighted_average(&points, 1_000, 400), Some("12.5".parse().unwrap()));
    }

    #[test]
    fn test_zero_lookback_returns_latest() {
        let points = [(1_000, d(7)), (0, d(3))];
        assert_eq!(time_weighted_average(&points, 1_000, 0), Some(d(7)));
    }

    #[test]
    fn test_empty() {
        assert_eq!(time_weighted_average(&[], 1_000, 100), None);
    }
}
