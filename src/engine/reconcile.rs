// =============================================================================
// Feed Reconciliation — agreement metrics between the two candle series
// =============================================================================
//
// Pure, synchronous recomputation over two read-only series snapshots; holds
// no state of its own. Either feed may be momentarily ahead of the other —
// unmatched buckets simply lower the match rate, they are not an error.
// =============================================================================

use std::collections::HashMap;

use serde::Serialize;

use crate::engine::series::CandleSeries;

/// Agreement metrics between the exchange series (A) and the indexer
/// series (B), recomputed from scratch whenever either series changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ParityMetrics {
    /// Fraction of exchange buckets that have a same-timestamp counterpart in
    /// the indexer series, in `[0, 1]`.
    pub matched_fraction: f64,
    /// Mean of `|close_a - close_b| / close_a` over matched buckets, in
    /// basis points.
    pub mean_deviation_bps: f64,
    /// Exchange buckets considered.
    pub compared_buckets: usize,
    /// Buckets present in both series.
    pub matched_buckets: usize,
    /// Matched buckets that contributed to the deviation mean. A matched
    /// bucket with a zero (or otherwise non-finite-ratio) exchange close is
    /// skipped here while still counting as matched.
    pub deviation_samples: usize,
}

/// Compare the two series and compute agreement metrics.
///
/// Empty input on either side yields zeroed metrics.
pub fn compare_series(series_a: &CandleSeries, series_b: &CandleSeries) -> ParityMetrics {
    if series_a.is_empty() || series_b.is_empty() {
        return ParityMetrics::default();
    }

    let closes_b: HashMap<i64, f64> = series_b
        .iter()
        .map(|c| (c.bucket_start, c.close))
        .collect();

    let mut matched_buckets = 0_usize;
    let mut deviation_samples = 0_usize;
    let mut deviation_sum = 0.0_f64;

    for candle_a in series_a.iter() {
        let Some(&close_b) = closes_b.get(&candle_a.bucket_start) else {
            continue;
        };
        matched_buckets += 1;

        // Zero-close guard: the bucket stays matched, its deviation term is
        // skipped rather than raising a division fault.
        if candle_a.close == 0.0 {
            continue;
        }
        let ratio = (candle_a.close - close_b).abs() / candle_a.close;
        if !ratio.is_finite() {
            continue;
        }
        deviation_sum += ratio;
        deviation_samples += 1;
    }

    let compared_buckets = series_a.len();
    let matched_fraction = matched_buckets as f64 / compared_buckets as f64;
    let mean_deviation_bps = if deviation_samples > 0 {
        10_000.0 * deviation_sum / deviation_samples as f64
    } else {
        0.0
    };

    ParityMetrics {
        matched_fraction,
        mean_deviation_bps,
        compared_buckets,
        matched_buckets,
        deviation_samples,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::series::Candle;

    fn series_of(closes: &[(i64, f64)]) -> CandleSeries {
        let mut series = CandleSeries::new(100);
        for &(bucket_start, close) in closes {
            series.push(Candle {
                bucket_start,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            });
        }
        series
    }

    #[test]
    fn two_empty_series_yield_zeroed_metrics() {
        let metrics = compare_series(&CandleSeries::new(100), &CandleSeries::new(100));
        assert_eq!(metrics, ParityMetrics::default());
    }

    #[test]
    fn one_empty_series_yields_zeroed_metrics() {
        let a = series_of(&[(60_000, 10.0)]);
        let metrics = compare_series(&a, &CandleSeries::new(100));
        assert_eq!(metrics.matched_fraction, 0.0);
        assert_eq!(metrics.mean_deviation_bps, 0.0);
    }

    #[test]
    fn half_matched_with_hundred_bps_deviation() {
        // |10 - 10.1| / 10 * 10000 = 100 bps on the single matched bucket.
        let a = series_of(&[(60_000, 10.0), (120_000, 11.0)]);
        let b = series_of(&[(60_000, 10.1)]);

        let metrics = compare_series(&a, &b);
        assert!((metrics.matched_fraction - 0.5).abs() < 1e-12);
        assert!((metrics.mean_deviation_bps - 100.0).abs() < 1e-9);
        assert_eq!(metrics.compared_buckets, 2);
        assert_eq!(metrics.matched_buckets, 1);
        assert_eq!(metrics.deviation_samples, 1);
    }

    #[test]
    fn identical_series_fully_match_with_zero_deviation() {
        let closes = [(0_i64, 10.0), (60_000, 11.0), (120_000, 12.0)];
        let metrics = compare_series(&series_of(&closes), &series_of(&closes));
        assert!((metrics.matched_fraction - 1.0).abs() < 1e-12);
        assert_eq!(metrics.mean_deviation_bps, 0.0);
        assert_eq!(metrics.deviation_samples, 3);
    }

    #[test]
    fn zero_close_counts_as_matched_but_not_toward_deviation() {
        let a = series_of(&[(60_000, 0.0), (120_000, 10.0)]);
        let b = series_of(&[(60_000, 5.0), (120_000, 10.1)]);

        let metrics = compare_series(&a, &b);
        assert!((metrics.matched_fraction - 1.0).abs() < 1e-12);
        assert_eq!(metrics.matched_buckets, 2);
        assert_eq!(metrics.deviation_samples, 1);
        assert!((metrics.mean_deviation_bps - 100.0).abs() < 1e-9);
    }

    #[test]
    fn all_zero_closes_yield_zero_deviation_without_fault() {
        let a = series_of(&[(60_000, 0.0)]);
        let b = series_of(&[(60_000, 5.0)]);

        let metrics = compare_series(&a, &b);
        assert_eq!(metrics.matched_buckets, 1);
        assert_eq!(metrics.deviation_samples, 0);
        assert_eq!(metrics.mean_deviation_bps, 0.0);
    }

    #[test]
    fn indexer_ahead_of_exchange_is_tolerated() {
        // Source B has buckets A has not produced yet; they simply do not
        // participate.
        let a = series_of(&[(60_000, 10.0)]);
        let b = series_of(&[(60_000, 10.0), (120_000, 11.0), (180_000, 12.0)]);

        let metrics = compare_series(&a, &b);
        assert!((metrics.matched_fraction - 1.0).abs() < 1e-12);
        assert_eq!(metrics.compared_buckets, 1);
    }

    #[test]
    fn disjoint_buckets_match_nothing() {
        let a = series_of(&[(0, 10.0), (60_000, 11.0)]);
        let b = series_of(&[(120_000, 10.0), (180_000, 11.0)]);

        let metrics = compare_series(&a, &b);
        assert_eq!(metrics.matched_fraction, 0.0);
        assert_eq!(metrics.mean_deviation_bps, 0.0);
        assert_eq!(metrics.compared_buckets, 2);
    }
}
