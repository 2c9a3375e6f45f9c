// =============================================================================
// Trade Aggregator — folds the raw exchange tape into OHLCV candles
// =============================================================================
//
// Real-time aggregation is O(1) amortized per trade: only the tail candle is
// ever updated in place. Trades are expected to arrive in non-decreasing
// timestamp order within a session; a trade whose bucket lies strictly before
// the tail is dropped and counted, never merged back into a closed bucket.
// =============================================================================

use crate::engine::series::{bucket_start_for, Candle, CandleSeries};
use crate::types::Trade;

/// Outcome of folding one trade into the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeIngest {
    /// The trade updated the tail candle or opened a new one.
    Applied,
    /// The trade's bucket is older than the tail and was discarded.
    DroppedLate { bucket: i64, tail: i64 },
}

/// Owns the exchange-side candle series. All mutation goes through
/// [`ingest`](Self::ingest); there is no other write path.
pub struct TradeAggregator {
    series: CandleSeries,
    bucket_width_ms: i64,
    late_drops: u64,
    trades_applied: u64,
}

impl TradeAggregator {
    pub fn new(bucket_width_ms: i64, max_series_len: usize) -> Self {
        Self {
            series: CandleSeries::new(max_series_len),
            bucket_width_ms,
            late_drops: 0,
            trades_applied: 0,
        }
    }

    /// Fold a single trade into the series.
    ///
    /// Update-in-place when the trade lands in the tail bucket, append a new
    /// candle when it lands in a later bucket, drop it when it lands in an
    /// earlier one.
    pub fn ingest(&mut self, trade: &Trade) -> TradeIngest {
        let bucket = bucket_start_for(trade.timestamp, self.bucket_width_ms);

        match self.series.tail_mut() {
            Some(tail) if bucket < tail.bucket_start => {
                let tail_bucket = tail.bucket_start;
                self.late_drops += 1;
                TradeIngest::DroppedLate {
                    bucket,
                    tail: tail_bucket,
                }
            }
            Some(tail) if bucket == tail.bucket_start => {
                tail.apply_trade(trade.price, trade.size);
                self.trades_applied += 1;
                TradeIngest::Applied
            }
            _ => {
                self.series
                    .push(Candle::from_trade(bucket, trade.price, trade.size));
                self.trades_applied += 1;
                TradeIngest::Applied
            }
        }
    }

    /// Fold a batch of trades left-to-right, one at a time. Processing order
    /// inside a batch determines open/close/high/low, so the input order is
    /// preserved. Returns the number of applied (non-dropped) trades.
    pub fn ingest_batch(&mut self, trades: &[Trade]) -> usize {
        trades
            .iter()
            .filter(|t| self.ingest(t) == TradeIngest::Applied)
            .count()
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    /// Trades discarded because their bucket was already behind the tail.
    pub fn late_drops(&self) -> u64 {
        self.late_drops
    }

    pub fn trades_applied(&self) -> u64 {
        self.trades_applied
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeSide;

    fn trade(timestamp: i64, price: f64, size: f64) -> Trade {
        Trade {
            timestamp,
            price,
            size,
            side: TradeSide::Buy,
            trade_id: timestamp as u64,
        }
    }

    #[test]
    fn single_bucket_folds_to_expected_ohlcv() {
        let mut agg = TradeAggregator::new(60_000, 100);
        for (ts, px, sz) in [
            (60_100, 100.0, 1.0),
            (60_200, 105.0, 2.0),
            (60_300, 95.0, 1.5),
            (60_900, 101.0, 0.5),
        ] {
            assert_eq!(agg.ingest(&trade(ts, px, sz)), TradeIngest::Applied);
        }

        assert_eq!(agg.series().len(), 1);
        let c = agg.series().tail().unwrap();
        assert_eq!(c.bucket_start, 60_000);
        assert_eq!(c.open, 100.0);
        assert_eq!(c.high, 105.0);
        assert_eq!(c.low, 95.0);
        assert_eq!(c.close, 101.0);
        assert!((c.volume - 5.0).abs() < 1e-12);
    }

    #[test]
    fn bucket_rollover_opens_second_candle() {
        // Three trades, bucket width 60s: first two land in bucket 0, the
        // third in bucket 60000.
        let mut agg = TradeAggregator::new(60_000, 100);
        agg.ingest(&trade(1_000, 5.0, 1.0));
        agg.ingest(&trade(2_000, 6.0, 2.0));
        agg.ingest(&trade(61_000, 7.0, 1.0));

        assert_eq!(agg.series().len(), 2);
        let candles: Vec<Candle> = agg.series().iter().cloned().collect();

        assert_eq!(candles[0].bucket_start, 0);
        assert_eq!(candles[0].open, 5.0);
        assert_eq!(candles[0].high, 6.0);
        assert_eq!(candles[0].low, 5.0);
        assert_eq!(candles[0].close, 6.0);
        assert!((candles[0].volume - 3.0).abs() < 1e-12);

        assert_eq!(candles[1].bucket_start, 60_000);
        assert_eq!(candles[1].open, 7.0);
        assert_eq!(candles[1].high, 7.0);
        assert_eq!(candles[1].low, 7.0);
        assert_eq!(candles[1].close, 7.0);
        assert!((candles[1].volume - 1.0).abs() < 1e-12);
    }

    #[test]
    fn series_never_exceeds_retention_bound() {
        let mut agg = TradeAggregator::new(60_000, 100);
        for i in 0..150 {
            agg.ingest(&trade(i * 60_000, 100.0, 1.0));
        }
        assert_eq!(agg.series().len(), 100);
        // Oldest evicted first: the first surviving bucket is #50.
        assert_eq!(agg.series().iter().next().unwrap().bucket_start, 50 * 60_000);
        assert_eq!(agg.series().tail().unwrap().bucket_start, 149 * 60_000);
    }

    #[test]
    fn late_trade_before_tail_is_dropped_not_merged() {
        // Known feed limitation: only the tail bucket is ever updated. A trade
        // that belongs to an earlier bucket is discarded and counted, and the
        // closed candle stays exactly as it was.
        let mut agg = TradeAggregator::new(60_000, 100);
        agg.ingest(&trade(1_000, 5.0, 1.0));
        agg.ingest(&trade(61_000, 7.0, 1.0));

        let outcome = agg.ingest(&trade(2_000, 9.0, 4.0));
        assert_eq!(
            outcome,
            TradeIngest::DroppedLate {
                bucket: 0,
                tail: 60_000
            }
        );
        assert_eq!(agg.late_drops(), 1);

        let first = agg.series().iter().next().unwrap();
        assert_eq!(first.high, 5.0);
        assert!((first.volume - 1.0).abs() < 1e-12);
    }

    #[test]
    fn batch_folds_left_to_right() {
        // Same trades, same bucket: batch ingestion must equal one-at-a-time
        // ingestion, so open is the first price and close the last.
        let batch = vec![
            trade(100, 10.0, 1.0),
            trade(200, 12.0, 1.0),
            trade(300, 8.0, 1.0),
            trade(400, 11.0, 1.0),
        ];

        let mut agg = TradeAggregator::new(60_000, 100);
        assert_eq!(agg.ingest_batch(&batch), 4);

        let c = agg.series().tail().unwrap();
        assert_eq!(c.open, 10.0);
        assert_eq!(c.high, 12.0);
        assert_eq!(c.low, 8.0);
        assert_eq!(c.close, 11.0);
    }

    #[test]
    fn equal_timestamp_trades_stay_in_one_bucket() {
        let mut agg = TradeAggregator::new(60_000, 100);
        for px in [100.0, 101.0, 99.0] {
            agg.ingest(&trade(60_000, px, 1.0));
        }
        assert_eq!(agg.series().len(), 1);
        assert_eq!(agg.series().tail().unwrap().close, 99.0);
    }
}
