// =============================================================================
// Candle Series — bounded, bucket-aligned OHLCV storage
// =============================================================================
//
// One `CandleSeries` per feed. The two series are owned exclusively by their
// respective aggregators and are never merged into one structure, only read
// side by side when comparing the feeds.
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default candle bucket width: one minute.
pub const DEFAULT_BUCKET_WIDTH_MS: i64 = 60_000;

/// Default retention per series: the dashboard chart window.
pub const DEFAULT_MAX_SERIES_LEN: usize = 100;

/// OHLCV statistics for one fixed-width time bucket.
///
/// `bucket_start` is an epoch-millisecond timestamp truncated to the bucket
/// grid; for any candle built from at least one trade,
/// `low <= open, close <= high` and `volume >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Open a fresh candle from the first trade of a bucket.
    pub fn from_trade(bucket_start: i64, price: f64, size: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
        }
    }

    /// Fold one more trade of the same bucket into this candle.
    pub fn apply_trade(&mut self, price: f64, size: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += size;
    }
}

/// Truncate `timestamp_ms` down to the start of its bucket.
///
/// `rem_euclid` keeps pre-epoch timestamps on the same grid as positive ones.
pub fn bucket_start_for(timestamp_ms: i64, bucket_width_ms: i64) -> i64 {
    if bucket_width_ms <= 0 {
        return timestamp_ms;
    }
    timestamp_ms - timestamp_ms.rem_euclid(bucket_width_ms)
}

/// Ordered sequence of candles, unique by `bucket_start`, ascending, bounded
/// at `max_len` entries. Oldest entries are evicted first once the bound is
/// exceeded.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: VecDeque<Candle>,
    max_len: usize,
}

impl CandleSeries {
    pub fn new(max_len: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(max_len + 1),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// The most recent candle (highest `bucket_start`), if any.
    pub fn tail(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn tail_mut(&mut self) -> Option<&mut Candle> {
        self.candles.back_mut()
    }

    /// Append a candle that is known to be newer than the current tail, then
    /// trim the oldest entries down to the retention bound.
    pub fn push(&mut self, candle: Candle) {
        self.candles.push_back(candle);
        while self.candles.len() > self.max_len {
            self.candles.pop_front();
        }
    }

    /// Look up a candle by exact `bucket_start`.
    pub fn get(&self, bucket_start: i64) -> Option<&Candle> {
        self.candles.iter().find(|c| c.bucket_start == bucket_start)
    }

    pub fn get_mut(&mut self, bucket_start: i64) -> Option<&mut Candle> {
        self.candles
            .iter_mut()
            .find(|c| c.bucket_start == bucket_start)
    }

    /// Insert a candle at an arbitrary position. The series is NOT re-sorted
    /// here; callers that insert out of order must follow up with
    /// [`sort_and_trim`](Self::sort_and_trim).
    pub fn insert(&mut self, candle: Candle) {
        self.candles.push_back(candle);
    }

    /// Restore the ascending-by-bucket invariant and drop the oldest entries
    /// beyond the retention bound.
    pub fn sort_and_trim(&mut self) {
        self.candles
            .make_contiguous()
            .sort_unstable_by_key(|c| c.bucket_start);
        while self.candles.len() > self.max_len {
            self.candles.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// Owned snapshot for serialisation to the dashboard.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
