// =============================================================================
// Candle Merger — merges the indexer's pre-aggregated candle stream
// =============================================================================
//
// The indexing service delivers possibly-revised, possibly-out-of-order
// snapshots of candles (a streaming subscription over an eventually-consistent
// index). Replace-by-key is the merge rule: an incoming record is
// authoritative for its bucket, so re-ingesting the same batch twice leaves
// the series unchanged. Transport-level redelivery after a reconnect
// therefore cannot corrupt the series.
// =============================================================================

use crate::engine::series::{Candle, CandleSeries};

/// Counts for one merged batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Records that created a new bucket entry.
    pub inserted: usize,
    /// Records that replaced an existing bucket entry.
    pub replaced: usize,
}

/// Owns the indexer-side candle series. All mutation goes through
/// [`ingest`](Self::ingest); there is no other write path.
pub struct CandleMerger {
    series: CandleSeries,
    batches_merged: u64,
}

impl CandleMerger {
    pub fn new(max_series_len: usize) -> Self {
        Self {
            series: CandleSeries::new(max_series_len),
            batches_merged: 0,
        }
    }

    /// Merge one batch of candle records.
    ///
    /// For every record: replace the existing entry with the same
    /// `bucket_start` (a revision of a still-open bucket), otherwise insert.
    /// After the whole batch, the series is re-sorted ascending and truncated
    /// to the most recent entries. An empty batch is a no-op, not an error.
    pub fn ingest(&mut self, batch: &[Candle]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if batch.is_empty() {
            return outcome;
        }

        for record in batch {
            match self.series.get_mut(record.bucket_start) {
                Some(existing) => {
                    *existing = record.clone();
                    outcome.replaced += 1;
                }
                None => {
                    self.series.insert(record.clone());
                    outcome.inserted += 1;
                }
            }
        }

        self.series.sort_and_trim();
        self.batches_merged += 1;
        outcome
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    pub fn batches_merged(&self) -> u64 {
        self.batches_merged
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(bucket_start: i64, close: f64) -> Candle {
        Candle {
            bucket_start,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 10.0,
        }
    }

    fn closes(merger: &CandleMerger) -> Vec<f64> {
        merger.series().iter().map(|c| c.close).collect()
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut merger = CandleMerger::new(100);
        merger.ingest(&[candle(60_000, 10.0)]);

        let before: Vec<Candle> = merger.series().to_vec();
        let outcome = merger.ingest(&[]);

        assert_eq!(outcome, MergeOutcome::default());
        assert_eq!(merger.series().to_vec(), before);
    }

    #[test]
    fn ingest_is_idempotent() {
        let batch = vec![candle(0, 10.0), candle(60_000, 11.0), candle(120_000, 12.0)];

        let mut merger = CandleMerger::new(100);
        let first = merger.ingest(&batch);
        assert_eq!(first.inserted, 3);
        assert_eq!(first.replaced, 0);
        let after_once = merger.series().to_vec();

        let second = merger.ingest(&batch);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.replaced, 3);
        assert_eq!(merger.series().to_vec(), after_once);
        assert_eq!(merger.series().len(), 3);
    }

    #[test]
    fn revision_replaces_only_its_bucket() {
        let mut merger = CandleMerger::new(100);
        merger.ingest(&[candle(0, 10.0), candle(60_000, 11.0), candle(120_000, 12.0)]);

        // The provider recomputes the middle (still-open) bucket.
        merger.ingest(&[candle(60_000, 11.5)]);

        assert_eq!(closes(&merger), vec![10.0, 11.5, 12.0]);
        assert_eq!(merger.series().len(), 3);
    }

    #[test]
    fn out_of_order_batch_is_sorted_ascending() {
        let mut merger = CandleMerger::new(100);
        merger.ingest(&[candle(120_000, 12.0), candle(0, 10.0), candle(60_000, 11.0)]);

        let buckets: Vec<i64> = merger.series().iter().map(|c| c.bucket_start).collect();
        assert_eq!(buckets, vec![0, 60_000, 120_000]);
    }

    #[test]
    fn retention_keeps_most_recent_buckets() {
        let mut merger = CandleMerger::new(3);
        let batch: Vec<Candle> = (0..5).map(|i| candle(i * 60_000, 10.0 + i as f64)).collect();
        merger.ingest(&batch);

        let buckets: Vec<i64> = merger.series().iter().map(|c| c.bucket_start).collect();
        assert_eq!(buckets, vec![120_000, 180_000, 240_000]);
    }

    #[test]
    fn backfill_of_an_older_bucket_is_inserted_in_place() {
        let mut merger = CandleMerger::new(100);
        merger.ingest(&[candle(0, 10.0), candle(120_000, 12.0)]);
        // The index catches up and delivers the bucket it skipped.
        merger.ingest(&[candle(60_000, 11.0)]);

        let buckets: Vec<i64> = merger.series().iter().map(|c| c.bucket_start).collect();
        assert_eq!(buckets, vec![0, 60_000, 120_000]);
    }

    #[test]
    fn replayed_batch_after_reconnect_leaves_length_unchanged() {
        let batch = vec![candle(0, 10.0), candle(60_000, 11.0)];
        let mut merger = CandleMerger::new(100);
        merger.ingest(&batch);
        merger.ingest(&batch);
        merger.ingest(&batch);
        assert_eq!(merger.series().len(), 2);
        assert_eq!(merger.batches_merged(), 3);
    }
}
