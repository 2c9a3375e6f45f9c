pub mod candle_merger;
pub mod reconcile;
pub mod series;
pub mod trade_aggregator;

// Re-export the core types for convenient access (e.g. `use crate::engine::Candle`).
pub use candle_merger::CandleMerger;
pub use reconcile::{compare_series, ParityMetrics};
pub use series::{bucket_start_for, Candle, CandleSeries};
pub use trade_aggregator::{TradeAggregator, TradeIngest};
