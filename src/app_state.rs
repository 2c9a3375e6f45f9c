// =============================================================================
// Central Application State — Parity Watch
// =============================================================================
//
// The single source of truth for the monitor. Each feed's aggregation state
// lives behind its own lock with exactly one writer task; AppState ties them
// together and provides a unified snapshot for the dashboard API and
// WebSocket feed.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock around each candle series owner; the two series
//     are never locked for writing together, and the reconciliation path
//     only takes read locks.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::engine::{
    compare_series, Candle, CandleMerger, ParityMetrics, TradeAggregator, TradeIngest,
};
use crate::engine::candle_merger::MergeOutcome;
use crate::feed::decode::DecodeError;
use crate::runtime_config::RuntimeConfig;
use crate::types::{FeedSource, Trade};

// =============================================================================
// Error Record
// =============================================================================

/// A recorded diagnostic event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable message.
    pub message: String,
    /// Which feed surfaced the diagnostic.
    pub source: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// Feed telemetry
// =============================================================================

/// Live counters for one upstream feed.
#[derive(Debug, Default)]
pub struct FeedTelemetry {
    pub connected: bool,
    /// Messages consumed from the transport.
    pub messages: u64,
    /// Frames or records rejected by the strict decoder.
    pub decode_errors: u64,
    pub last_event: Option<Instant>,
}

/// Serialisable form of [`FeedTelemetry`] for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatusSnapshot {
    pub connected: bool,
    pub messages: u64,
    pub decode_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_age_ms: Option<u64>,
}

impl FeedTelemetry {
    fn snapshot(&self) -> FeedStatusSnapshot {
        FeedStatusSnapshot {
            connected: self.connected,
            messages: self.messages,
            decode_errors: self.decode_errors,
            last_event_age_ms: self.last_event.map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent diagnostics to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Monotonically increasing version counter. Incremented on every
    /// meaningful state mutation. The WebSocket feed uses this to detect
    /// changes and push updates.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Aggregation engine ──────────────────────────────────────────────
    /// Source A: candles built trade-by-trade from the exchange tape.
    pub trade_aggregator: RwLock<TradeAggregator>,
    /// Source B: candles merged from the indexer subscription.
    pub candle_merger: RwLock<CandleMerger>,

    // ── Feed telemetry ──────────────────────────────────────────────────
    pub exchange_feed: RwLock<FeedTelemetry>,
    pub indexer_feed: RwLock<FeedTelemetry>,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    /// Instant when the monitor was started. Used for uptime calculations.
    pub start_time: Instant,
}

impl AppState {
    /// Construct a new `AppState` from the given runtime configuration.
    ///
    /// Bucket width and series retention are read once here; both are fixed
    /// for the lifetime of the session.
    pub fn new(config: RuntimeConfig) -> Self {
        let trade_aggregator =
            TradeAggregator::new(config.bucket_width_ms, config.max_series_len);
        let candle_merger = CandleMerger::new(config.max_series_len);

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),

            runtime_config: Arc::new(RwLock::new(config)),
            trade_aggregator: RwLock::new(trade_aggregator),
            candle_merger: RwLock::new(candle_merger),

            exchange_feed: RwLock::new(FeedTelemetry::default()),
            indexer_feed: RwLock::new(FeedTelemetry::default()),

            recent_errors: RwLock::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Atomically increment the state version. Call this after every
    /// meaningful mutation to signal WebSocket clients that fresh data is
    /// available.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the current state version without modifying it.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Feed telemetry ──────────────────────────────────────────────────

    pub fn feed(&self, source: FeedSource) -> &RwLock<FeedTelemetry> {
        match source {
            FeedSource::Exchange => &self.exchange_feed,
            FeedSource::Indexer => &self.indexer_feed,
        }
    }

    pub fn mark_feed_connected(&self, source: FeedSource, connected: bool) {
        self.feed(source).write().connected = connected;
        self.increment_version();
    }

    /// Count one consumed transport message and refresh the feed heartbeat.
    pub fn record_feed_message(&self, source: FeedSource) {
        let mut telemetry = self.feed(source).write();
        telemetry.messages += 1;
        telemetry.last_event = Some(Instant::now());
    }

    /// Count a record rejected by the strict decoder and surface it upward.
    pub fn record_decode_error(&self, source: FeedSource, error: &DecodeError) {
        self.feed(source).write().decode_errors += 1;
        self.push_error(source, error.to_string());
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record a diagnostic. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted when the limit is
    /// reached.
    pub fn push_error(&self, source: FeedSource, message: String) {
        let record = ErrorRecord {
            message,
            source: source.to_string(),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Ingestion entry points ──────────────────────────────────────────

    /// Fold one decoded exchange trade into the source-A series.
    pub fn apply_trade(&self, trade: &Trade) {
        let outcome = self.trade_aggregator.write().ingest(trade);

        if let TradeIngest::DroppedLate { bucket, tail } = outcome {
            debug!(
                trade_id = trade.trade_id,
                bucket,
                tail,
                "late trade behind the tail bucket dropped"
            );
        }

        self.increment_version();
    }

    /// Merge one decoded indexer candle batch into the source-B series.
    pub fn apply_candle_batch(&self, batch: &[Candle]) -> MergeOutcome {
        if batch.is_empty() {
            return MergeOutcome::default();
        }

        let outcome = self.candle_merger.write().ingest(batch);
        self.increment_version();
        outcome
    }

    // ── Read-only accessors ─────────────────────────────────────────────

    pub fn exchange_series(&self) -> Vec<Candle> {
        self.trade_aggregator.read().series().to_vec()
    }

    pub fn indexer_series(&self) -> Vec<Candle> {
        self.candle_merger.read().series().to_vec()
    }

    /// Recompute the agreement metrics from the two current series.
    ///
    /// Pure read path: both locks are taken for reading only, so this can be
    /// called at any time without side effects.
    pub fn parity(&self) -> ParityMetrics {
        let aggregator = self.trade_aggregator.read();
        let merger = self.candle_merger.read();
        compare_series(aggregator.series(), merger.series())
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build a complete, serialisable snapshot of the monitor state.
    ///
    /// This is the payload sent to the dashboard via the REST
    /// `GET /api/v1/state` endpoint and the WebSocket push feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let now = Utc::now();
        let config = self.runtime_config.read();
        let version = self.current_state_version();

        let status = StatusHeader {
            symbol: config.symbol.clone(),
            exchange: self.exchange_feed.read().snapshot(),
            indexer: self.indexer_feed.read().snapshot(),
            late_trade_drops: self.trade_aggregator.read().late_drops(),
            uptime_s: self.start_time.elapsed().as_secs(),
            state_version: version,
            ws_sequence_number: self.ws_sequence_number.load(Ordering::Relaxed),
            server_time: now.timestamp_millis(),
        };

        let config_summary = ConfigSummary {
            symbol: config.symbol.clone(),
            bucket_width_ms: config.bucket_width_ms,
            max_series_len: config.max_series_len,
            indexer_transport: config.indexer_transport.to_string(),
        };
        drop(config);

        StateSnapshot {
            state_version: version,
            server_time: now.timestamp_millis(),
            status,
            exchange_series: self.exchange_series(),
            indexer_series: self.indexer_series(),
            parity: self.parity(),
            recent_errors: self.recent_errors.read().clone(),
            config: config_summary,
        }
    }
}

// =============================================================================
// Serialisable snapshot types (match the dashboard's StateSnapshot interface)
// =============================================================================

/// Full monitor state snapshot sent to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub status: StatusHeader,
    pub exchange_series: Vec<Candle>,
    pub indexer_series: Vec<Candle>,
    pub parity: ParityMetrics,
    pub recent_errors: Vec<ErrorRecord>,
    pub config: ConfigSummary,
}

/// Operational header — the dashboard's status banner.
#[derive(Debug, Clone, Serialize)]
pub struct StatusHeader {
    pub symbol: String,
    pub exchange: FeedStatusSnapshot,
    pub indexer: FeedStatusSnapshot,
    /// Trades discarded because they landed behind the tail bucket.
    pub late_trade_drops: u64,
    pub uptime_s: u64,
    pub state_version: u64,
    pub ws_sequence_number: u64,
    pub server_time: i64,
}

/// Summary of the session configuration for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub symbol: String,
    pub bucket_width_ms: i64,
    pub max_series_len: usize,
    pub indexer_transport: String,
}

// =============================================================================
// Tests
// =============================================================================
