// =============================================================================
// Runtime Configuration — session settings with atomic save
// =============================================================================
//
// Central configuration for the parity monitor. Bucket width and series
// retention are fixed for a session: the aggregation engine is constructed
// from them once at startup and they are never mutated mid-stream.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::series::{DEFAULT_BUCKET_WIDTH_MS, DEFAULT_MAX_SERIES_LEN};
use crate::types::IndexerTransport;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_bucket_width_ms() -> i64 {
    DEFAULT_BUCKET_WIDTH_MS
}

fn default_max_series_len() -> usize {
    DEFAULT_MAX_SERIES_LEN
}

fn default_exchange_ws_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_indexer_ws_url() -> String {
    "wss://indexer.example.com/graphql".to_string()
}

fn default_indexer_http_url() -> String {
    "https://indexer.example.com/graphql".to_string()
}

fn default_indexer_poll_ms() -> u64 {
    5_000
}

fn default_push_interval_ms() -> u64 {
    500
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the parity monitor.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Asset & bucketing ---------------------------------------------------

    /// The single symbol both feeds are subscribed to.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Candle bucket width in milliseconds. Fixed for a session.
    #[serde(default = "default_bucket_width_ms")]
    pub bucket_width_ms: i64,

    /// Maximum candles retained per series; oldest are evicted first.
    #[serde(default = "default_max_series_len")]
    pub max_series_len: usize,

    // --- Feed endpoints ------------------------------------------------------

    /// Base URL of the exchange WebSocket endpoint.
    #[serde(default = "default_exchange_ws_url")]
    pub exchange_ws_url: String,

    /// WebSocket endpoint of the indexing service (graphql-transport-ws).
    #[serde(default = "default_indexer_ws_url")]
    pub indexer_ws_url: String,

    /// HTTP endpoint of the indexing service, used in poll mode.
    #[serde(default = "default_indexer_http_url")]
    pub indexer_http_url: String,

    /// Whether the indexer feed streams over WebSocket or polls over HTTP.
    #[serde(default)]
    pub indexer_transport: IndexerTransport,

    /// Poll interval for the HTTP transport, in milliseconds.
    #[serde(default = "default_indexer_poll_ms")]
    pub indexer_poll_ms: u64,

    // --- Dashboard -----------------------------------------------------------

    /// How often the WebSocket push loop checks the state version.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            bucket_width_ms: default_bucket_width_ms(),
            max_series_len: default_max_series_len(),
            exchange_ws_url: default_exchange_ws_url(),
            indexer_ws_url: default_indexer_ws_url(),
            indexer_http_url: default_indexer_http_url(),
            indexer_transport: IndexerTransport::Subscribe,
            indexer_poll_ms: default_indexer_poll_ms(),
            push_interval_ms: default_push_interval_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            bucket_width_ms = config.bucket_width_ms,
            indexer_transport = %config.indexer_transport,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.bucket_width_ms, 60_000);
        assert_eq!(cfg.max_series_len, 100);
        assert_eq!(cfg.indexer_transport, IndexerTransport::Subscribe);
        assert_eq!(cfg.indexer_poll_ms, 5_000);
        assert_eq!(cfg.push_interval_ms, 500);
        assert!(cfg.exchange_ws_url.starts_with("wss://"));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.bucket_width_ms, 60_000);
        assert_eq!(cfg.max_series_len, 100);
        assert_eq!(cfg.indexer_transport, IndexerTransport::Subscribe);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbol": "ETHUSDT", "indexer_transport": "poll" }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol, "ETHUSDT");
        assert_eq!(cfg.indexer_transport, IndexerTransport::Poll);
        assert_eq!(cfg.bucket_width_ms, 60_000);
        assert_eq!(cfg.indexer_poll_ms, 5_000);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbol, cfg2.symbol);
        assert_eq!(cfg.bucket_width_ms, cfg2.bucket_width_ms);
        assert_eq!(cfg.max_series_len, cfg2.max_series_len);
        assert_eq!(cfg.indexer_transport, cfg2.indexer_transport);
    }
}
