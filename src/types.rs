// =============================================================================
// Shared types used across the parity monitor
// =============================================================================

use serde::{Deserialize, Serialize};

/// Taker direction of a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// A single execution report from the exchange tape. Immutable once decoded;
/// consumed to update exactly one candle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    /// Epoch-millisecond execution time.
    pub timestamp: i64,
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
    /// Opaque exchange identifier, carried for display only.
    pub trade_id: u64,
}

/// Which of the two upstream feeds an event or diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedSource {
    Exchange,
    Indexer,
}

impl std::fmt::Display for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exchange => write!(f, "exchange"),
            Self::Indexer => write!(f, "indexer"),
        }
    }
}

/// How the indexer feed is consumed: a streaming GraphQL subscription over
/// WebSocket, or repeated GraphQL queries over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerTransport {
    Subscribe,
    Poll,
}

impl Default for IndexerTransport {
    fn default() -> Self {
        Self::Subscribe
    }
}

impl std::fmt::Display for IndexerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe => write!(f, "subscribe"),
            Self::Poll => write!(f, "poll"),
        }
    }
}
