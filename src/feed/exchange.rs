// =============================================================================
// Exchange Trade Feed — source A of the parity comparison
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::feed::decode::decode_trade;
use crate::types::FeedSource;

/// Connect to the exchange aggTrade WebSocket stream for the configured
/// symbol and fold every decoded trade into the source-A series.
///
/// Runs until the stream disconnects or an error occurs, then returns so that
/// the caller (main.rs) can handle reconnection.
pub async fn run_exchange_stream(
    ws_base: &str,
    symbol: &str,
    state: &Arc<AppState>,
) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("{ws_base}/{lower}@aggTrade");
    info!(url = %url, symbol = %symbol, "connecting to exchange trade WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to exchange trade WebSocket")?;

    info!(symbol = %symbol, "exchange trade WebSocket connected");
    state.mark_feed_connected(FeedSource::Exchange, true);

    let (_write, mut read) = ws_stream.split();

    let result = loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    state.record_feed_message(FeedSource::Exchange);
                    match decode_trade(&text) {
                        Ok(trade) => state.apply_trade(&trade),
                        Err(e) => {
                            warn!(error = %e, "rejected malformed aggTrade frame");
                            state.record_decode_error(FeedSource::Exchange, &e);
                        }
                    }
                }
                // Silently ignore Ping / Pong / Binary / Close frames --
                // tungstenite handles pong replies automatically.
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "exchange WebSocket read error");
                break Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "exchange WebSocket stream ended");
                break Ok(());
            }
        }
    };

    state.mark_feed_connected(FeedSource::Exchange, false);
    result
}
