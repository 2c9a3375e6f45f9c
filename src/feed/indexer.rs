// =============================================================================
// Indexer Candle Feed — source B of the parity comparison
// =============================================================================
//
// The indexing service exposes its candles through GraphQL. Two transports
// are supported:
//   - a streaming subscription over WebSocket (graphql-transport-ws framing:
//     connection_init / connection_ack / subscribe / next);
//   - repeated queries over HTTP for deployments without a WS endpoint.
// Either way each delivery is a batch of candle records that goes through the
// strict decoder and then the merge rule, so redelivery after a reconnect or
// an overlapping poll window cannot corrupt the series.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::feed::decode::{decode_candle_batch, DecodeError};
use crate::types::FeedSource;

/// GraphQL document for the streaming subscription.
const CANDLES_SUBSCRIPTION: &str = "subscription Candles($symbol: String!, $bucketMs: Int!) { \
     candles(symbol: $symbol, bucketMs: $bucketMs) { bucketStart open high low close volume } }";

/// GraphQL document for the polling query. `limit` bounds the window the
/// indexer returns; anything past the local retention would be evicted
/// immediately anyway.
const CANDLES_QUERY: &str = "query Candles($symbol: String!, $bucketMs: Int!, $limit: Int!) { \
     candles(symbol: $symbol, bucketMs: $bucketMs, limit: $limit) { bucketStart open high low close volume } }";

// ---------------------------------------------------------------------------
// Protocol frames
// ---------------------------------------------------------------------------

fn init_message() -> String {
    json!({ "type": "connection_init" }).to_string()
}

fn subscribe_message(symbol: &str, bucket_ms: i64) -> String {
    json!({
        "id": "1",
        "type": "subscribe",
        "payload": {
            "query": CANDLES_SUBSCRIPTION,
            "variables": { "symbol": symbol, "bucketMs": bucket_ms },
        }
    })
    .to_string()
}

fn pong_message() -> String {
    json!({ "type": "pong" }).to_string()
}

fn poll_body(symbol: &str, bucket_ms: i64, limit: usize) -> Value {
    json!({
        "query": CANDLES_QUERY,
        "variables": { "symbol": symbol, "bucketMs": bucket_ms, "limit": limit },
    })
}

/// Pull the candle array out of a GraphQL `data` payload.
///
/// A single-object `candles` field is tolerated and treated as a batch of one.
fn extract_candle_values(data: &Value) -> Result<Vec<Value>, DecodeError> {
    match &data["candles"] {
        Value::Array(values) => Ok(values.clone()),
        Value::Object(_) => Ok(vec![data["candles"].clone()]),
        Value::Null => Err(DecodeError::Shape("payload has no candles field")),
        _ => Err(DecodeError::Shape("candles field is not an array")),
    }
}

// ---------------------------------------------------------------------------
// Batch handling shared by both transports
// ---------------------------------------------------------------------------

/// Decode and merge one delivered batch, surfacing per-record rejections.
fn merge_batch(values: &[Value], state: &Arc<AppState>) {
    let bucket_ms = state.runtime_config.read().bucket_width_ms;
    let (candles, record_errors) = decode_candle_batch(values, bucket_ms);

    for e in &record_errors {
        warn!(error = %e, "rejected malformed indexer candle record");
        state.record_decode_error(FeedSource::Indexer, e);
    }

    let outcome = state.apply_candle_batch(&candles);
    debug!(
        delivered = values.len(),
        inserted = outcome.inserted,
        replaced = outcome.replaced,
        rejected = record_errors.len(),
        "indexer candle batch merged"
    );
}

// ---------------------------------------------------------------------------
// WebSocket subscription transport
// ---------------------------------------------------------------------------

/// Run the streaming candle subscription.
///
/// Runs until the stream disconnects or an error occurs, then returns so that
/// the caller (main.rs) can handle reconnection.
pub async fn run_indexer_subscription(
    url: &str,
    symbol: &str,
    state: &Arc<AppState>,
) -> Result<()> {
    let bucket_ms = state.runtime_config.read().bucket_width_ms;

    info!(url = %url, symbol = %symbol, "connecting to indexer GraphQL WebSocket");
    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to indexer WebSocket")?;

    let (mut write, mut read) = ws_stream.split();

    // graphql-transport-ws handshake: init, wait for ack, then subscribe.
    write
        .send(Message::Text(init_message()))
        .await
        .context("failed to send connection_init")?;

    loop {
        let msg = read
            .next()
            .await
            .ok_or_else(|| anyhow!("indexer stream ended before connection_ack"))?
            .context("indexer WebSocket error during handshake")?;

        let Message::Text(text) = msg else { continue };
        let frame: Value = serde_json::from_str(&text)
            .context("indexer handshake frame is not valid JSON")?;

        match frame["type"].as_str() {
            Some("connection_ack") => break,
            Some("ping") => {
                write
                    .send(Message::Text(pong_message()))
                    .await
                    .context("failed to answer handshake ping")?;
            }
            other => {
                debug!(frame_type = ?other, "ignoring pre-ack indexer frame");
            }
        }
    }

    write
        .send(Message::Text(subscribe_message(symbol, bucket_ms)))
        .await
        .context("failed to send candles subscription")?;

    info!(symbol = %symbol, bucket_ms, "indexer candle subscription established");
    state.mark_feed_connected(FeedSource::Indexer, true);

    let result = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                state.record_feed_message(FeedSource::Indexer);

                let frame: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        let decode_error = DecodeError::from(e);
                        warn!(error = %decode_error, "indexer frame is not valid JSON");
                        state.record_decode_error(FeedSource::Indexer, &decode_error);
                        continue;
                    }
                };

                match frame["type"].as_str() {
                    Some("next") => match extract_candle_values(&frame["payload"]["data"]) {
                        Ok(values) => merge_batch(&values, state),
                        Err(e) => {
                            warn!(error = %e, "indexer next frame had no usable payload");
                            state.record_decode_error(FeedSource::Indexer, &e);
                        }
                    },
                    Some("ping") => {
                        if let Err(e) = write.send(Message::Text(pong_message())).await {
                            error!(error = %e, "failed to answer indexer ping");
                            break Err(e.into());
                        }
                    }
                    Some("complete") => {
                        info!("indexer subscription completed by server");
                        break Ok(());
                    }
                    Some("error") => {
                        let detail = frame["payload"].to_string();
                        state.push_error(
                            FeedSource::Indexer,
                            format!("subscription error: {detail}"),
                        );
                        break Err(anyhow!("indexer subscription error: {detail}"));
                    }
                    // connection-level keepalives and anything unknown.
                    _ => {}
                }
            }
            Some(Ok(Message::Close(_))) => {
                warn!("indexer WebSocket closed by server");
                break Ok(());
            }
            Some(Ok(_)) => {
                // Ignore Ping / Pong / Binary frames.
            }
            Some(Err(e)) => {
                error!(error = %e, "indexer WebSocket read error");
                break Err(e.into());
            }
            None => {
                warn!("indexer WebSocket stream ended");
                break Ok(());
            }
        }
    };

    state.mark_feed_connected(FeedSource::Indexer, false);
    result
}

// ---------------------------------------------------------------------------
// HTTP polling transport
// ---------------------------------------------------------------------------

/// Poll the indexer's GraphQL HTTP endpoint on a fixed interval.
///
/// Runs forever; individual poll failures are surfaced as diagnostics and the
/// next tick retries. The merge rule makes the overlap between consecutive
/// poll windows harmless.
pub async fn run_indexer_poller(url: &str, symbol: &str, poll_ms: u64, state: &Arc<AppState>) {
    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(Duration::from_millis(poll_ms.max(250)));

    info!(url = %url, symbol = %symbol, poll_ms, "indexer HTTP polling started");

    loop {
        interval.tick().await;

        let (bucket_ms, limit) = {
            let config = state.runtime_config.read();
            (config.bucket_width_ms, config.max_series_len)
        };

        match poll_once(&client, url, symbol, bucket_ms, limit).await {
            Ok(values) => {
                state.mark_feed_connected(FeedSource::Indexer, true);
                state.record_feed_message(FeedSource::Indexer);
                merge_batch(&values, state);
            }
            Err(e) => {
                warn!(error = %e, "indexer poll failed");
                state.mark_feed_connected(FeedSource::Indexer, false);
                state.push_error(FeedSource::Indexer, format!("poll failed: {e}"));
            }
        }
    }
}

async fn poll_once(
    client: &reqwest::Client,
    url: &str,
    symbol: &str,
    bucket_ms: i64,
    limit: usize,
) -> Result<Vec<Value>> {
    let response = client
        .post(url)
        .json(&poll_body(symbol, bucket_ms, limit))
        .send()
        .await
        .context("indexer HTTP request failed")?
        .error_for_status()
        .context("indexer HTTP request rejected")?;

    let body: Value = response
        .json()
        .await
        .context("indexer HTTP response is not valid JSON")?;

    if let Some(errors) = body.get("errors") {
        return Err(anyhow!("indexer query returned errors: {errors}"));
    }

    extract_candle_values(&body["data"]).map_err(|e| anyhow!("{e}"))
}

// =============================================================================
// Tests
// =============================================================================
