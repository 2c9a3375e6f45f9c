// =============================================================================
// Parity Watch — Main Entry Point
// =============================================================================
//
// Subscribes to the exchange trade tape and the indexer candle feed for one
// symbol, keeps a bounded candle series per source, and serves the live
// comparison to the browser dashboard over REST + WebSocket.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod engine;
mod feed;
mod runtime_config;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;
use crate::types::IndexerTransport;

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Parity Watch — Starting Up                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override symbol from env if available.
    if let Ok(symbol) = std::env::var("PARITY_SYMBOL") {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() {
            config.symbol = symbol;
        }
    }

    info!(
        symbol = %config.symbol,
        bucket_width_ms = config.bucket_width_ms,
        max_series_len = config.max_series_len,
        indexer_transport = %config.indexer_transport,
        "session configuration"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Spawn the exchange trade feed (source A) ──────────────────────
    {
        let feed_state = state.clone();
        tokio::spawn(async move {
            loop {
                let (ws_base, symbol) = {
                    let config = feed_state.runtime_config.read();
                    (config.exchange_ws_url.clone(), config.symbol.clone())
                };
                if let Err(e) =
                    feed::exchange::run_exchange_stream(&ws_base, &symbol, &feed_state).await
                {
                    error!(symbol = %symbol, error = %e, "exchange stream error — reconnecting in 5s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });
    }

    // ── 4. Spawn the indexer candle feed (source B) ──────────────────────
    {
        let feed_state = state.clone();
        let transport = feed_state.runtime_config.read().indexer_transport;
        match transport {
            IndexerTransport::Subscribe => {
                tokio::spawn(async move {
                    loop {
                        let (url, symbol) = {
                            let config = feed_state.runtime_config.read();
                            (config.indexer_ws_url.clone(), config.symbol.clone())
                        };
                        if let Err(e) =
                            feed::indexer::run_indexer_subscription(&url, &symbol, &feed_state)
                                .await
                        {
                            error!(symbol = %symbol, error = %e, "indexer subscription error — reconnecting in 5s");
                        }
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                });
            }
            IndexerTransport::Poll => {
                tokio::spawn(async move {
                    let (url, symbol, poll_ms) = {
                        let config = feed_state.runtime_config.read();
                        (
                            config.indexer_http_url.clone(),
                            config.symbol.clone(),
                            config.indexer_poll_ms,
                        )
                    };
                    feed::indexer::run_indexer_poller(&url, &symbol, poll_ms, &feed_state).await;
                });
            }
        }
    }

    info!("market data feeds launched");

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = std::env::var("PARITY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("all subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("Parity Watch shut down complete.");
    Ok(())
}
