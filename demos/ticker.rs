//! Streams spot tickers and keeps the feed alive.
//!
//! This demo:
//! 1. Connects with automatic recovery enabled
//! 2. Subscribes to BTC-USDT and ETH-USDT tickers on every open, so reconnects resubscribe
//! 3. Logs every message for a minute, including the login response when credentials are set
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example ticker --features tracing
//! ```
//!
//! Set `OKEX_API_KEY`, `OKEX_SECRET` and `OKEX_PASSPHRASE` to log in as well.

use std::time::Duration;

use futures::StreamExt as _;
use okex_ws_client::auth::Credentials;
use okex_ws_client::ws::{Config, ConnectionManager, DEFAULT_HOST};
use tokio::time::timeout;
use tracing::{info, warn};

const SUBSCRIBE: &str = r#"{"op":"subscribe","args":["spot/ticker:BTC-USDT","spot/ticker:ETH-USDT"]}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let manager = ConnectionManager::new(DEFAULT_HOST, Config::default())?;

    let subscriber = manager.clone();
    let mut state = manager.state_receiver();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            info!(state = %current, "Connection state changed");
            if current.is_open() {
                subscriber.send(SUBSCRIBE).await;
            }
        }
    });

    let mut stream = Box::pin(manager.message_stream());
    manager.connect(true).await;

    if let (Ok(key), Ok(secret), Ok(passphrase)) = (
        std::env::var("OKEX_API_KEY"),
        std::env::var("OKEX_SECRET"),
        std::env::var("OKEX_PASSPHRASE"),
    ) {
        manager
            .login(&Credentials::new(key, secret, passphrase))
            .await?;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    while let Ok(Some(message)) = timeout(
        deadline.saturating_duration_since(tokio::time::Instant::now()),
        stream.next(),
    )
    .await
    {
        match message {
            Ok(text) => info!(%text, "Received"),
            Err(e) => warn!("Stream error: {e}"),
        }
    }

    manager.disconnect().await;
    Ok(())
}
