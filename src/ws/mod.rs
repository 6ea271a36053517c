//! Self-healing WebSocket connection management.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: owns the transport, supervises liveness and republishes messages
//! - [`Transport`] / [`TransportFactory`]: the socket underneath, swappable for tests or other
//!   clients; [`WebSocketConnector`] is the `tokio-tungstenite` implementation
//! - [`Recovery`]: the two escalation tiers applied when the feed goes silent
//! - [`codec`]: raw deflate decompression and heartbeat-reply filtering
//!
//! # Example
//!
//! ```ignore
//! let manager = ConnectionManager::new(DEFAULT_HOST, Config::default())?;
//! manager.on_message(|text: &str| println!("{text}"));
//! manager.connect(true).await;
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
mod heartbeat;
pub mod socket;
mod subscribers;
pub mod supervisor;
pub mod transport;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState, DEFAULT_HOST};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use socket::{WebSocketConnector, WebSocketTransport};
pub use subscribers::SubscriptionId;
pub use supervisor::Recovery;
pub use transport::{
    CloseReason, EventSink, Frame, ReadyState, Transport, TransportEvent, TransportFactory,
};
