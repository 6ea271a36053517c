#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

use crate::Result;
use crate::error::Error;

const DEFAULT_LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_AFTER: Duration = Duration::from_secs(60);
const DEFAULT_REINITIALIZE_AFTER: Duration = Duration::from_secs(120);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_HEARTBEAT_TOKEN: &str = "ping";
const DEFAULT_HEARTBEAT_REPLY: &str = "pong";
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the [`super::ConnectionManager`].
///
/// The defaults match the production feed: silence for more than a minute triggers a soft
/// reconnect of the same socket, silence for more than two minutes replaces the socket.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// How often the liveness supervisor inspects the time since the last received frame
    #[builder(default = DEFAULT_LIVENESS_CHECK_INTERVAL)]
    pub liveness_check_interval: Duration,
    /// Silence after which the same transport is closed and reconnected
    #[builder(default = DEFAULT_RECONNECT_AFTER)]
    pub reconnect_after: Duration,
    /// Silence after which the transport is torn down and rebuilt
    #[builder(default = DEFAULT_REINITIALIZE_AFTER)]
    pub reinitialize_after: Duration,
    /// Sleep between two keepalive frames
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL)]
    pub heartbeat_interval: Duration,
    /// Keepalive payload sent by the heartbeat sender
    #[builder(into, default = DEFAULT_HEARTBEAT_TOKEN.to_owned())]
    pub heartbeat_token: String,
    /// Payload the server answers keepalives with; never delivered to subscribers
    #[builder(into, default = DEFAULT_HEARTBEAT_REPLY.to_owned())]
    pub heartbeat_reply: String,
    /// Capacity of the broadcast channel behind [`super::ConnectionManager::messages`]
    #[builder(default = DEFAULT_BROADCAST_CAPACITY)]
    pub broadcast_capacity: usize,
    /// Upper bound on the WebSocket handshake
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: Duration,
    /// Upper bound on writing one frame, including the close frame. A peer that stops reading
    /// past this bound gets its socket torn down.
    #[builder(default = DEFAULT_SEND_TIMEOUT)]
    pub send_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

impl Config {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.liveness_check_interval.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(Error::validation(
                "liveness check and heartbeat intervals must be non-zero",
            ));
        }

        if self.reconnect_after >= self.reinitialize_after {
            return Err(Error::validation(format!(
                "reconnect threshold {:?} must be below re-initialize threshold {:?}",
                self.reconnect_after, self.reinitialize_after
            )));
        }

        if self.heartbeat_token == self.heartbeat_reply {
            return Err(Error::validation(
                "heartbeat token and heartbeat reply must differ",
            ));
        }

        if self.connect_timeout.is_zero() || self.send_timeout.is_zero() {
            return Err(Error::validation("connect and send timeouts must be non-zero"));
        }

        if self.broadcast_capacity == 0 {
            return Err(Error::validation("broadcast capacity must be non-zero"));
        }

        Ok(())
    }
}
