//! Liveness supervision: decides between doing nothing, a soft reconnect, or a full
//! re-initialize based on how long the connection has been silent.

use std::sync::Weak;
use std::time::Duration;

use strum_macros::Display;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::connection::Inner;
use super::transport::TransportFactory;

/// Recovery tier selected by one liveness check.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Recovery {
    /// Data arrived recently enough
    Healthy,
    /// Close and reopen the same transport instance
    Reconnect,
    /// Replace the transport instance and connect the new one
    Reinitialize,
}

impl Recovery {
    /// Maps the silence since the last received frame onto a recovery tier.
    ///
    /// Both thresholds are exclusive: exactly `reconnect_after` of silence is still healthy and
    /// exactly `reinitialize_after` is still a soft reconnect.
    #[must_use]
    pub fn assess(elapsed: Duration, config: &Config) -> Self {
        if elapsed > config.reinitialize_after {
            Self::Reinitialize
        } else if elapsed > config.reconnect_after {
            Self::Reconnect
        } else {
            Self::Healthy
        }
    }
}

/// Ticks every `period` until `token` is cancelled or the manager is dropped.
pub(crate) fn spawn<F: TransportFactory>(
    inner: Weak<Inner<F>>,
    token: CancellationToken,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Liveness supervisor disarmed");
                    break;
                },
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    inner.supervise(&token).await;
                }
            }
        }
    });
}
