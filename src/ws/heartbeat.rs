//! Application-level keepalive sender.

use std::sync::Weak;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::Inner;
use super::transport::TransportFactory;

/// Sends `token` every `period` through the manager's `send`, which no-ops while the transport is
/// not open. Runs for the lifetime of the manager rather than of a single connection.
pub(crate) fn spawn<F: TransportFactory>(
    inner: Weak<Inner<F>>,
    cancel: CancellationToken,
    period: Duration,
    token: String,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Heartbeat cancellation requested, terminating...");
                    break;
                },
                () = time::sleep(period) => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    inner.send(&token).await;
                }
            }
        }
    });
}
