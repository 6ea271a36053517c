//! Contract between the [`super::ConnectionManager`] and the socket underneath it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use strum_macros::Display;
use url::Url;

use crate::Result;
use crate::error::Error;

/// Ready state reported by a [`Transport`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Why a [`Transport`] is being closed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CloseReason {
    /// The caller asked to disconnect
    Normal,
    /// The liveness supervisor is cycling the connection
    Reconnect,
}

/// A single inbound WebSocket data frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Raw deflate compressed payload
    Binary(Vec<u8>),
}

/// Notifications a [`Transport`] pushes to its attached [`EventSink`].
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    /// The handshake completed and the socket is open
    Opened,
    /// A data frame arrived
    Message(Frame),
    /// The socket reported a runtime failure
    Error {
        message: String,
        cause: Option<Error>,
    },
    /// The socket closed, either remotely or after an error
    Closed,
}

/// Callback handle through which a [`Transport`] delivers its events.
///
/// Cloning is cheap; every clone feeds the same receiver.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(TransportEvent) + Send + Sync>);

impl EventSink {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(TransportEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    /// Delivers `event` synchronously on the calling thread.
    pub fn emit(&self, event: TransportEvent) {
        (self.0)(event);
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// A persistent text/binary socket.
///
/// Implementations deliver events only to the sink passed to the most recent [`Transport::attach`],
/// and to none after [`Transport::detach`]. `connect` after `close` must reopen the same instance.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Starts delivering events to `sink`, replacing any previous sink.
    fn attach(&self, sink: EventSink);

    /// Stops delivering events.
    fn detach(&self);

    /// Opens the socket, emitting [`TransportEvent::Opened`] once the handshake completes.
    async fn connect(&self) -> Result<()>;

    /// Closes the socket. Closing an already closed transport is a no-op.
    async fn close(&self, reason: CloseReason) -> Result<()>;

    /// Sends a text frame.
    async fn send(&self, text: &str) -> Result<()>;

    fn ready_state(&self) -> ReadyState;
}

/// Builds fresh [`Transport`] instances bound to a host, used on construction and on every full
/// re-initialize.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: Transport;

    fn create(&self, host: &Url) -> Self::Transport;
}

impl<T, F> TransportFactory for F
where
    T: Transport,
    F: Fn(&Url) -> T + Send + Sync + 'static,
{
    type Transport = T;

    fn create(&self, host: &Url) -> T {
        self(host)
    }
}
