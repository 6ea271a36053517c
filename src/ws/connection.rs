#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::Stream;
use parking_lot::{Mutex, RwLock};
use strum_macros::Display;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::codec::{self, Inbound};
use super::config::Config;
use super::error::WsError;
use super::heartbeat;
use super::socket::WebSocketConnector;
use super::subscribers::{SubscriptionId, Subscribers};
use super::supervisor::{self, Recovery};
use super::transport::{
    CloseReason, EventSink, Frame, ReadyState, Transport, TransportEvent, TransportFactory,
};
use crate::Result;
use crate::auth::{Credentials, HmacSigner, Signer};

/// Production endpoint used by [`ConnectionManager::default`].
pub const DEFAULT_HOST: &str = "wss://real.okex.com:8443/ws/v3";

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    /// Constructed, never connected
    Uninitialized,
    /// Waiting for the transport handshake
    Connecting,
    /// The transport reported open
    Open,
    /// A close was requested
    Closing,
    /// The transport is closed
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Keeps a streaming connection alive and republishes what it receives.
///
/// The manager owns one [`Transport`] at a time, built by its [`TransportFactory`]. It:
/// - Sends a keepalive token on a fixed cadence for its whole lifetime
/// - Refreshes a liveness timestamp on every open and every inbound frame
/// - Soft reconnects the same transport after one silent window and replaces it after two
///   (see [`Recovery`]), while `connect(true)` is in effect
/// - Decompresses binary frames, drops heartbeat replies, and hands everything else to the
///   [`Self::on_message`] handlers and the [`Self::messages`] broadcast
///
/// Transport failures are logged and absorbed; the liveness timer is the only recovery path.
///
/// Must be created inside a Tokio runtime since construction spawns the heartbeat task.
///
/// # Example
///
/// ```rust, no_run
/// use std::time::Duration;
///
/// use okex_ws_client::ws::{Config, ConnectionManager};
///
/// #[tokio::main]
/// async fn main() -> okex_ws_client::Result<()> {
///     let manager = ConnectionManager::new("wss://real.okex.com:8443/ws/v3", Config::default())?;
///     manager.on_message(|text: &str| println!("{text}"));
///
///     manager.connect(true).await;
///     manager
///         .send(r#"{"op":"subscribe","args":["spot/ticker:BTC-USDT"]}"#)
///         .await;
///
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     manager.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct ConnectionManager<F: TransportFactory = WebSocketConnector> {
    inner: Arc<Inner<F>>,
}

impl<F: TransportFactory> Clone for ConnectionManager<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: TransportFactory> fmt::Debug for ConnectionManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.inner.host.as_str())
            .field("state", &self.state())
            .field("auto_reconnect", &self.auto_reconnect())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, Config::default())
            .expect("Connection manager with default endpoint should succeed")
    }
}

impl ConnectionManager {
    /// Create a manager backed by `tokio-tungstenite` sockets to `host`.
    pub fn new(host: &str, config: Config) -> Result<Self> {
        let connector = WebSocketConnector::from(&config);
        Self::with_factory(host, config, connector)
    }
}

impl<F: TransportFactory> ConnectionManager<F> {
    /// Create a manager whose transports are built by `factory`.
    ///
    /// The first transport is created and attached immediately, and the heartbeat task starts.
    /// Nothing is connected until [`Self::connect`].
    pub fn with_factory(host: &str, config: Config, factory: F) -> Result<Self> {
        config.validate()?;
        let host = Url::parse(host)?;

        let transport = Arc::new(factory.create(&host));
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity);
        let (state, _) = watch::channel(ConnectionState::Uninitialized);
        let (last_received, _) = watch::channel(Instant::now());

        let inner = Arc::new(Inner {
            host,
            factory,
            transport: RwLock::new(Arc::clone(&transport)),
            generation: AtomicU64::new(0),
            dispatch_gate: RwLock::new(()),
            attached: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(false),
            last_received,
            state,
            lifecycle: tokio::sync::Mutex::new(()),
            supervisor: Mutex::new(None),
            heartbeat: CancellationToken::new(),
            on_message: Subscribers::default(),
            on_open: Subscribers::default(),
            broadcast_tx,
            config,
        });

        transport.attach(inner.event_sink(0));

        heartbeat::spawn(
            Arc::downgrade(&inner),
            inner.heartbeat.clone(),
            inner.config.heartbeat_interval,
            inner.config.heartbeat_token.clone(),
        );

        Ok(Self { inner })
    }

    /// Connect the current transport.
    ///
    /// Starts delivering inbound messages, then connects. A connect failure is logged and not
    /// returned; with `auto_reconnect` the liveness supervisor keeps retrying. Without it the
    /// supervisor is disarmed.
    pub async fn connect(&self, auto_reconnect: bool) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.connect_locked(auto_reconnect).await;
    }

    /// Disarm the liveness supervisor, stop delivering messages and close the transport.
    ///
    /// Disconnecting an already disconnected manager is a no-op. The heartbeat task keeps running
    /// and its sends no-op until the next connect.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.disconnect_locked().await;
    }

    /// Send a text frame if the transport is open; otherwise do nothing.
    ///
    /// Transport send errors are logged, never returned.
    pub async fn send(&self, text: &str) {
        self.inner.send(text).await;
    }

    /// Send the login frame produced by [`HmacSigner`].
    ///
    /// The server's answer arrives later as an ordinary message.
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        self.login_with(&HmacSigner, credentials).await
    }

    /// Send the login frame produced by `signer`. Only signing errors are returned.
    pub async fn login_with<S: Signer + ?Sized>(
        &self,
        signer: &S,
        credentials: &Credentials,
    ) -> Result<()> {
        let payload = signer.sign(credentials)?;
        self.inner.send(&payload).await;
        Ok(())
    }

    /// Run one liveness check now and apply the selected [`Recovery`].
    ///
    /// The armed supervisor does the same every `liveness_check_interval`. While the supervisor
    /// is disarmed, after `connect(false)` or [`Self::disconnect`], nothing is checked and
    /// [`Recovery::Healthy`] is returned.
    pub async fn check_liveness(&self) -> Recovery {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if !self.is_supervised() {
            return Recovery::Healthy;
        }
        self.inner.check_liveness_locked().await
    }

    /// Register a handler for inbound application messages. Handlers run synchronously, in
    /// registration order, on the transport's delivery context.
    pub fn on_message<H>(&self, handler: H) -> SubscriptionId
    where
        H: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.on_message.subscribe(handler)
    }

    /// Register a handler for transport opens, including every reconnect.
    pub fn on_open<H>(&self, handler: H) -> SubscriptionId
    where
        H: Fn() + Send + Sync + 'static,
    {
        self.inner.on_open.subscribe(move |_: &()| handler())
    }

    /// Remove a handler registered with [`Self::on_message`] or [`Self::on_open`].
    ///
    /// Returns whether a handler was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.on_message.unsubscribe(id) || self.inner.on_open.unsubscribe(id)
    }

    /// Subscribe to inbound messages through a bounded channel.
    ///
    /// Each call returns a new independent receiver, so a slow consumer lags instead of stalling
    /// delivery.
    #[must_use]
    pub fn messages(&self) -> broadcast::Receiver<String> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Stream of inbound messages. Yields [`WsError::Lagged`] when the consumer fell behind and
    /// ends when the manager is dropped.
    pub fn message_stream(&self) -> impl Stream<Item = Result<String>> + use<F> {
        let mut rx = self.messages();

        async_stream::try_stream! {
            loop {
                match rx.recv().await {
                    Ok(message) => yield message,
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Message stream lagged, missed {n} messages");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Instant of the most recent open or inbound frame.
    #[must_use]
    pub fn last_received(&self) -> Instant {
        *self.inner.last_received.borrow()
    }

    /// Whether the last [`Self::connect`] asked for automatic recovery.
    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.inner.auto_reconnect.load(Ordering::Acquire)
    }

    /// Whether the liveness supervisor is currently armed.
    #[must_use]
    pub fn is_supervised(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// The transport currently attached. Replaced on every full re-initialize.
    #[must_use]
    pub fn transport(&self) -> Arc<F::Transport> {
        self.inner.current_transport()
    }

    #[must_use]
    pub fn host(&self) -> &Url {
        &self.inner.host
    }
}

pub(crate) struct Inner<F: TransportFactory> {
    host: Url,
    config: Config,
    factory: F,
    transport: RwLock<Arc<F::Transport>>,
    /// Bumped on every replacement; events tagged with an older value are dropped
    generation: AtomicU64,
    /// Shared by event dispatch, exclusive during transport replacement
    dispatch_gate: RwLock<()>,
    /// Whether inbound messages are delivered, set by connect and cleared by disconnect
    attached: AtomicBool,
    auto_reconnect: AtomicBool,
    last_received: watch::Sender<Instant>,
    state: watch::Sender<ConnectionState>,
    /// Serializes connect, disconnect and both recovery tiers
    lifecycle: tokio::sync::Mutex<()>,
    supervisor: Mutex<Option<CancellationToken>>,
    heartbeat: CancellationToken,
    on_message: Subscribers<str>,
    on_open: Subscribers<()>,
    broadcast_tx: broadcast::Sender<String>,
}

impl<F: TransportFactory> Drop for Inner<F> {
    fn drop(&mut self) {
        self.heartbeat.cancel();
        if let Some(token) = self.supervisor.get_mut().take() {
            token.cancel();
        }
    }
}

impl<F: TransportFactory> Inner<F> {
    fn current_transport(&self) -> Arc<F::Transport> {
        Arc::clone(&self.transport.read())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Advances the liveness timestamp, never moving it backwards.
    fn touch(&self) {
        let now = Instant::now();
        self.last_received.send_if_modified(|last| {
            if now > *last {
                *last = now;
                true
            } else {
                false
            }
        });
    }

    fn event_sink(self: &Arc<Self>, generation: u64) -> EventSink {
        let inner = Arc::downgrade(self);
        EventSink::new(move |event| {
            if let Some(inner) = inner.upgrade() {
                inner.dispatch(generation, event);
            }
        })
    }

    fn dispatch(&self, generation: u64, event: TransportEvent) {
        // Recursive so a handler that triggers another event on this thread cannot deadlock
        // behind a waiting replacement
        let _gate = self.dispatch_gate.read_recursive();
        if self.generation.load(Ordering::Acquire) != generation {
            #[cfg(feature = "tracing")]
            tracing::trace!(?event, "Dropping event from replaced transport");
            return;
        }

        match event {
            TransportEvent::Opened => self.handle_open(),
            TransportEvent::Message(frame) => self.handle_message(frame),
            TransportEvent::Error { message, cause } => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = ?cause, "WebSocket error: {message}");
                #[cfg(not(feature = "tracing"))]
                let _ = (&message, &cause);
            }
            TransportEvent::Closed => {
                #[cfg(feature = "tracing")]
                tracing::debug!(host = %self.host, "WebSocket closed");
                self.set_state(ConnectionState::Closed);
            }
        }
    }

    fn handle_open(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(host = %self.host, "WebSocket opened");
        self.touch();
        self.set_state(ConnectionState::Open);
        self.on_open.notify(&());
    }

    fn handle_message(&self, frame: Frame) {
        if !self.attached.load(Ordering::Acquire) {
            return;
        }
        self.touch();

        match codec::decode(frame, &self.config.heartbeat_reply) {
            Inbound::Payload(text) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, "Received WebSocket message");
                self.on_message.notify(&text);
                _ = self.broadcast_tx.send(text);
            }
            Inbound::HeartbeatReply => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Received heartbeat reply");
            }
            // Already logged by the decoder
            Inbound::Undecodable => {}
        }
    }

    pub(crate) async fn send(&self, text: &str) {
        let transport = self.current_transport();
        if transport.ready_state() != ReadyState::Open {
            #[cfg(feature = "tracing")]
            tracing::trace!(state = %transport.ready_state(), "Skipping send on a transport that is not open");
            return;
        }

        if let Err(e) = transport.send(text).await {
            #[cfg(feature = "tracing")]
            tracing::error!("Unable to send WebSocket message: {e:?}");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    async fn connect_locked(self: &Arc<Self>, auto_reconnect: bool) {
        self.attached.store(true, Ordering::Release);
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.current_transport().connect().await {
            #[cfg(feature = "tracing")]
            tracing::error!(host = %self.host, "Unable to connect: {e:?}");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
            self.set_state(ConnectionState::Closed);
        }

        self.auto_reconnect.store(auto_reconnect, Ordering::Release);
        if auto_reconnect {
            self.arm_supervisor();
        } else {
            self.disarm_supervisor();
        }
    }

    async fn disconnect_locked(&self) {
        self.disarm_supervisor();
        if !self.attached.swap(false, Ordering::AcqRel) {
            return;
        }

        self.set_state(ConnectionState::Closing);
        if let Err(e) = self.current_transport().close(CloseReason::Normal).await {
            #[cfg(feature = "tracing")]
            tracing::error!("Unable to close WebSocket: {e:?}");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
        self.set_state(ConnectionState::Closed);
    }

    /// Entry point of the armed supervisor's tick.
    pub(crate) async fn supervise(self: &Arc<Self>, token: &CancellationToken) {
        let _lifecycle = self.lifecycle.lock().await;
        // Disconnect may have won the race for the lock
        if token.is_cancelled() {
            return;
        }
        self.check_liveness_locked().await;
    }

    async fn check_liveness_locked(self: &Arc<Self>) -> Recovery {
        let elapsed = self.last_received.borrow().elapsed();
        let recovery = Recovery::assess(elapsed, &self.config);

        match recovery {
            Recovery::Healthy => {}
            Recovery::Reconnect => self.reconnect_locked(elapsed).await,
            Recovery::Reinitialize => self.reinitialize_locked(elapsed).await,
        }

        recovery
    }

    async fn reconnect_locked(&self, silent_for: std::time::Duration) {
        #[cfg(feature = "tracing")]
        tracing::info!(?silent_for, host = %self.host, "WebSocket reconnecting...");
        #[cfg(not(feature = "tracing"))]
        let _ = &silent_for;

        let transport = self.current_transport();

        self.set_state(ConnectionState::Closing);
        if let Err(e) = transport.close(CloseReason::Reconnect).await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Unable to close WebSocket before reconnecting: {e:?}");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }

        self.set_state(ConnectionState::Connecting);
        if let Err(e) = transport.connect().await {
            #[cfg(feature = "tracing")]
            tracing::error!(host = %self.host, "Unable to reconnect: {e:?}");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
            self.set_state(ConnectionState::Closed);
        }
    }

    async fn reinitialize_locked(self: &Arc<Self>, silent_for: std::time::Duration) {
        #[cfg(feature = "tracing")]
        tracing::info!(?silent_for, host = %self.host, "WebSocket re-initialize...");
        #[cfg(not(feature = "tracing"))]
        let _ = &silent_for;

        let auto_reconnect = self.auto_reconnect.load(Ordering::Acquire);

        self.disconnect_locked().await;
        self.replace_transport();
        self.connect_locked(auto_reconnect).await;
    }

    /// Swaps in a fresh transport once every in-flight callback of the old one has returned.
    fn replace_transport(self: &Arc<Self>) {
        let _gate = self.dispatch_gate.write();
        let generation = self
            .generation
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);

        let mut slot = self.transport.write();
        slot.detach();

        let fresh = Arc::new(self.factory.create(&self.host));
        fresh.attach(self.event_sink(generation));
        *slot = fresh;

        self.touch();
    }

    fn arm_supervisor(self: &Arc<Self>) {
        let mut slot = self.supervisor.lock();
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }

        let token = CancellationToken::new();
        supervisor::spawn(
            Arc::downgrade(self),
            token.clone(),
            self.config.liveness_check_interval,
        );
        *slot = Some(token);
    }

    fn disarm_supervisor(&self) {
        if let Some(token) = self.supervisor.lock().take() {
            token.cancel();
        }
    }
}
