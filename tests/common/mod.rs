#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary only uses part of the shared helpers"
)]

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use okex_ws_client::Result;
use okex_ws_client::ws::{
    CloseReason, Config, ConnectionManager, EventSink, Frame, ReadyState, Transport,
    TransportEvent, TransportFactory, WsError,
};
use parking_lot::Mutex;
use url::Url;

pub const HOST: &str = "wss://feed.example.test:8443/ws/v3";

/// Production thresholds, with the heartbeat pushed out of the way.
#[must_use]
pub fn config() -> Config {
    Config::builder()
        .heartbeat_interval(Duration::from_secs(3_600))
        .build()
}

#[must_use]
pub fn deflate(text: &str) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// In-memory transport recording every call the manager makes.
pub struct MockTransport {
    pub sink: Mutex<Option<EventSink>>,
    state: Mutex<ReadyState>,
    /// Whether `connect` emits [`TransportEvent::Opened`], which refreshes liveness
    open_on_connect: bool,
    pub fail_connect: AtomicBool,
    pub fail_send: AtomicBool,
    pub connects: AtomicUsize,
    pub closes: Mutex<Vec<CloseReason>>,
    pub sent: Mutex<Vec<String>>,
}

impl MockTransport {
    #[must_use]
    pub fn new(open_on_connect: bool) -> Self {
        Self {
            sink: Mutex::new(None),
            state: Mutex::new(ReadyState::Closed),
            open_on_connect,
            fail_connect: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            closes: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    pub fn receive_text(&self, text: &str) {
        self.emit(TransportEvent::Message(Frame::Text(text.to_owned())));
    }

    pub fn receive_binary(&self, text: &str) {
        self.emit(TransportEvent::Message(Frame::Binary(deflate(text))));
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> Vec<CloseReason> {
        self.closes.lock().clone()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn attach(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn detach(&self) {
        self.sink.lock().take();
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(WsError::Timeout.into());
        }

        *self.state.lock() = ReadyState::Open;
        if self.open_on_connect {
            self.emit(TransportEvent::Opened);
        }
        Ok(())
    }

    async fn close(&self, reason: CloseReason) -> Result<()> {
        self.closes.lock().push(reason);
        *self.state.lock() = ReadyState::Closed;
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(WsError::NotOpen.into());
        }
        self.sent.lock().push(text.to_owned());
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }
}

/// Counts how many transports the manager has built.
#[derive(Clone, Default)]
pub struct MockFactory {
    pub created: Arc<AtomicUsize>,
    /// Passed to every [`MockTransport`]
    pub silent: bool,
}

impl MockFactory {
    /// Transports whose connects never emit an open event, freezing liveness.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    fn create(&self, _host: &Url) -> MockTransport {
        self.created.fetch_add(1, Ordering::SeqCst);
        MockTransport::new(!self.silent)
    }
}

pub type TestManager = ConnectionManager<MockFactory>;

#[must_use]
pub fn manager(factory: &MockFactory) -> TestManager {
    ConnectionManager::with_factory(HOST, config(), factory.clone()).unwrap()
}

/// Manager whose supervisor is armed by `connect(true)` but never ticks on its own, so tests
/// drive recovery through `check_liveness`.
#[must_use]
pub fn manual(factory: &MockFactory) -> TestManager {
    let config = Config::builder()
        .liveness_check_interval(Duration::from_secs(3_600))
        .heartbeat_interval(Duration::from_secs(3_600))
        .build();
    ConnectionManager::with_factory(HOST, config, factory.clone()).unwrap()
}

/// Records every message delivered to an `on_message` handler.
#[must_use]
pub fn record(manager: &TestManager) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.on_message(move |text: &str| sink.lock().push(text.to_owned()));
    seen
}

/// Lets spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
