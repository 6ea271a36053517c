//! [`Transport`] over `tokio-tungstenite`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::transport::{
    CloseReason, EventSink, Frame, ReadyState, Transport, TransportEvent, TransportFactory,
};
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds a [`WebSocketTransport`] per host. This is the factory behind
/// [`super::ConnectionManager::new`], which takes its timeouts from the manager's [`Config`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConnector {
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for WebSocketConnector {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            send_timeout: config.send_timeout,
        }
    }
}

impl TransportFactory for WebSocketConnector {
    type Transport = WebSocketTransport;

    fn create(&self, host: &Url) -> WebSocketTransport {
        WebSocketTransport::new(host.clone(), self.connect_timeout, self.send_timeout)
    }
}

/// Shared between the transport and its reader task.
#[derive(Default)]
struct Shared {
    state: Mutex<Option<ReadyState>>,
    sink: Mutex<Option<EventSink>>,
}

impl Shared {
    fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap_or(ReadyState::Closed)
    }

    fn set_state(&self, state: ReadyState) {
        *self.state.lock() = Some(state);
    }

    fn emit(&self, event: TransportEvent) {
        // Clone out of the lock so the handler may call back into attach or detach
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }
}

/// A reconnectable WebSocket. Inbound frames are read on a spawned task and pushed to the
/// attached [`EventSink`]; ping/pong control frames are handled by tungstenite itself.
///
/// The handshake is bounded by `connect_timeout` and every write by `send_timeout`, so the
/// writer lock is never held for longer than either.
pub struct WebSocketTransport {
    endpoint: Url,
    connect_timeout: Duration,
    send_timeout: Duration,
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    #[must_use]
    pub fn new(endpoint: Url, connect_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            send_timeout,
            shared: Arc::new(Shared::default()),
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn read_loop(mut read: SplitStream<WsStream>, shared: Arc<Shared>) {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    shared.emit(TransportEvent::Message(Frame::Text(text.to_string())));
                }
                Ok(Message::Binary(bytes)) => {
                    shared.emit(TransportEvent::Message(Frame::Binary(bytes.to_vec())));
                }
                Ok(Message::Close(frame)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?frame, "Server closed the WebSocket");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &frame;
                    break;
                }
                Err(e) => {
                    shared.emit(TransportEvent::Error {
                        message: e.to_string(),
                        cause: Some(e.into()),
                    });
                    break;
                }
                // Ping, pong and raw frames
                Ok(_) => {}
            }
        }

        shared.set_state(ReadyState::Closed);
        shared.emit(TransportEvent::Closed);
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn attach(&self, sink: EventSink) {
        *self.shared.sink.lock() = Some(sink);
    }

    fn detach(&self) {
        self.shared.sink.lock().take();
    }

    async fn connect(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if writer.is_some() && self.shared.ready_state() == ReadyState::Open {
            return Ok(());
        }

        if let Some(previous) = self.reader.lock().take() {
            previous.abort();
        }

        self.shared.set_state(ReadyState::Connecting);
        let handshake = time::timeout(self.connect_timeout, connect_async(self.endpoint.as_str()));
        let (ws_stream, _) = match handshake.await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                self.shared.set_state(ReadyState::Closed);
                return Err(e.into());
            }
            Err(_elapsed) => {
                self.shared.set_state(ReadyState::Closed);
                return Err(WsError::Timeout.into());
            }
        };

        let (write, read) = ws_stream.split();
        *writer = Some(write);
        self.shared.set_state(ReadyState::Open);
        drop(writer);

        self.shared.emit(TransportEvent::Opened);

        let handle = tokio::spawn(Self::read_loop(read, Arc::clone(&self.shared)));
        *self.reader.lock() = Some(handle);

        Ok(())
    }

    async fn close(&self, reason: CloseReason) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let Some(mut write) = writer.take() else {
            return Ok(());
        };
        drop(writer);

        self.shared.set_state(ReadyState::Closing);

        let code = match reason {
            CloseReason::Normal => CloseCode::Normal,
            CloseReason::Reconnect => CloseCode::Away,
        };
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        }));
        let result = match time::timeout(self.send_timeout, write.send(frame)).await {
            Ok(sent) => sent.map_err(Into::into),
            Err(_elapsed) => Err(WsError::Timeout.into()),
        };

        // Dropping the sink together with the aborted reader releases the socket
        drop(write);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.shared.set_state(ReadyState::Closed);

        result
    }

    async fn send(&self, text: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let Some(write) = writer.as_mut() else {
            return Err(WsError::NotOpen.into());
        };

        let message = Message::Text(text.to_owned().into());
        match time::timeout(self.send_timeout, write.send(message)).await {
            Ok(sent) => sent.map_err(Into::into),
            Err(_elapsed) => {
                // A peer that stopped reading leaves a half-written frame behind
                writer.take();
                if let Some(reader) = self.reader.lock().take() {
                    reader.abort();
                }
                self.shared.set_state(ReadyState::Closed);
                self.shared.emit(TransportEvent::Closed);
                Err(WsError::Timeout.into())
            }
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}
