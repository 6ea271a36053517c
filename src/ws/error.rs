#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Handshake or write did not finish within its configured bound
    Timeout,
    /// The transport is not in the open state
    NotOpen,
    /// A binary frame was not a valid raw deflate stream
    Decompression(flate2::DecompressError),
    /// A binary frame ended before the deflate stream was complete
    TruncatedFrame,
    /// Message stream lagged and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Timeout => write!(f, "WebSocket operation timed out"),
            Self::NotOpen => write!(f, "WebSocket is not open"),
            Self::Decompression(e) => write!(f, "Failed to decompress WebSocket frame: {e}"),
            Self::TruncatedFrame => write!(f, "WebSocket frame ended mid deflate stream"),
            Self::Lagged { count } => write!(f, "Message stream lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Decompression(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}

impl From<flate2::DecompressError> for crate::error::Error {
    fn from(e: flate2::DecompressError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Decompression(e))
    }
}
