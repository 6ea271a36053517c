//! Inbound frame decoding: raw deflate decompression and heartbeat-reply filtering.

use flate2::{Decompress, FlushDecompress, Status};

use super::error::WsError;
use super::transport::Frame;
use crate::Result;

/// Growth step for the inflate buffer.
const INFLATE_CHUNK: usize = 4096;

/// Outcome of decoding one inbound frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Application payload to hand to subscribers verbatim
    Payload(String),
    /// The server's reply to a keepalive
    HeartbeatReply,
    /// A binary frame that could not be decompressed
    Undecodable,
}

/// Inflates a raw deflate stream (no zlib or gzip header) into text.
///
/// Invalid UTF-8 sequences are replaced with `U+FFFD`. Bytes trailing the end of the deflate
/// stream are ignored.
pub fn decompress(raw: &[u8]) -> Result<String> {
    let mut inflater = Decompress::new(false);
    let mut out = Vec::with_capacity(raw.len().saturating_mul(4).max(INFLATE_CHUNK));

    loop {
        if out.len() == out.capacity() {
            out.reserve(INFLATE_CHUNK);
        }

        let progress = (inflater.total_in(), inflater.total_out());
        let consumed = usize::try_from(inflater.total_in()).unwrap_or(raw.len());
        let input = raw.get(consumed..).unwrap_or_default();

        match inflater.decompress_vec(input, &mut out, FlushDecompress::None)? {
            Status::StreamEnd => break,
            // Output space was available, so no progress means the input ran out
            _ if (inflater.total_in(), inflater.total_out()) == progress => {
                return Err(WsError::TruncatedFrame.into());
            }
            Status::Ok | Status::BufError => {}
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Classifies an inbound frame, decompressing binary frames first.
///
/// Decompression failures are logged here and reported as [`Inbound::Undecodable`].
#[must_use]
pub fn decode(frame: Frame, heartbeat_reply: &str) -> Inbound {
    let text = match frame {
        Frame::Text(text) => text,
        Frame::Binary(raw) => match decompress(&raw) {
            Ok(text) => text,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(len = raw.len(), error = %e, "Unable to decompress frame");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return Inbound::Undecodable;
            }
        },
    };

    if text == heartbeat_reply {
        Inbound::HeartbeatReply
    } else {
        Inbound::Payload(text)
    }
}
