//! Error taxonomy for the voice session core.

use crate::model::CloseCode;
use serde_json::Error as JsonError;
use std::{error::Error as StdError, fmt, io::Error as IoError};
use tokio::time::error::Elapsed;
use tokio_tungstenite::tungstenite::Error as TungsteniteError;

/// Errors produced while establishing or running a voice session.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A session already exists for this guild; only one may be open at a time.
    AlreadyJoined,
    /// A transmission is already active; only one may run at a time.
    AudioAlreadyPlaying,
    /// The channel the caller asked to join is not voice-capable.
    NotVoiceCapable,
    /// Miscellaneous I/O error (UDP socket, subprocess stdio).
    Io(IoError),
    /// JSON (de)serialization error on a gateway frame.
    Json(JsonError),
    /// WebSocket transport error.
    Ws(TungsteniteError),
    /// The gateway endpoint URL was invalid.
    EndpointUrl,
    /// IP discovery response was malformed or addressed to the wrong type.
    IllegalDiscoveryResponse,
    /// IP discovery response contained an unparseable IP address.
    IllegalIp,
    /// Server rejected every crypto mode this client offered.
    CryptoModeUnavailable,
    /// Secret key supplied by the server had the wrong length.
    CryptoInvalidLength,
    /// Per-packet AEAD authentication failure. Never surfaced to a caller;
    /// the packet is dropped and a counter incremented (spec scenario 5).
    DecryptFailed,
    /// The per-session 32-bit nonce counter is about to wrap; the session
    /// must close rather than reuse a nonce.
    NonceExhausted,
    /// Malformed or unexpected gateway frame that prevented the session reaching `Ready`.
    Protocol(&'static str),
    /// Two consecutive heartbeat intervals elapsed with no ack.
    HeartbeatTimeout,
    /// Connection attempt or join deadline elapsed.
    TimedOut,
    /// The server closed the connection.
    RemoteClose(CloseCode, Option<String>),
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Self {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Self {
        Error::Ws(e)
    }
}

impl From<Elapsed> for Error {
    fn from(_e: Elapsed) -> Self {
        Error::TimedOut
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice session error: ")?;
        match self {
            Self::AlreadyJoined => write!(f, "a session is already open for this guild"),
            Self::AudioAlreadyPlaying => write!(f, "a transmission is already active"),
            Self::NotVoiceCapable => write!(f, "channel is not voice-capable"),
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::Ws(e) => write!(f, "websocket issue ({e})"),
            Self::EndpointUrl => write!(f, "gateway endpoint url was invalid"),
            Self::IllegalDiscoveryResponse => write!(f, "IP discovery response was invalid"),
            Self::IllegalIp => write!(f, "IP discovery response had a bad IP value"),
            Self::CryptoModeUnavailable => write!(f, "server did not offer any supported encryption mode"),
            Self::CryptoInvalidLength => write!(f, "server supplied a secret key of the wrong length"),
            Self::DecryptFailed => write!(f, "packet failed AEAD authentication"),
            Self::NonceExhausted => write!(f, "nonce counter is about to wrap"),
            Self::Protocol(why) => write!(f, "protocol violation: {why}"),
            Self::HeartbeatTimeout => write!(f, "heartbeat ack was not received in time"),
            Self::TimedOut => write!(f, "operation timed out"),
            Self::RemoteClose(code, reason) => match reason {
                Some(r) => write!(f, "server closed the session ({code:?}): {r}"),
                None => write!(f, "server closed the session ({code:?})"),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Ws(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
