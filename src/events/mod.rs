//! Public events emitted by a session (§6).
//!
//! The source emits named events through a dynamic, per-callback emitter;
//! here that is replaced with a closed sum type and a channel-backed
//! subscriber, per spec.md §9's re-architecture note.

use crate::{
    error::Error,
    id::UserId,
    model::CloseCode,
};

/// One user's speaking-flag bitfield (§3/GLOSSARY): bit 0 voice, bit 1
/// soundshare, bit 2 priority.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SpeakingState(pub u8);

impl SpeakingState {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Bit 0: plain voice audio.
    pub fn voice(self) -> bool {
        self.0 & 0b001 != 0
    }

    /// Bit 1: soundshare.
    pub fn soundshare(self) -> bool {
        self.0 & 0b010 != 0
    }

    /// Bit 2: priority speaker.
    pub fn priority(self) -> bool {
        self.0 & 0b100 != 0
    }

    /// Whether any flag is set.
    pub fn is_speaking(self) -> bool {
        self.0 != 0
    }
}

/// A single event a session may emit over its lifetime.
///
/// This is intentionally a closed enum rather than a trait-object handler
/// registry: callers `match` on a finite set of variants per session,
/// instead of registering per-event callbacks.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// The session reached `Ready` for the first time (§4.5).
    Ready,
    /// The session resumed an existing session id after a reconnect (§4.4).
    Resumed,
    /// The session reached `Closed` and will not reconnect.
    Close,
    /// A recoverable error worth surfacing to the caller; does not by
    /// itself imply the session closed.
    Error(ErrorKind),
    /// A remote user's speaking state changed (§4.4 `SPEAKING` handling).
    Speaking {
        /// `None` only when the event pre-dates `ssrc` binding to a user id.
        user_id: Option<UserId>,
        ssrc: u32,
        state: SpeakingState,
    },
    /// A heartbeat round-trip completed; carries latency in milliseconds.
    WsPing(i64),
    /// A heartbeat frame was sent.
    WsHeartbeat,
    /// A heartbeat ack was received.
    WsHeartbeatAck,
    /// Any inbound gateway text frame was received (pre-dispatch).
    WsMessage,
    /// The gateway WebSocket closed.
    WsClose(CloseCode),
    /// The gateway WebSocket reported a transport error.
    WsError,
}

/// A cheaply-cloneable view of an [`Error`] suitable for an event payload.
#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// WS/UDP dial failure, TLS error, DNS failure, or similar I/O fault.
    Transport,
    /// Malformed or unexpected server frame, or an unsupported encryption mode.
    Protocol,
    /// Two consecutive heartbeat intervals elapsed with no ack.
    HeartbeatTimeout,
    /// The server closed the connection with this close code.
    RemoteClose(CloseCode),
}

impl From<&Error> for ErrorKind {
    fn from(e: &Error) -> Self {
        match e {
            Error::Io(_) | Error::Ws(_) | Error::TimedOut => ErrorKind::Transport,
            Error::HeartbeatTimeout => ErrorKind::HeartbeatTimeout,
            Error::RemoteClose(code, _) => ErrorKind::RemoteClose(*code),
            _ => ErrorKind::Protocol,
        }
    }
}

/// Subscriber handle for a session's event stream.
///
/// Backed by an unbounded [`flume`] channel; cloning the underlying sender
/// is cheap, so the supervisor hands out one sender per interested
/// subsystem (heartbeat, gateway, audio pipeline) while a caller holds the
/// single receiver.
pub struct EventStream(flume::Receiver<Event>);

impl EventStream {
    pub(crate) fn new(rx: flume::Receiver<Event>) -> Self {
        Self(rx)
    }

    /// Awaits the next event. Resolves to `None` once the session is
    /// dropped and no more events can arrive.
    pub async fn recv(&mut self) -> Option<Event> {
        self.0.recv_async().await.ok()
    }
}

/// Internal publishing half, cloned into every subsystem that raises events.
#[derive(Clone)]
pub(crate) struct EventSender(flume::Sender<Event>);

impl EventSender {
    pub(crate) fn channel() -> (Self, EventStream) {
        let (tx, rx) = flume::unbounded();
        (Self(tx), EventStream::new(rx))
    }

    pub(crate) fn send(&self, event: Event) {
        // A disconnected receiver (dropped `EventStream`) is not a session
        // fault; events are best-effort once nobody is listening.
        let _ = self.0.send(event);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn speaking_state_decodes_flags() {
        let s = SpeakingState(0b101);
        assert!(s.voice());
        assert!(!s.soundshare());
        assert!(s.priority());
        assert!(s.is_speaking());
        assert!(!SpeakingState::NONE.is_speaking());
    }

    #[tokio::test]
    async fn stream_receives_sent_events() {
        let (tx, mut stream) = EventSender::channel();
        tx.send(Event::Ready);
        assert!(matches!(stream.recv().await, Some(Event::Ready)));
    }

    #[tokio::test]
    async fn stream_ends_once_sender_dropped() {
        let (tx, mut stream) = EventSender::channel();
        drop(tx);
        assert!(stream.recv().await.is_none());
    }
}
