//! Wire model for the voice gateway's JSON control-plane frames.

pub mod close_code;
pub mod payload;

pub use close_code::CloseCode;

use serde::{
    de::{Deserializer, Error as DeError},
    ser::{SerializeStruct, Serializer},
    Deserialize,
    Serialize,
};
use serde_json::Value;

/// Opcode numbers used on the voice WebSocket.
pub mod opcode {
    /// Client-sent: establish identity on a fresh session.
    pub const IDENTIFY: u8 = 0;
    /// Client-sent: report discovered address/port and chosen mode.
    pub const SELECT_PROTOCOL: u8 = 1;
    /// Server-sent: session established, carries SSRC/IP/port/modes.
    pub const READY: u8 = 2;
    /// Client-sent: periodic control-plane heartbeat.
    pub const HEARTBEAT: u8 = 3;
    /// Server-sent: negotiated mode and secret key.
    pub const SESSION_DESCRIPTION: u8 = 4;
    /// Sent by either side: speaking-flag update.
    pub const SPEAKING: u8 = 5;
    /// Server-sent: heartbeat acknowledgement.
    pub const HEARTBEAT_ACK: u8 = 6;
    /// Client-sent: reattach to a known session.
    pub const RESUME: u8 = 7;
    /// Server-sent: first frame on connect, carries heartbeat interval.
    pub const HELLO: u8 = 8;
    /// Server-sent: resume confirmed.
    pub const RESUMED: u8 = 9;
    /// Server-sent: a remote user joined the channel's voice stream.
    pub const CLIENT_CONNECT: u8 = 12;
    /// Server-sent: a remote user left.
    pub const CLIENT_DISCONNECT: u8 = 13;
    /// Lower bound of the DAVE/MLS transition opcode range.
    pub const DAVE_LOW: u8 = 21;
    /// Upper bound of the DAVE/MLS transition opcode range.
    pub const DAVE_HIGH: u8 = 31;
}

/// A single control-plane frame, tagged by its numeric opcode.
///
/// This is a closed sum type rather than the dynamic emitter pattern used
/// elsewhere: callers match on a finite set of variants instead of
/// registering per-event handlers.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// Client-sent `IDENTIFY` (op 0).
    Identify(payload::Identify),
    /// Client-sent `SELECT_PROTOCOL` (op 1).
    SelectProtocol(payload::SelectProtocol),
    /// Server-sent `READY` (op 2).
    Ready(payload::Ready),
    /// Client-sent `HEARTBEAT` (op 3).
    Heartbeat(payload::Heartbeat),
    /// Server-sent `SESSION_DESCRIPTION` (op 4).
    SessionDescription(payload::SessionDescription),
    /// `SPEAKING` (op 5), sent by either side.
    Speaking(payload::Speaking),
    /// Server-sent `HEARTBEAT_ACK` (op 6).
    HeartbeatAck(payload::HeartbeatAck),
    /// Client-sent `RESUME` (op 7).
    Resume(payload::Resume),
    /// Server-sent `HELLO` (op 8).
    Hello(payload::Hello),
    /// Server-sent `RESUMED` (op 9); carries no body.
    Resumed,
    /// Server-sent `CLIENT_CONNECT` (op 12).
    ClientConnect(payload::ClientConnect),
    /// Server-sent `CLIENT_DISCONNECT` (op 13).
    ClientDisconnect(payload::ClientDisconnect),
    /// A DAVE/MLS transition opcode (21-31), carried opaque.
    Dave {
        /// The raw opcode number, in the 21-31 DAVE range.
        op: u8,
        /// The unparsed `d` payload.
        body: Value,
    },
    /// Any opcode this crate does not model; logged, never closes the session.
    Unknown {
        /// The raw opcode number.
        op: u8,
        /// The unparsed `d` payload.
        body: Value,
    },
}

impl Event {
    fn op(&self) -> u8 {
        use opcode::*;
        match self {
            Self::Identify(_) => IDENTIFY,
            Self::SelectProtocol(_) => SELECT_PROTOCOL,
            Self::Ready(_) => READY,
            Self::Heartbeat(_) => HEARTBEAT,
            Self::SessionDescription(_) => SESSION_DESCRIPTION,
            Self::Speaking(_) => SPEAKING,
            Self::HeartbeatAck(_) => HEARTBEAT_ACK,
            Self::Resume(_) => RESUME,
            Self::Hello(_) => HELLO,
            Self::Resumed => RESUMED,
            Self::ClientConnect(_) => CLIENT_CONNECT,
            Self::ClientDisconnect(_) => CLIENT_DISCONNECT,
            Self::Dave { op, .. } | Self::Unknown { op, .. } => *op,
        }
    }
}

macro_rules! from_payload {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Event {
            fn from(v: $ty) -> Self {
                Event::$variant(v)
            }
        }
    };
}

from_payload!(Identify, payload::Identify);
from_payload!(SelectProtocol, payload::SelectProtocol);
from_payload!(Heartbeat, payload::Heartbeat);
from_payload!(Resume, payload::Resume);
from_payload!(Speaking, payload::Speaking);

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Event", 2)?;
        state.serialize_field("op", &self.op())?;
        match self {
            Self::Identify(d) => state.serialize_field("d", d)?,
            Self::SelectProtocol(d) => state.serialize_field("d", d)?,
            Self::Heartbeat(d) => state.serialize_field("d", d)?,
            Self::Resume(d) => state.serialize_field("d", d)?,
            Self::Speaking(d) => state.serialize_field("d", d)?,
            Self::Dave { body, .. } | Self::Unknown { body, .. } => {
                state.serialize_field("d", body)?
            },
            other => return Err(serde::ser::Error::custom(format!(
                "{other:?} is not a client-sendable voice gateway frame"
            ))),
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Value,
    #[allow(dead_code)]
    #[serde(default)]
    s: Option<u64>,
    #[allow(dead_code)]
    #[serde(default)]
    t: Option<String>,
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawFrame::deserialize(deserializer)?;
        let from_body = |body: Value| serde_json::from_value(body).map_err(DeError::custom);

        Ok(match raw.op {
            opcode::READY => Event::Ready(from_body(raw.d)?),
            opcode::HELLO => Event::Hello(from_body(raw.d)?),
            opcode::SESSION_DESCRIPTION => Event::SessionDescription(from_body(raw.d)?),
            opcode::SPEAKING => Event::Speaking(from_body(raw.d)?),
            opcode::HEARTBEAT_ACK => Event::HeartbeatAck(from_body(raw.d)?),
            opcode::RESUMED => Event::Resumed,
            opcode::CLIENT_CONNECT => Event::ClientConnect(from_body(raw.d)?),
            opcode::CLIENT_DISCONNECT => Event::ClientDisconnect(from_body(raw.d)?),
            op if (opcode::DAVE_LOW..=opcode::DAVE_HIGH).contains(&op) =>
                Event::Dave { op, body: raw.d },
            op => Event::Unknown { op, body: raw.d },
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hello_round_trips_by_op() {
        let raw = serde_json::json!({"op": 8, "d": {"heartbeat_interval": 41250.0}});
        let ev: Event = serde_json::from_value(raw).unwrap();
        assert!(matches!(ev, Event::Hello(h) if h.heartbeat_interval == 41250.0));
    }

    #[test]
    fn dave_opcode_is_preserved_opaque() {
        let raw = serde_json::json!({"op": 25, "d": {"foo": "bar"}});
        let ev: Event = serde_json::from_value(raw).unwrap();
        assert!(matches!(ev, Event::Dave { op: 25, .. }));
    }

    #[test]
    fn unmodelled_opcode_does_not_error() {
        let raw = serde_json::json!({"op": 200, "d": {}});
        let ev: Event = serde_json::from_value(raw).unwrap();
        assert!(matches!(ev, Event::Unknown { op: 200, .. }));
    }

    #[test]
    fn identify_serializes_with_matching_op() {
        let id = payload::Identify {
            server_id: crate::id::GuildId(std::num::NonZeroU64::new(1).unwrap()),
            user_id: crate::id::UserId(std::num::NonZeroU64::new(2).unwrap()),
            session_id: "s".into(),
            token: "t".into(),
            max_dave_protocol_version: None,
        };
        let value = serde_json::to_value(Event::from(id)).unwrap();
        assert_eq!(value["op"], 0);
    }
}
