//! Typed bodies (`d` field) for each voice gateway opcode.

use crate::id::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Sent after `HELLO` on a fresh session (op 0).
#[derive(Clone, Debug, Serialize)]
pub struct Identify {
    /// The guild this session is for.
    pub server_id: GuildId,
    /// The bot's own user id.
    pub user_id: UserId,
    /// Session id from the external gateway's `VOICE_STATE_UPDATE`.
    pub session_id: String,
    /// Identify token from the external gateway's `VOICE_SERVER_UPDATE`.
    pub token: String,
    /// Highest DAVE protocol version this client understands; `0` disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_dave_protocol_version: Option<u32>,
}

/// Sent once external address/port are known via IP discovery (op 1).
#[derive(Clone, Debug, Serialize)]
pub struct SelectProtocol {
    /// Always `"udp"`.
    pub protocol: String,
    /// The discovered address/port and chosen encryption mode.
    pub data: ProtocolData,
}

/// The `data` payload of [`SelectProtocol`].
#[derive(Clone, Debug, Serialize)]
pub struct ProtocolData {
    /// Externally observed address, from IP discovery.
    pub address: IpAddr,
    /// Externally observed port, from IP discovery.
    pub port: u16,
    /// Chosen encryption mode's wire name.
    pub mode: String,
}

/// Server's reply to `IDENTIFY`/`RESUME` establishing the session (op 2).
#[derive(Clone, Debug, Deserialize)]
pub struct Ready {
    /// Server-assigned SSRC for this session (§3 invariant: immutable for its life).
    pub ssrc: u32,
    /// Voice server IP to connect the UDP transport to.
    pub ip: IpAddr,
    /// Voice server UDP port.
    pub port: u16,
    /// Encryption modes the server supports, for `SELECT_PROTOCOL` negotiation.
    pub modes: Vec<String>,
}

/// Client heartbeat (op 3).
#[derive(Clone, Debug, Serialize)]
pub struct Heartbeat {
    /// Monotonic millisecond timestamp this heartbeat was sent at.
    pub t: i64,
    /// Last control-plane sequence number observed, for server-side tracking.
    pub seq_ack: Option<u64>,
}

/// Server's confirmation of the negotiated mode and secret key (op 4).
#[derive(Clone, Debug, Deserialize)]
pub struct SessionDescription {
    /// The encryption mode's wire name, as chosen by the server.
    pub mode: String,
    /// The 32-byte secret key for that mode.
    pub secret_key: Vec<u8>,
    /// DAVE protocol version in effect; `0` means the overlay is disabled.
    #[serde(default)]
    pub dave_protocol_version: Option<u32>,
}

/// Speaking state update, sent by client and server alike (op 5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Speaking {
    /// Bitfield: bit 0 voice, bit 1 soundshare, bit 2 priority.
    pub speaking: u8,
    /// The SSRC this speaking state applies to.
    pub ssrc: u32,
    /// The user this SSRC belongs to; absent on some client-sent frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Reserved delay field; unused by this crate but part of the wire shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
}

/// Server's acknowledgement of a heartbeat (op 6).
#[derive(Clone, Debug, Deserialize)]
pub struct HeartbeatAck {
    /// Echoes the `t` of the heartbeat being acknowledged.
    pub t: i64,
}

/// Sent instead of `IDENTIFY` when reattaching to a known session (op 7).
#[derive(Clone, Debug, Serialize)]
pub struct Resume {
    /// The guild this session is for.
    pub server_id: GuildId,
    /// The session id to resume.
    pub session_id: String,
    /// The identify token for this voice server.
    pub token: String,
    /// Last control-plane sequence number observed before the disconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_ack: Option<u64>,
}

/// First frame sent by the server on connect (op 8).
#[derive(Clone, Debug, Deserialize)]
pub struct Hello {
    /// Interval, in milliseconds, at which to send heartbeats.
    pub heartbeat_interval: f64,
}

/// A remote user joining the channel's voice stream (no stable opcode in
/// current protocol versions; observed historically as op 12).
#[derive(Clone, Debug, Deserialize)]
pub struct ClientConnect {
    /// The user who joined.
    pub user_id: UserId,
    /// Their SSRC, if already assigned; `0` if not yet known.
    #[serde(default)]
    pub audio_ssrc: u32,
}

/// A remote user leaving (op 13).
#[derive(Clone, Debug, Deserialize)]
pub struct ClientDisconnect {
    /// The user who left.
    pub user_id: UserId,
}
