//! Constants affecting session and transport behaviour.

use std::time::Duration;

/// The voice gateway version this crate speaks.
pub const VOICE_GATEWAY_VERSION: u8 = 8;

/// Sample rate of audio handled by the pipeline.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/packets sent per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time between any two audio frames.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Number of samples in one 20ms frame of mono audio at 48kHz.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE_RAW / AUDIO_FRAME_RATE;

/// Maximum safe UDP payload size, kept below typical path MTU.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Delay between UDP keepalive datagrams when no audio is flowing.
pub const UDP_KEEPALIVE_GAP: Duration = Duration::from_secs(5);

/// Opus silence frame, sent 5 times before dropping the speaking flag.
pub const SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Number of silence frames sent at the end of a speech burst.
pub const SILENCE_FRAME_COUNT: usize = 5;

/// RTP version/padding/extension byte: version 2, no padding, no extension.
pub const RTP_VERSION_BYTE: u8 = 0x80;

/// RTP payload-type byte used for the voice gateway's dynamic Opus profile.
pub const RTP_PAYLOAD_TYPE_BYTE: u8 = 0x78;

/// Length of a bare RTP header in bytes.
pub const RTP_HEADER_LEN: usize = 12;

/// Deadline for a join to observe `SESSION_DESCRIPTION` before it fails.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed wait between reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Maximum number of consecutive reconnect failures before giving up.
pub const MAX_RECONNECT_ATTEMPTS: usize = 5;

/// How long an unmapped SSRC is held in the receive mux before eviction.
pub const SSRC_BIND_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the receive mux's holding area for unmapped SSRCs.
pub const SSRC_HOLDING_CAPACITY: usize = 16;
