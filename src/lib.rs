#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! A bot-side client for a real-time voice gateway: the control WebSocket,
//! UDP IP discovery, AEAD-encrypted RTP audio, heartbeating, and the
//! resume/reidentify state machine that keeps a voice session alive across
//! transient reconnects.
//!
//! This crate is the session core only. It does not own a text/presence
//! gateway connection -- callers feed it `VOICE_STATE_UPDATE` and
//! `VOICE_SERVER_UPDATE` payloads observed on their own gateway, and read
//! back the `UPDATE_VOICE_STATE` payload they must send in return -- and it
//! does not perform audio transcoding itself, instead piping PCM/Opus
//! through an external encoder/decoder subprocess resolved from `PATH`.
//!
//! ## Starting a session
//!
//! ```no_run
//! # async fn doc() -> vox_session_core::error::Result<()> {
//! use vox_session_core::{session, Config};
//!
//! let params = session::ConnectParams {
//!     guild_id: todo!(),
//!     channel_id: todo!(),
//!     user_id: todo!(),
//!     self_mute: false,
//!     self_deaf: false,
//! };
//! let (handle, mut events) = session::connect(params, Config::default());
//!
//! // Forward `handle.pending_voice_state_update()` over your own gateway,
//! // then feed its replies back in:
//! // handle.provide_voice_state_update(...);
//! // handle.provide_voice_server_update(...);
//!
//! while let Some(event) = events.recv().await {
//!     // react to vox_session_core::events::Event
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod audio;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod dave;
pub mod error;
pub mod events;
pub mod gateway;
pub mod id;
pub mod model;
pub mod receive_mux;
pub mod retry;
pub mod session;
pub mod transport;

pub use crate::{
    config::Config,
    dave::{MediaSecurityOverlay, NullOverlay},
    error::{Error, Result},
    events::{Event, EventStream, SpeakingState},
    id::{ChannelId, GuildId, UserId},
    model::CloseCode,
    retry::Retry,
    session::{
        connect,
        ConnectParams,
        Session,
        SessionHandle,
        SessionState,
        UpdateVoiceState,
        VoiceServerUpdate,
        VoiceStateUpdate,
    },
};
