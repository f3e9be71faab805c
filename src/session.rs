//! `SessionSupervisor`: the top-level per-guild state machine (§4.5).
//!
//! One actor task per session owns the `GatewayClient`, `UdpTransport`,
//! `HeartbeatEngine`, `ReceiveMux`, and `AudioPipeline`; every other piece
//! of this crate talks to it through the `SessionHandle` command channel or
//! the `EventStream` it publishes, never through a back-pointer (spec.md
//! §9's one-owner re-architecture note).

use crate::{
    audio::{AudioPipeline, PipelineOutbound, ReceiveStream},
    config::Config,
    crypto::{CryptoMode, RtpCodec},
    dave::{MediaSecurityOverlay, NullOverlay},
    error::{Error, Result},
    events::{ErrorKind, Event as PublicEvent, EventSender, EventStream, SpeakingState},
    gateway::{heartbeat::HeartbeatEngine, GatewayClient},
    id::{ChannelId, GuildId, UserId},
    model::{self, payload},
    receive_mux::ReceiveMux,
    transport::UdpTransport,
};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tokio::{sync::oneshot, time::sleep};
use tracing::{debug, instrument, warn};

/// Parameters needed to begin establishing a session (§3).
#[derive(Clone, Debug)]
pub struct ConnectParams {
    /// The guild this session belongs to.
    pub guild_id: GuildId,
    /// The voice channel to join within that guild.
    pub channel_id: ChannelId,
    /// The bot's own user id, sent in `IDENTIFY`.
    pub user_id: UserId,
    /// Whether to report self-mute in `UPDATE_VOICE_STATE`.
    pub self_mute: bool,
    /// Whether to report self-deaf in `UPDATE_VOICE_STATE`.
    pub self_deaf: bool,
}

/// Consumed from the external gateway's `VOICE_STATE_UPDATE` (§6).
#[derive(Clone, Debug)]
pub struct VoiceStateUpdate {
    /// The session id to present on `IDENTIFY`/`RESUME`.
    pub session_id: String,
}

/// Consumed from the external gateway's `VOICE_SERVER_UPDATE` (§6).
#[derive(Clone, Debug)]
pub struct VoiceServerUpdate {
    /// The identify token for this voice server.
    pub token: String,
    /// The voice gateway endpoint to dial.
    pub endpoint: String,
}

/// The outbound `UPDATE_VOICE_STATE` (opcode 4) payload a caller must send
/// over their own main-gateway connection (§6); this crate does not own
/// that gateway.
#[derive(Clone, Debug)]
pub struct UpdateVoiceState {
    /// The guild to update voice state for.
    pub guild_id: GuildId,
    /// The channel to join, or `None` to leave.
    pub channel_id: Option<ChannelId>,
    /// Whether to self-mute.
    pub self_mute: bool,
    /// Whether to self-deafen.
    pub self_deaf: bool,
}

/// Lifecycle states of §4.5's state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Supervisor constructed; waiting on the external gateway's server update.
    Idle,
    /// `session_id` observed; awaiting `(token, endpoint)`.
    AwaitingServer,
    /// Dialing the voice WebSocket.
    Connecting,
    /// WS open; `HELLO` pending an `IDENTIFY`/`RESUME` reply.
    Identifying,
    /// `IDENTIFY`/`RESUME` sent; awaiting `READY`.
    AwaitingReady,
    /// `READY` processed; UDP discovery in progress, awaiting `SESSION_DESCRIPTION`.
    AwaitingDescription,
    /// Both `READY` and `SESSION_DESCRIPTION` processed; audio may flow.
    Ready,
    /// A transient fault occurred; waiting out the reconnect backoff.
    Reconnecting,
    /// Terminal: no further reconnects will be attempted.
    Closed,
}

/// Per-guild session state (§3).
#[derive(Debug)]
pub struct Session {
    /// The guild this session belongs to.
    pub guild_id: GuildId,
    /// The voice channel this session is joined to.
    pub channel_id: ChannelId,
    /// The bot's own user id.
    pub user_id: UserId,
    /// Identify token from the most recent `VOICE_SERVER_UPDATE`.
    pub token: Option<String>,
    /// Session id from the most recent `VOICE_STATE_UPDATE`.
    pub session_id: Option<String>,
    /// Voice gateway endpoint from the most recent `VOICE_SERVER_UPDATE`.
    pub endpoint: Option<String>,
    /// Server-assigned SSRC; immutable for the life of the session (§3 invariant).
    pub ssrc: Option<u32>,
    /// Negotiated encryption mode, set once `SESSION_DESCRIPTION` arrives.
    pub mode: Option<CryptoMode>,
    /// Negotiated secret key; present iff the session is ready (§3 invariant).
    pub secret_key: Option<Vec<u8>>,
    /// Heartbeat interval announced in `HELLO`.
    pub heartbeat_interval_ms: Option<f64>,
    /// Last control-plane sequence number observed, echoed on resume.
    pub seq: Option<u64>,
    /// Current self-mute flag.
    pub self_mute: bool,
    /// Current self-deaf flag.
    pub self_deaf: bool,
    /// Current lifecycle state (§4.5).
    pub state: SessionState,
    /// Count of packets dropped for failing AEAD authentication (§7/§8).
    pub drop_count: u64,
}

impl Session {
    fn new(params: &ConnectParams) -> Self {
        Self {
            guild_id: params.guild_id,
            channel_id: params.channel_id,
            user_id: params.user_id,
            token: None,
            session_id: None,
            endpoint: None,
            ssrc: None,
            mode: None,
            secret_key: None,
            heartbeat_interval_ms: None,
            seq: None,
            self_mute: params.self_mute,
            self_deaf: params.self_deaf,
            state: SessionState::Idle,
            drop_count: 0,
        }
    }

    /// A session is ready only once both `READY` and `SESSION_DESCRIPTION`
    /// have been processed (§3 invariant).
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }
}

enum Command {
    VoiceStateUpdate(VoiceStateUpdate),
    VoiceServerUpdate(VoiceServerUpdate),
    Play(Box<dyn tokio::io::AsyncRead + Unpin + Send>, f32, bool, oneshot::Sender<Result<()>>),
    PauseAudio,
    ResumeAudio,
    StopAudio(oneshot::Sender<()>),
    OpenReceiveStream(UserId, oneshot::Sender<Result<ReceiveStream>>),
    Close(oneshot::Sender<()>),
}

/// External handle to a running session; cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: flume::Sender<Command>,
    pending_update: UpdateVoiceState,
}

impl SessionHandle {
    /// The `UPDATE_VOICE_STATE` payload the caller must forward over their
    /// own main-gateway connection to begin this session.
    pub fn pending_voice_state_update(&self) -> UpdateVoiceState {
        self.pending_update.clone()
    }

    /// Feeds in the external gateway's `VOICE_STATE_UPDATE`.
    pub fn provide_voice_state_update(&self, update: VoiceStateUpdate) {
        let _ = self.cmd_tx.send(Command::VoiceStateUpdate(update));
    }

    /// Feeds in the external gateway's `VOICE_SERVER_UPDATE`.
    pub fn provide_voice_server_update(&self, update: VoiceServerUpdate) {
        let _ = self.cmd_tx.send(Command::VoiceServerUpdate(update));
    }

    /// Begins transmitting `source` (raw little-endian 16-bit PCM).
    /// Fails with [`Error::AudioAlreadyPlaying`] if already playing.
    pub async fn play(
        &self,
        source: Box<dyn tokio::io::AsyncRead + Unpin + Send>,
        volume: f32,
        stereo: bool,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::Play(source, volume, stereo, tx)).map_err(|_| Error::Protocol("session closed"))?;
        rx.await.map_err(|_| Error::Protocol("session closed"))?
    }

    /// Stops feeding frames without emitting the silence tail.
    pub fn pause_audio(&self) {
        let _ = self.cmd_tx.send(Command::PauseAudio);
    }

    /// Resumes a paused transmission.
    pub fn resume_audio(&self) {
        let _ = self.cmd_tx.send(Command::ResumeAudio);
    }

    /// Stops transmission, emitting the silence tail and flags-off.
    pub async fn stop_audio(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::StopAudio(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Opens a receive stream for a bound remote user.
    pub async fn open_receive_stream(&self, user_id: UserId) -> Result<ReceiveStream> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::OpenReceiveStream(user_id, tx))
            .map_err(|_| Error::Protocol("session closed"))?;
        rx.await.map_err(|_| Error::Protocol("session closed"))?
    }

    /// Idempotent: tears down the session and cancels all outstanding
    /// timers and subprocess handles (§5).
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Begins establishing a voice session for one guild.
///
/// Returns immediately; the supervisor actor waits in `Idle` for
/// [`SessionHandle::provide_voice_state_update`] and
/// [`SessionHandle::provide_voice_server_update`] before dialing the
/// gateway.
#[instrument(skip(config), fields(guild_id = %params.guild_id, channel_id = %params.channel_id))]
pub fn connect(params: ConnectParams, config: Config) -> (SessionHandle, EventStream) {
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (events, stream) = EventSender::channel();

    let pending_update = UpdateVoiceState {
        guild_id: params.guild_id,
        channel_id: Some(params.channel_id),
        self_mute: params.self_mute,
        self_deaf: params.self_deaf,
    };

    tokio::spawn(run(params, config, cmd_rx, events));

    (SessionHandle { cmd_tx, pending_update }, stream)
}

async fn run(params: ConnectParams, config: Config, cmd_rx: flume::Receiver<Command>, events: EventSender) {
    let mut session = Session::new(&params);
    let overlay: Arc<dyn MediaSecurityOverlay> = Arc::new(NullOverlay);
    let mut attempts = 0usize;
    // Persists across a plain `Reconnect` (RESUME) so audio keeps flowing
    // without re-running IP discovery; cleared on `ReconnectFresh`.
    let mut udp: Option<Arc<UdpTransport>> = None;

    session.state = SessionState::AwaitingServer;

    'outer: loop {
        // Wait for the (session_id, token, endpoint) triple, processing
        // Close/audio commands that arrive while idle.
        while session.session_id.is_none() || session.token.is_none() {
            match cmd_rx.recv_async().await {
                Ok(Command::VoiceStateUpdate(u)) => session.session_id = Some(u.session_id),
                Ok(Command::VoiceServerUpdate(u)) => {
                    session.token = Some(u.token);
                    session.endpoint = Some(u.endpoint);
                },
                Ok(Command::Close(done)) => {
                    session.state = SessionState::Closed;
                    let _ = done.send(());
                    events.send(PublicEvent::Close);
                    return;
                },
                Ok(_other) => {},
                Err(_) => return,
            }
        }

        session.state = SessionState::Connecting;
        let resume = session.ssrc.is_some();

        match connect_and_run(&mut session, &cmd_rx, &events, &config, &overlay, resume, &mut udp).await {
            Outcome::Closed => {
                events.send(PublicEvent::Close);
                return;
            },
            Outcome::Reconnect { ever_ready } => {
                // Only count consecutive failures: a run that reached
                // `Ready` before faulting starts a fresh streak (§5).
                if ever_ready {
                    attempts = 0;
                }
                attempts += 1;
                match config.retry.next_wait(attempts) {
                    Some(wait) => {
                        session.state = SessionState::Reconnecting;
                        sleep(wait).await;
                        continue 'outer;
                    },
                    None => {
                        warn!("exhausted reconnect attempts; closing session");
                        session.state = SessionState::Closed;
                        events.send(PublicEvent::Close);
                        return;
                    },
                }
            },
            Outcome::ReconnectFresh { ever_ready } => {
                if ever_ready {
                    attempts = 0;
                }
                attempts += 1;
                session.ssrc = None;
                session.secret_key = None;
                udp = None;
                match config.retry.next_wait(attempts) {
                    Some(wait) => {
                        session.state = SessionState::Reconnecting;
                        sleep(wait).await;
                        continue 'outer;
                    },
                    None => {
                        session.state = SessionState::Closed;
                        events.send(PublicEvent::Close);
                        return;
                    },
                }
            },
        }
    }
}

enum Outcome {
    /// A critical close or explicit `close()`; do not reconnect.
    Closed,
    /// Transient fault; attempt RESUME with existing session id/seq.
    ///
    /// `ever_ready` records whether this run reached `Ready` at any point
    /// before faulting, so the caller can tell a truly consecutive failure
    /// apart from one that follows a successful connection (§5).
    Reconnect { ever_ready: bool },
    /// Transient fault but resume is not valid; re-identify from scratch.
    ReconnectFresh { ever_ready: bool },
}

#[instrument(skip_all, fields(guild_id = %session.guild_id, resume))]
async fn connect_and_run(
    session: &mut Session,
    cmd_rx: &flume::Receiver<Command>,
    events: &EventSender,
    config: &Config,
    overlay: &Arc<dyn MediaSecurityOverlay>,
    resume: bool,
    udp: &mut Option<Arc<UdpTransport>>,
) -> Outcome {
    let endpoint = session.endpoint.clone().expect("endpoint set before connecting");

    let mut gateway = match GatewayClient::connect(&endpoint).await {
        Ok(g) => g,
        Err(e) => {
            events.send(PublicEvent::Error((&e).into()));
            return Outcome::ReconnectFresh { ever_ready: false };
        },
    };

    session.state = SessionState::Identifying;

    let mut heartbeat: Option<HeartbeatEngine> = None;
    let mut mux = ReceiveMux::new(crate::constants::SSRC_BIND_TIMEOUT);
    let transcoder = match crate::audio::resolve_executable("opusenc", config.transcoder_path_override.as_deref()).await {
        Ok(p) => p,
        Err(_) => std::path::PathBuf::from("opusenc"),
    };
    let mut pipeline: Option<AudioPipeline> = None;
    let mut decode_codec: Option<RtpCodec> = None;
    let (outbound_tx, outbound_rx) = flume::unbounded::<PipelineOutbound>();

    let join_deadline = sleep(config.join_timeout);
    tokio::pin!(join_deadline);
    let mut became_ready = false;

    let mut keepalive = tokio::time::interval(crate::constants::UDP_KEEPALIVE_GAP);
    let mut udp_buf = vec![0u8; crate::constants::VOICE_PACKET_MAX];

    loop {
        let heartbeat_tick = async {
            match &heartbeat {
                Some(hb) => tokio::time::sleep_until(hb.next_tick()).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            () = &mut join_deadline, if !became_ready => {
                events.send(PublicEvent::Error(ErrorKind::Transport));
                return Outcome::ReconnectFresh { ever_ready: false };
            }

            cmd = cmd_rx.recv_async() => {
                match cmd {
                    Ok(Command::Close(done)) => {
                        session.state = SessionState::Closed;
                        let _ = done.send(());
                        return Outcome::Closed;
                    },
                    Ok(Command::VoiceStateUpdate(u)) => session.session_id = Some(u.session_id),
                    Ok(Command::VoiceServerUpdate(u)) => {
                        session.token = Some(u.token);
                        session.endpoint = Some(u.endpoint);
                    },
                    Ok(Command::Play(source, volume, stereo, done)) => {
                        let result = match &mut pipeline {
                            Some(p) if session.is_ready() => p.play(source, volume, stereo).await,
                            _ => Err(Error::Protocol("session not ready")),
                        };
                        let _ = done.send(result);
                    },
                    Ok(Command::PauseAudio) => { if let Some(p) = &pipeline { p.pause(); } },
                    Ok(Command::ResumeAudio) => { if let Some(p) = &pipeline { p.resume(); } },
                    Ok(Command::StopAudio(done)) => {
                        if let Some(p) = &mut pipeline { p.stop().await; }
                        let _ = done.send(());
                    },
                    Ok(Command::OpenReceiveStream(user_id, done)) => {
                        let result = match (&mut pipeline, mux.users().find(|u| u.user_id == user_id).map(|u| u.ssrc)) {
                            (Some(p), Some(ssrc)) => p.open_receive_stream(ssrc, user_id, &transcoder).await,
                            _ => Err(Error::Protocol("no bound ssrc for this user")),
                        };
                        let _ = done.send(result);
                    },
                    Err(_) => return Outcome::Closed,
                }
            }

            frame = gateway.recv() => {
                match frame {
                    Ok(Some((ev, seq))) => {
                        events.send(PublicEvent::WsMessage);
                        if let Some(seq) = seq {
                            session.seq = Some(seq);
                            if let Some(hb) = &mut heartbeat {
                                hb.observe_seq(seq);
                            }
                        }
                        match handle_gateway_event(
                            ev, session, &mut gateway, &mut heartbeat, udp, &mut pipeline,
                            &mut decode_codec, &outbound_tx, &mut mux, events, config, overlay, resume,
                            &transcoder,
                        ).await {
                            Ok(true) => became_ready = true,
                            Ok(false) => {},
                            Err(e) => {
                                events.send(PublicEvent::Error((&e).into()));
                                return Outcome::ReconnectFresh { ever_ready: became_ready };
                            },
                        }
                    },
                    Ok(None) => {},
                    Err(Error::RemoteClose(code, reason)) => {
                        debug!(?code, ?reason, "voice gateway closed");
                        events.send(PublicEvent::WsClose(code));
                        if session.state == SessionState::Closed {
                            return Outcome::Closed;
                        }
                        return if code.should_resume() {
                            Outcome::Reconnect { ever_ready: became_ready }
                        } else {
                            Outcome::Closed
                        };
                    },
                    Err(e) => {
                        events.send(PublicEvent::WsError);
                        events.send(PublicEvent::Error((&e).into()));
                        return Outcome::ReconnectFresh { ever_ready: became_ready };
                    },
                }
            }

            Ok(n) = async {
                match udp.as_ref() {
                    Some(u) => u.recv(&mut udp_buf).await,
                    None => std::future::pending().await,
                }
            } => {
                if let Some(codec) = &decode_codec {
                    match codec.decode(&udp_buf[..n]) {
                        Ok((header, plaintext)) => {
                            mux.touch(header.ssrc);
                            match mux.user_for_ssrc(header.ssrc) {
                                Some(_user) => {
                                    if let Some(p) = &mut pipeline {
                                        p.route_inbound(header.ssrc, plaintext);
                                    }
                                },
                                None => mux.hold_unmapped(header.ssrc, plaintext),
                            }
                        },
                        Err(Error::DecryptFailed) => {
                            session.drop_count += 1;
                        },
                        Err(_) => {},
                    }
                }
            }

            () = heartbeat_tick => {
                if let Some(hb) = &mut heartbeat {
                    match hb.tick() {
                        Ok(frame) => {
                            if gateway.send(&model::Event::from(frame)).await.is_err() {
                                return Outcome::Reconnect { ever_ready: became_ready };
                            }
                            events.send(PublicEvent::WsHeartbeat);
                        },
                        Err(()) => {
                            events.send(PublicEvent::Error(ErrorKind::HeartbeatTimeout));
                            return Outcome::Reconnect { ever_ready: became_ready };
                        },
                    }
                }
            }

            _ = keepalive.tick(), if udp.is_some() && !pipeline.as_ref().map_or(false, AudioPipeline::is_playing) => {
                if let Some(u) = udp.as_ref() {
                    let _ = u.send_keepalive().await;
                }
            }

            out = outbound_rx.recv_async() => {
                match out {
                    Ok(PipelineOutbound::Speaking(state)) => {
                        if let Some(ssrc) = session.ssrc {
                            let _ = gateway.send(&model::Event::from(payload::Speaking {
                                speaking: state.0,
                                ssrc,
                                user_id: Some(session.user_id),
                                delay: Some(0),
                            })).await;
                        }
                    },
                    Ok(PipelineOutbound::ForceClose) => {
                        session.state = SessionState::Closed;
                        return Outcome::Closed;
                    },
                    Err(_) => {},
                }
            }
        }

        mux.evict_stale();
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_gateway_event(
    event: model::Event,
    session: &mut Session,
    gateway: &mut GatewayClient,
    heartbeat: &mut Option<HeartbeatEngine>,
    udp: &mut Option<Arc<UdpTransport>>,
    pipeline: &mut Option<AudioPipeline>,
    decode_codec: &mut Option<RtpCodec>,
    outbound_tx: &flume::Sender<PipelineOutbound>,
    mux: &mut ReceiveMux,
    events: &EventSender,
    config: &Config,
    overlay: &Arc<dyn MediaSecurityOverlay>,
    resume: bool,
    transcoder: &std::path::Path,
) -> Result<bool> {
    match event {
        model::Event::Hello(hello) => {
            *heartbeat = Some(HeartbeatEngine::new(hello.heartbeat_interval));
            session.heartbeat_interval_ms = Some(hello.heartbeat_interval);

            if resume {
                gateway
                    .send(&model::Event::from(payload::Resume {
                        server_id: session.guild_id,
                        session_id: session.session_id.clone().unwrap_or_default(),
                        token: session.token.clone().unwrap_or_default(),
                        seq_ack: session.seq,
                    }))
                    .await?;
            } else {
                gateway
                    .send(&model::Event::from(payload::Identify {
                        server_id: session.guild_id,
                        user_id: session.user_id,
                        session_id: session.session_id.clone().unwrap_or_default(),
                        token: session.token.clone().unwrap_or_default(),
                        max_dave_protocol_version: Some(0),
                    }))
                    .await?;
            }
            session.state = SessionState::AwaitingReady;
            Ok(false)
        },

        model::Event::Ready(ready) => {
            session.ssrc = Some(ready.ssrc);
            session.state = SessionState::AwaitingDescription;

            let transport = UdpTransport::connect(ready.ip, ready.port).await?;
            let (ext_ip, ext_port): (IpAddr, u16) = transport.discover_external_address(ready.ssrc).await?;

            let preferred = config
                .crypto_mode_preference
                .iter()
                .find(|m| ready.modes.iter().any(|offered| offered == m.to_request_str()))
                .copied()
                .ok_or(Error::CryptoModeUnavailable)?;

            gateway
                .send(&model::Event::from(payload::SelectProtocol {
                    protocol: "udp".into(),
                    data: payload::ProtocolData { address: ext_ip, port: ext_port, mode: preferred.to_request_str().into() },
                }))
                .await?;

            *udp = Some(Arc::new(transport));
            Ok(false)
        },

        model::Event::SessionDescription(desc) => {
            let ssrc = session.ssrc.ok_or(Error::Protocol("SESSION_DESCRIPTION before READY"))?;
            let mode = CryptoMode::from_request_str(&desc.mode).ok_or(Error::CryptoModeUnavailable)?;
            if desc.secret_key.len() != crate::crypto::KEY_SIZE {
                return Err(Error::CryptoInvalidLength);
            }

            let was_ready = session.is_ready();
            session.mode = Some(mode);
            session.secret_key = Some(desc.secret_key.clone());
            session.state = SessionState::Ready;
            *decode_codec = Some(RtpCodec::new(mode, &desc.secret_key)?);

            if let Some(udp) = udp.clone() {
                *pipeline = Some(AudioPipeline::new(
                    udp,
                    ssrc,
                    mode,
                    desc.secret_key,
                    transcoder.to_path_buf(),
                    outbound_tx.clone(),
                ));
            }

            if resume || was_ready {
                events.send(PublicEvent::Resumed);
            }
            events.send(PublicEvent::Ready);
            Ok(true)
        },

        model::Event::Speaking(speaking) => {
            if let Some(user_id) = speaking.user_id {
                let state = SpeakingState(speaking.speaking);
                let released = mux.bind(speaking.ssrc, user_id, state);
                for payload in released {
                    if let Some(p) = pipeline {
                        p.route_inbound(speaking.ssrc, payload);
                    }
                }
                events.send(PublicEvent::Speaking { user_id: Some(user_id), ssrc: speaking.ssrc, state });
            }
            Ok(false)
        },

        model::Event::HeartbeatAck(ack) => {
            if let Some(hb) = heartbeat {
                if let Some(latency) = hb.ack(ack.t) {
                    events.send(PublicEvent::WsPing(latency));
                }
            }
            events.send(PublicEvent::WsHeartbeatAck);
            Ok(false)
        },

        model::Event::Resumed => {
            session.state = SessionState::Ready;

            // No READY/SESSION_DESCRIPTION follows a RESUMED frame, so the
            // decode codec and transmit pipeline must be rebuilt here from
            // whatever the session already has persisted, rather than from
            // a freshly received payload.
            if let (Some(mode), Some(secret_key), Some(ssrc)) = (session.mode, session.secret_key.clone(), session.ssrc) {
                *decode_codec = Some(RtpCodec::new(mode, &secret_key)?);
                if let Some(udp) = udp.clone() {
                    *pipeline = Some(AudioPipeline::new(
                        udp,
                        ssrc,
                        mode,
                        secret_key,
                        transcoder.to_path_buf(),
                        outbound_tx.clone(),
                    ));
                }
            }

            events.send(PublicEvent::Resumed);
            Ok(true)
        },

        model::Event::ClientConnect(connect) => {
            // A newcomer may arrive with no known SSRC yet (it is assigned
            // lazily on their first SPEAKING); only register the binding
            // when one was actually announced (§3 RemoteUser lifecycle).
            if connect.audio_ssrc != 0 {
                let released = mux.bind(connect.audio_ssrc, connect.user_id, SpeakingState::NONE);
                for payload in released {
                    if let Some(p) = pipeline {
                        p.route_inbound(connect.audio_ssrc, payload);
                    }
                }
            }
            Ok(false)
        },

        model::Event::ClientDisconnect(disconnect) => {
            if let Some(ssrc) = mux.unbind_user(disconnect.user_id) {
                if let Some(p) = pipeline {
                    p.close_receive_stream(ssrc);
                }
            }
            Ok(false)
        },

        model::Event::Dave { op, body } => {
            overlay.prepare_transition(&body).await;
            overlay.execute_transition(&body).await;
            debug!(op, "acknowledged DAVE transition opcode");
            Ok(false)
        },

        model::Event::Unknown { op, .. } => {
            debug!(op, "unhandled voice gateway opcode");
            Ok(false)
        },

        // Client-sendable frames are never received back from the server.
        model::Event::Identify(_)
        | model::Event::SelectProtocol(_)
        | model::Event::Heartbeat(_)
        | model::Event::Resume(_) => Ok(false),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::num::NonZeroU64;

    fn params() -> ConnectParams {
        ConnectParams {
            guild_id: GuildId(NonZeroU64::new(1).unwrap()),
            channel_id: ChannelId(NonZeroU64::new(2).unwrap()),
            user_id: UserId(NonZeroU64::new(3).unwrap()),
            self_mute: false,
            self_deaf: false,
        }
    }

    #[test]
    fn session_is_not_ready_until_state_is_ready() {
        let p = params();
        let session = Session::new(&p);
        assert!(!session.is_ready());
        assert_eq!(session.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn close_before_any_server_update_resolves_immediately() {
        let (handle, mut stream) = connect(params(), Config::default());
        handle.close().await;
        assert!(matches!(stream.recv().await, Some(PublicEvent::Close)));
    }

    #[tokio::test]
    async fn pending_update_carries_requested_channel() {
        let (handle, _stream) = connect(params(), Config::default());
        let update = handle.pending_voice_state_update();
        assert_eq!(update.channel_id, Some(params().channel_id));
        assert!(!update.self_mute);
    }
}
