//! Transmit and receive audio pipelines, fronting external encoder/decoder
//! subprocesses (§4.6).

use crate::{
    constants::{SILENCE_FRAME, SILENCE_FRAME_COUNT, TIMESTEP_LENGTH},
    crypto::{CryptoMode, RtpCodec, RtpHeader},
    error::{Error, Result},
    events::SpeakingState,
    id::UserId,
    transport::UdpTransport,
};
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    time::interval,
};
use tracing::{debug, warn};

/// Locates the transcoder executable, probing `PATH` the way a shell would
/// (`command -v` on POSIX, `where` on Windows), unless a path override is
/// configured (§6 "External process dependencies").
pub async fn resolve_executable(name: &str, override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = override_path {
        return Ok(p.to_path_buf());
    }

    let output = if cfg!(windows) {
        Command::new("where").arg(name).output().await?
    } else {
        Command::new("sh").arg("-c").arg(format!("command -v {name}")).output().await?
    };

    if !output.status.success() {
        return Err(Error::Protocol("transcoder executable not found on PATH"));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().map(str::trim).filter(|s| !s.is_empty());
    first.map(PathBuf::from).ok_or(Error::Protocol("PATH resolution produced no output"))
}

/// A caller-facing handle to one remote user's decoded PCM output.
pub struct ReceiveStream {
    user_id: UserId,
    rx: flume::Receiver<Vec<u8>>,
}

impl ReceiveStream {
    /// The user this stream carries audio for.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Reads the next decoded PCM frame, or `None` once the decoder exits
    /// or the stream is closed.
    pub async fn read_frame(&mut self) -> Option<Vec<u8>> {
        self.rx.recv_async().await.ok()
    }

    /// Reads the next frame only if it belongs to `user_id`; otherwise
    /// returns `None` immediately without consuming anything.
    pub async fn read_frame_for(&mut self, user_id: UserId) -> Option<Vec<u8>> {
        if user_id != self.user_id {
            return None;
        }
        self.read_frame().await
    }

    /// Drops this handle; the underlying decoder is torn down once every
    /// handle and the pipeline's own reference are gone.
    pub fn close(self) {}
}

/// Outbound control messages a transmit burst raises for the supervisor to
/// forward over the gateway (speaking-flag protocol, §4.6).
#[derive(Clone, Debug)]
pub enum PipelineOutbound {
    /// The transmit burst's speaking flags changed; forward as a `SPEAKING` frame.
    Speaking(SpeakingState),
    /// The RTP nonce counter is exhausted; the supervisor must close the
    /// session rather than let a send reuse a nonce (§4.4 invariant).
    ForceClose,
}

struct TransmitHandle {
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

/// Transmit and receive audio pumps for one session.
///
/// Owns no WebSocket or supervisor state directly; it raises
/// [`PipelineOutbound`] messages for the supervisor to relay, per spec.md
/// §9's one-owner re-architecture note.
pub struct AudioPipeline {
    udp: Arc<UdpTransport>,
    ssrc: u32,
    mode: CryptoMode,
    secret_key: Vec<u8>,
    transcoder: PathBuf,
    outbound: flume::Sender<PipelineOutbound>,
    active: Option<TransmitHandle>,
    decoders: Vec<(u32, flume::Sender<Vec<u8>>)>,
}

impl AudioPipeline {
    /// Builds a pipeline bound to one session's UDP transport, SSRC, and
    /// negotiated encryption mode/key.
    pub fn new(
        udp: Arc<UdpTransport>,
        ssrc: u32,
        mode: CryptoMode,
        secret_key: Vec<u8>,
        transcoder: PathBuf,
        outbound: flume::Sender<PipelineOutbound>,
    ) -> Self {
        Self {
            udp,
            ssrc,
            mode,
            secret_key,
            transcoder,
            outbound,
            active: None,
            decoders: Vec::new(),
        }
    }

    /// Whether a transmission is currently active.
    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    /// Spawns the encoder subprocess and begins pumping `source` (raw
    /// little-endian 16-bit PCM) to the voice server at 20ms cadence.
    ///
    /// Fails with [`Error::AudioAlreadyPlaying`] if a transmission is
    /// already active (§4.6, §8 invariant).
    pub async fn play<R>(&mut self, mut source: R, volume: f32, stereo: bool) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        if self.active.is_some() {
            return Err(Error::AudioAlreadyPlaying);
        }

        let mut child = Command::new(&self.transcoder)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let mut child_stdin = child.stdin.take().expect("piped stdin");
        let mut child_stdout = child.stdout.take().expect("piped stdout");

        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let feeder_stop = stop.clone();
        tokio::spawn(async move {
            let mut pcm_buf = vec![0u8; 4096];
            loop {
                if feeder_stop.load(Ordering::Relaxed) {
                    break;
                }
                let n = match source.read(&mut pcm_buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                apply_gain(&mut pcm_buf[..n], volume);
                if child_stdin.write_all(&pcm_buf[..n]).await.is_err() {
                    break;
                }
            }
        });

        let udp = self.udp.clone();
        let mut codec = RtpCodec::new(self.mode, &self.secret_key)?;
        let ssrc = self.ssrc;
        let outbound = self.outbound.clone();
        let paused_task = paused.clone();
        let stop_task = stop.clone();
        let frame_samples = if stereo { 960 * 2 } else { 960 };

        let task = tokio::spawn(async move {
            let mut sequence: u16 = 0;
            let mut timestamp: u32 = 0;
            let mut ticker = interval(TIMESTEP_LENGTH);
            let mut speaking_sent = false;
            let mut frame_len_buf = [0u8; 2];

            loop {
                ticker.tick().await;

                if stop_task.load(Ordering::Relaxed) {
                    break;
                }
                if paused_task.load(Ordering::Relaxed) {
                    continue;
                }

                match child_stdout.read_exact(&mut frame_len_buf).await {
                    Ok(()) => {},
                    Err(_) => break,
                }
                let len = u16::from_be_bytes(frame_len_buf) as usize;
                let mut frame = vec![0u8; len];
                if child_stdout.read_exact(&mut frame).await.is_err() {
                    break;
                }

                if !speaking_sent {
                    outbound.send(PipelineOutbound::Speaking(SpeakingState(1))).ok();
                    speaking_sent = true;
                }

                let header = RtpHeader { sequence, timestamp, ssrc };
                match codec.encode(header, &frame) {
                    Ok(datagram) => {
                        if udp.send(&datagram).await.is_err() {
                            break;
                        }
                    },
                    Err(Error::NonceExhausted) => {
                        warn!("rtp nonce counter exhausted, forcing session close");
                        outbound.send(PipelineOutbound::ForceClose).ok();
                        break;
                    },
                    Err(e) => {
                        warn!(?e, "failed to encode outgoing RTP frame");
                        break;
                    },
                }

                sequence = sequence.wrapping_add(1);
                timestamp = timestamp.wrapping_add(frame_samples as u32);
            }

            if speaking_sent {
                send_silence(&udp, &mut codec, ssrc, &mut sequence, &mut timestamp, frame_samples).await;
                outbound.send(PipelineOutbound::Speaking(SpeakingState::NONE)).ok();
            }
        });

        self.active = Some(TransmitHandle { paused, stop, task });
        Ok(())
    }

    /// Stops feeding frames without emitting the silence/flags-off tail.
    pub fn pause(&self) {
        if let Some(active) = &self.active {
            active.paused.store(true, Ordering::Relaxed);
        }
    }

    /// Resumes a paused transmission.
    pub fn resume(&self) {
        if let Some(active) = &self.active {
            active.paused.store(false, Ordering::Relaxed);
        }
    }

    /// Stops transmission, emitting the silence tail and flags-off.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Relaxed);
            let _ = active.task.await;
        }
    }

    /// Routes an inbound decoded datagram to the decoder for `ssrc`,
    /// spawning one on first contact.
    pub fn route_inbound(&mut self, ssrc: u32, framed_opus: Vec<u8>) {
        if let Some((_, tx)) = self.decoders.iter().find(|(s, _)| *s == ssrc) {
            let _ = tx.send(framed_opus);
        } else {
            debug!(ssrc, "dropping inbound frame for unknown decoder");
        }
    }

    /// Spawns a decoder subprocess for `ssrc` and returns a [`ReceiveStream`]
    /// for `user_id`. Subsequent calls for the same SSRC are ignored.
    pub async fn open_receive_stream(
        &mut self,
        ssrc: u32,
        user_id: UserId,
        transcoder: &Path,
    ) -> Result<ReceiveStream> {
        if self.decoders.iter().any(|(s, _)| *s == ssrc) {
            return Err(Error::Protocol("decoder already open for this ssrc"));
        }

        let mut child = Command::new(transcoder)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let mut child_stdin = child.stdin.take().expect("piped stdin");
        let mut child_stdout = child.stdout.take().expect("piped stdout");

        let (in_tx, in_rx) = flume::unbounded::<Vec<u8>>();
        let (out_tx, out_rx) = flume::unbounded::<Vec<u8>>();

        tokio::spawn(async move {
            while let Ok(framed) = in_rx.recv_async().await {
                let len = (framed.len() as u16).to_be_bytes();
                if child_stdin.write_all(&len).await.is_err() {
                    break;
                }
                if child_stdin.write_all(&framed).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let _keepalive = child;
            let mut len_buf = [0u8; 2];
            loop {
                if child_stdout.read_exact(&mut len_buf).await.is_err() {
                    break;
                }
                let len = u16::from_be_bytes(len_buf) as usize;
                let mut pcm = vec![0u8; len];
                if child_stdout.read_exact(&mut pcm).await.is_err() {
                    break;
                }
                if out_tx.send(pcm).is_err() {
                    break;
                }
            }
        });

        self.decoders.push((ssrc, in_tx));
        Ok(ReceiveStream { user_id, rx: out_rx })
    }

    /// Tears down the decoder for a disconnected user's SSRC.
    pub fn close_receive_stream(&mut self, ssrc: u32) {
        self.decoders.retain(|(s, _)| *s != ssrc);
    }
}

async fn send_silence(
    udp: &UdpTransport,
    codec: &mut RtpCodec,
    ssrc: u32,
    sequence: &mut u16,
    timestamp: &mut u32,
    frame_samples: usize,
) {
    for _ in 0..SILENCE_FRAME_COUNT {
        let header = RtpHeader { sequence: *sequence, timestamp: *timestamp, ssrc };
        if let Ok(datagram) = codec.encode(header, &SILENCE_FRAME) {
            let _ = udp.send(&datagram).await;
        }
        *sequence = sequence.wrapping_add(1);
        *timestamp = timestamp.wrapping_add(frame_samples as u32);
    }
}

/// Applies a scalar gain to interleaved little-endian 16-bit PCM samples,
/// clamping to `i16::MIN..=i16::MAX` (§4.6).
fn apply_gain(buf: &mut [u8], volume: f32) {
    if (volume - 1.0).abs() < f32::EPSILON {
        return;
    }
    for chunk in buf.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        let scaled = (sample as f32 * volume).clamp(i16::MIN as f32, i16::MAX as f32);
        let out = (scaled.round() as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        chunk.copy_from_slice(&out.to_le_bytes());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gain_one_is_a_no_op() {
        let mut buf = 440i16.to_le_bytes().to_vec();
        apply_gain(&mut buf, 1.0);
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), 440);
    }

    #[test]
    fn gain_clamps_to_i16_range() {
        let mut buf = 30000i16.to_le_bytes().to_vec();
        apply_gain(&mut buf, 2.0);
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), i16::MAX);
    }

    #[test]
    fn gain_clamps_negative_overflow() {
        let mut buf = (-30000i16).to_le_bytes().to_vec();
        apply_gain(&mut buf, 2.0);
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), i16::MIN);
    }

    #[tokio::test]
    async fn resolve_executable_honors_override() {
        let path = resolve_executable("anything", Some(Path::new("/custom/opus"))).await.unwrap();
        assert_eq!(path, PathBuf::from("/custom/opus"));
    }

    #[tokio::test]
    async fn resolve_executable_finds_sh_on_posix() {
        if cfg!(windows) {
            return;
        }
        let path = resolve_executable("sh", None).await.unwrap();
        assert!(path.ends_with("sh"));
    }
}
