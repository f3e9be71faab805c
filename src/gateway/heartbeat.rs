//! Periodic control-plane heartbeating with ack/timeout tracking.

use crate::model::payload::Heartbeat;
use std::time::Duration;
use tokio::time::Instant;

/// Drives the `heartbeat_interval_ms` timer for one session and tracks
/// outstanding acks. Two consecutive missed acks report a timeout; the
/// supervisor treats that as a transport fault (§4.3/§4.5).
pub struct HeartbeatEngine {
    interval: Duration,
    next_tick: Instant,
    outstanding: u8,
    last_sent_t: Option<i64>,
    last_seq_ack: Option<u64>,
    /// Fixed reference point this engine's `t` values are measured from, so
    /// `t` tracks a monotonic clock instead of wall-clock time that can step
    /// backward under NTP/manual adjustment (§4.3).
    epoch: Instant,
}

impl HeartbeatEngine {
    /// Builds an engine that ticks every `interval_ms` milliseconds, starting now.
    pub fn new(interval_ms: f64) -> Self {
        let interval = Duration::from_secs_f64((interval_ms / 1000.0).max(0.01));
        Self {
            interval,
            next_tick: Instant::now() + interval,
            outstanding: 0,
            last_sent_t: None,
            last_seq_ack: None,
            epoch: Instant::now(),
        }
    }

    /// Replaces the heartbeat interval, e.g. after a fresh `HELLO`.
    pub fn set_interval(&mut self, interval_ms: f64) {
        self.interval = Duration::from_secs_f64((interval_ms / 1000.0).max(0.01));
        self.next_tick = Instant::now() + self.interval;
    }

    /// Records the last control-sequence seen, echoed on the next heartbeat.
    pub fn observe_seq(&mut self, seq: u64) {
        self.last_seq_ack = Some(seq);
    }

    /// The instant the next heartbeat tick is due.
    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Builds the next heartbeat frame, marking one ack as outstanding.
    ///
    /// Returns `Err(())` if two consecutive intervals elapsed with no ack --
    /// the caller should surface `HeartbeatTimeout` and stop this engine.
    pub fn tick(&mut self) -> Result<Heartbeat, ()> {
        if self.outstanding >= 2 {
            return Err(());
        }

        self.outstanding += 1;
        self.next_tick = Instant::now() + self.interval;

        let t = self.monotonic_ms();
        self.last_sent_t = Some(t);

        Ok(Heartbeat {
            t,
            seq_ack: self.last_seq_ack,
        })
    }

    /// Processes an incoming ack, returning round-trip latency in milliseconds
    /// if it matched the most recently sent heartbeat.
    pub fn ack(&mut self, acked_t: i64) -> Option<i64> {
        self.outstanding = self.outstanding.saturating_sub(1);
        match self.last_sent_t {
            Some(sent) if sent == acked_t => Some(self.monotonic_ms() - sent),
            _ => None,
        }
    }

    /// Milliseconds elapsed since this engine's `epoch`, monotonic for the
    /// life of the engine regardless of wall-clock adjustments.
    fn monotonic_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_tick_succeeds_and_tracks_outstanding() {
        let mut hb = HeartbeatEngine::new(1000.0);
        assert!(hb.tick().is_ok());
        assert_eq!(hb.outstanding, 1);
    }

    #[test]
    fn two_unacked_ticks_report_timeout() {
        let mut hb = HeartbeatEngine::new(1000.0);
        assert!(hb.tick().is_ok());
        assert!(hb.tick().is_ok());
        assert!(hb.tick().is_err());
    }

    #[test]
    fn ack_clears_outstanding_and_reports_latency() {
        let mut hb = HeartbeatEngine::new(1000.0);
        let sent = hb.tick().unwrap();
        let latency = hb.ack(sent.t);
        assert_eq!(hb.outstanding, 0);
        assert!(latency.unwrap() >= 0);
    }

    #[test]
    fn mismatched_ack_reports_no_latency() {
        let mut hb = HeartbeatEngine::new(1000.0);
        let sent = hb.tick().unwrap();
        assert!(hb.ack(sent.t - 1).is_none());
    }
}
