//! Per-user receive-stream multiplexing, keyed by SSRC and user id (§4.7).

use crate::{constants::SSRC_HOLDING_CAPACITY, events::SpeakingState, id::UserId};
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

/// A remote participant's decoded-audio state (§3 `RemoteUser`).
///
/// Created on first `SPEAKING` or client-connect; destroyed on
/// client-disconnect or session close. Decoder subprocess and
/// [`ReceiveStream`] ownership live in [`crate::audio::AudioPipeline`];
/// this struct tracks only the routing state the mux itself needs.
#[derive(Clone, Debug)]
pub struct RemoteUser {
    /// The user this entry tracks.
    pub user_id: UserId,
    /// Their current SSRC.
    pub ssrc: u32,
    /// Most recently observed speaking-flag state.
    pub speaking: SpeakingState,
    /// Timestamp of the last `SPEAKING` event or decoded RTP packet for this user.
    pub last_activity: Instant,
}

struct HeldPacket {
    ssrc: u32,
    arrived: Instant,
    payload: Vec<u8>,
}

/// Bidirectional `ssrc <-> user_id` binding table with a bounded,
/// drop-oldest holding area for datagrams that arrive before their SSRC is
/// bound to a user (§4.2/§4.7).
pub struct ReceiveMux {
    by_ssrc: HashMap<u32, RemoteUser>,
    by_user: HashMap<UserId, u32>,
    holding: VecDeque<HeldPacket>,
    bind_timeout: Duration,
}

impl ReceiveMux {
    /// Builds an empty mux; `bind_timeout` governs unmapped-SSRC eviction.
    pub fn new(bind_timeout: Duration) -> Self {
        Self {
            by_ssrc: HashMap::new(),
            by_user: HashMap::new(),
            holding: VecDeque::new(),
            bind_timeout,
        }
    }

    /// Installs an `ssrc -> user_id` binding, as delivered by a `SPEAKING`
    /// event. Returns any datagrams that were held awaiting this binding.
    pub fn bind(&mut self, ssrc: u32, user_id: UserId, speaking: SpeakingState) -> Vec<Vec<u8>> {
        if let Some(prev_ssrc) = self.by_user.insert(user_id, ssrc) {
            if prev_ssrc != ssrc {
                self.by_ssrc.remove(&prev_ssrc);
            }
        }
        self.by_ssrc
            .entry(ssrc)
            .and_modify(|u| {
                u.speaking = speaking;
                u.last_activity = Instant::now();
            })
            .or_insert_with(|| RemoteUser {
                user_id,
                ssrc,
                speaking,
                last_activity: Instant::now(),
            });

        let mut released = Vec::new();
        self.holding.retain(|held| {
            if held.ssrc == ssrc {
                released.push(held.payload.clone());
                false
            } else {
                true
            }
        });
        released
    }

    /// Removes a user on `CLIENT_DISCONNECT`, returning its last known SSRC.
    pub fn unbind_user(&mut self, user_id: UserId) -> Option<u32> {
        let ssrc = self.by_user.remove(&user_id)?;
        self.by_ssrc.remove(&ssrc);
        Some(ssrc)
    }

    /// Looks up the user bound to an inbound datagram's SSRC.
    pub fn user_for_ssrc(&self, ssrc: u32) -> Option<UserId> {
        self.by_ssrc.get(&ssrc).map(|u| u.user_id)
    }

    /// Records fresh activity for a bound SSRC (called per decoded packet).
    pub fn touch(&mut self, ssrc: u32) {
        if let Some(u) = self.by_ssrc.get_mut(&ssrc) {
            u.last_activity = Instant::now();
        }
    }

    /// Buffers a datagram for an SSRC with no known binding yet,
    /// drop-oldest once [`SSRC_HOLDING_CAPACITY`] is exceeded.
    pub fn hold_unmapped(&mut self, ssrc: u32, payload: Vec<u8>) {
        if self.holding.len() >= SSRC_HOLDING_CAPACITY {
            self.holding.pop_front();
        }
        self.holding.push_back(HeldPacket { ssrc, arrived: Instant::now(), payload });
    }

    /// Drops held datagrams older than the bind timeout (~2s, §4.7).
    pub fn evict_stale(&mut self) {
        let timeout = self.bind_timeout;
        let now = Instant::now();
        self.holding.retain(|held| now.duration_since(held.arrived) < timeout);
    }

    /// All currently bound remote users.
    pub fn users(&self) -> impl Iterator<Item = &RemoteUser> {
        self.by_ssrc.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn uid(n: u64) -> UserId {
        UserId(std::num::NonZeroU64::new(n).unwrap())
    }

    #[test]
    fn binds_and_looks_up_ssrc() {
        let mut mux = ReceiveMux::new(Duration::from_secs(2));
        mux.bind(42, uid(1), SpeakingState(1));
        assert_eq!(mux.user_for_ssrc(42), Some(uid(1)));
    }

    #[test]
    fn unbind_removes_both_directions() {
        let mut mux = ReceiveMux::new(Duration::from_secs(2));
        mux.bind(42, uid(1), SpeakingState(1));
        assert_eq!(mux.unbind_user(uid(1)), Some(42));
        assert_eq!(mux.user_for_ssrc(42), None);
    }

    #[test]
    fn held_packets_are_released_on_bind() {
        let mut mux = ReceiveMux::new(Duration::from_secs(2));
        mux.hold_unmapped(7, vec![1, 2, 3]);
        mux.hold_unmapped(7, vec![4, 5]);
        let released = mux.bind(7, uid(2), SpeakingState(1));
        assert_eq!(released, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn holding_area_drops_oldest_past_capacity() {
        let mut mux = ReceiveMux::new(Duration::from_secs(2));
        for i in 0..(SSRC_HOLDING_CAPACITY + 5) {
            mux.hold_unmapped(999, vec![i as u8]);
        }
        let released = mux.bind(999, uid(3), SpeakingState(1));
        assert_eq!(released.len(), SSRC_HOLDING_CAPACITY);
        assert_eq!(released[0], vec![5]);
    }

    #[test]
    fn rebinding_user_to_new_ssrc_drops_old_binding() {
        let mut mux = ReceiveMux::new(Duration::from_secs(2));
        mux.bind(1, uid(1), SpeakingState(1));
        mux.bind(2, uid(1), SpeakingState(1));
        assert_eq!(mux.user_for_ssrc(1), None);
        assert_eq!(mux.user_for_ssrc(2), Some(uid(1)));
    }
}
