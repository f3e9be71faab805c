//! RTP framing and AEAD encryption/decryption (§3/§4.1).
//!
//! Three modes are supported: the two current `*_rtpsize` AEAD modes, and
//! the legacy `xsalsa20_poly1305` scheme kept for servers that have not
//! rolled the rtpsize modes out yet.

use crate::{
    constants::{RTP_HEADER_LEN, RTP_PAYLOAD_TYPE_BYTE, RTP_VERSION_BYTE},
    error::{Error, Result},
};
use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace},
    Aes256Gcm,
    KeyInit as AesKeyInit,
};
use byteorder::{BigEndian, ByteOrder};
use chacha20poly1305::XChaCha20Poly1305;
use std::num::Wrapping;
use xsalsa20poly1305::XSalsa20Poly1305;

/// Size of a secret key, in bytes, across every supported mode.
pub const KEY_SIZE: usize = 32;
/// Size of an AEAD authentication tag, in bytes.
pub const TAG_SIZE: usize = 16;

/// One of the three encryption modes a server may negotiate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CryptoMode {
    /// `aead_aes256_gcm_rtpsize`: 12-byte nonce, 32-bit BE counter suffix.
    Aes256GcmRtpSize,
    /// `aead_xchacha20_poly1305_rtpsize`: 24-byte nonce, 32-bit BE counter suffix.
    XChaCha20Poly1305RtpSize,
    /// `xsalsa20_poly1305`: legacy, nonce is the header alone, no suffix.
    XSalsa20Poly1305,
}

impl CryptoMode {
    /// The wire name used during `SELECT_PROTOCOL`/`READY.modes` negotiation.
    pub fn to_request_str(self) -> &'static str {
        match self {
            Self::Aes256GcmRtpSize => "aead_aes256_gcm_rtpsize",
            Self::XChaCha20Poly1305RtpSize => "aead_xchacha20_poly1305_rtpsize",
            Self::XSalsa20Poly1305 => "xsalsa20_poly1305",
        }
    }

    /// Parses a mode name as offered by the server.
    pub fn from_request_str(s: &str) -> Option<Self> {
        match s {
            "aead_aes256_gcm_rtpsize" => Some(Self::Aes256GcmRtpSize),
            "aead_xchacha20_poly1305_rtpsize" => Some(Self::XChaCha20Poly1305RtpSize),
            "xsalsa20_poly1305" => Some(Self::XSalsa20Poly1305),
            _ => None,
        }
    }

    /// AEAD nonce width for this mode.
    fn nonce_size(self) -> usize {
        match self {
            Self::Aes256GcmRtpSize => 12,
            Self::XChaCha20Poly1305RtpSize => 24,
            Self::XSalsa20Poly1305 => 24,
        }
    }

    /// Whether this mode appends an unencrypted 4-byte counter after the tag.
    fn has_counter_suffix(self) -> bool {
        !matches!(self, Self::XSalsa20Poly1305)
    }
}

/// The fixed 12-byte RTP header (§3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RtpHeader {
    /// Packet sequence number; increments by 1 per packet, wraps at 2^16.
    pub sequence: u16,
    /// Sample-clock timestamp; increments by the frame's sample count.
    pub timestamp: u32,
    /// The stream's synchronization source identifier.
    pub ssrc: u32,
}

impl RtpHeader {
    /// Encodes this header to its fixed 12-byte wire form.
    pub fn to_bytes(self) -> [u8; RTP_HEADER_LEN] {
        let mut out = [0u8; RTP_HEADER_LEN];
        out[0] = RTP_VERSION_BYTE;
        out[1] = RTP_PAYLOAD_TYPE_BYTE;
        BigEndian::write_u16(&mut out[2..4], self.sequence);
        BigEndian::write_u32(&mut out[4..8], self.timestamp);
        BigEndian::write_u32(&mut out[8..12], self.ssrc);
        out
    }

    /// Parses a header from the front of an inbound datagram, checking the
    /// fixed version/payload-type bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RTP_HEADER_LEN {
            return Err(Error::Protocol("RTP packet shorter than header"));
        }
        if bytes[0] != RTP_VERSION_BYTE || bytes[1] != RTP_PAYLOAD_TYPE_BYTE {
            return Err(Error::Protocol("unexpected RTP version/payload-type byte"));
        }
        Ok(Self {
            sequence: BigEndian::read_u16(&bytes[2..4]),
            timestamp: BigEndian::read_u32(&bytes[4..8]),
            ssrc: BigEndian::read_u32(&bytes[8..12]),
        })
    }
}

enum Cipher {
    Aes256Gcm(Box<Aes256Gcm>),
    XChaCha20(Box<XChaCha20Poly1305>),
    XSalsa20(Box<XSalsa20Poly1305>),
}

/// Encodes and decodes RTP audio datagrams under one negotiated mode and key.
///
/// Owns the monotonically increasing nonce counter used by the two rtpsize
/// modes; the legacy mode derives its nonce from the header and carries no
/// counter state, so it is exempt from the nonce-exhaustion invariant.
pub struct RtpCodec {
    mode: CryptoMode,
    cipher: Cipher,
    nonce_counter: Wrapping<u32>,
}

impl RtpCodec {
    /// Builds a codec for `mode` keyed with `key` (must be [`KEY_SIZE`] bytes).
    pub fn new(mode: CryptoMode, key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(Error::CryptoInvalidLength);
        }

        let cipher = match mode {
            CryptoMode::Aes256GcmRtpSize =>
                Cipher::Aes256Gcm(Box::new(Aes256Gcm::new(GenericArray::from_slice(key)))),
            CryptoMode::XChaCha20Poly1305RtpSize =>
                Cipher::XChaCha20(Box::new(XChaCha20Poly1305::new(GenericArray::from_slice(key)))),
            CryptoMode::XSalsa20Poly1305 =>
                Cipher::XSalsa20(Box::new(XSalsa20Poly1305::new(GenericArray::from_slice(key)))),
        };

        Ok(Self { mode, cipher, nonce_counter: Wrapping(0) })
    }

    /// Encrypts `plaintext` into a full RTP datagram: header ∥ ciphertext ∥
    /// tag ∥ (4-byte counter, for the rtpsize modes).
    pub fn encode(&mut self, header: RtpHeader, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.mode.has_counter_suffix() && self.nonce_counter.0 == u32::MAX {
            return Err(Error::NonceExhausted);
        }

        let header_bytes = header.to_bytes();
        let mut body = plaintext.to_vec();

        let (tag, counter) = match &mut self.cipher {
            Cipher::XSalsa20(c) => {
                let mut nonce = [0u8; 24];
                nonce[..RTP_HEADER_LEN].copy_from_slice(&header_bytes);
                let tag = c
                    .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &header_bytes, &mut body)
                    .map_err(|_| Error::Protocol("encryption failure"))?;
                (tag.to_vec(), None)
            },
            Cipher::Aes256Gcm(c) => {
                let counter = self.nonce_counter.0;
                self.nonce_counter += Wrapping(1);
                let mut nonce = [0u8; 12];
                BigEndian::write_u32(&mut nonce[8..12], counter);
                let tag = c
                    .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &header_bytes, &mut body)
                    .map_err(|_| Error::Protocol("encryption failure"))?;
                (tag.to_vec(), Some(counter))
            },
            Cipher::XChaCha20(c) => {
                let counter = self.nonce_counter.0;
                self.nonce_counter += Wrapping(1);
                let mut nonce = [0u8; 24];
                BigEndian::write_u32(&mut nonce[20..24], counter);
                let tag = c
                    .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &header_bytes, &mut body)
                    .map_err(|_| Error::Protocol("encryption failure"))?;
                (tag.to_vec(), Some(counter))
            },
        };

        let mut out = Vec::with_capacity(header_bytes.len() + body.len() + tag.len() + 4);
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&body);
        out.extend_from_slice(&tag);
        if let Some(counter) = counter {
            let mut suffix = [0u8; 4];
            BigEndian::write_u32(&mut suffix, counter);
            out.extend_from_slice(&suffix);
        }

        Ok(out)
    }

    /// Decrypts an inbound datagram. Returns the header and plaintext, or
    /// `Error::DecryptFailed` on any authentication failure -- the caller
    /// must drop the packet and count the failure, not close the session.
    pub fn decode(&self, packet: &[u8]) -> Result<(RtpHeader, Vec<u8>)> {
        let header = RtpHeader::from_bytes(packet)?;
        let header_bytes = header.to_bytes();

        let suffix_len = if self.mode.has_counter_suffix() { 4 } else { 0 };
        if packet.len() < RTP_HEADER_LEN + TAG_SIZE + suffix_len {
            return Err(Error::DecryptFailed);
        }

        let body_end = packet.len() - suffix_len;
        let (tag_start, nonce_suffix) = (body_end - TAG_SIZE, &packet[body_end..]);
        let mut ciphertext = packet[RTP_HEADER_LEN..tag_start].to_vec();
        let tag = &packet[tag_start..body_end];

        match &self.cipher {
            Cipher::XSalsa20(c) => {
                let mut nonce = [0u8; 24];
                nonce[..RTP_HEADER_LEN].copy_from_slice(&header_bytes);
                c.decrypt_in_place_detached(
                    GenericArray::from_slice(&nonce),
                    &header_bytes,
                    &mut ciphertext,
                    GenericArray::from_slice(tag),
                )
                .map_err(|_| Error::DecryptFailed)?;
            },
            Cipher::Aes256Gcm(c) => {
                let mut nonce = [0u8; 12];
                nonce[8..12].copy_from_slice(nonce_suffix);
                c.decrypt_in_place_detached(
                    GenericArray::from_slice(&nonce),
                    &header_bytes,
                    &mut ciphertext,
                    GenericArray::from_slice(tag),
                )
                .map_err(|_| Error::DecryptFailed)?;
            },
            Cipher::XChaCha20(c) => {
                let mut nonce = [0u8; 24];
                nonce[20..24].copy_from_slice(nonce_suffix);
                c.decrypt_in_place_detached(
                    GenericArray::from_slice(&nonce),
                    &header_bytes,
                    &mut ciphertext,
                    GenericArray::from_slice(tag),
                )
                .map_err(|_| Error::DecryptFailed)?;
            },
        }

        Ok((header, ciphertext))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];

    fn header(seq: u16) -> RtpHeader {
        RtpHeader { sequence: seq, timestamp: seq as u32 * 960, ssrc: 42 }
    }

    #[test]
    fn round_trips_under_every_mode() {
        for mode in [
            CryptoMode::Aes256GcmRtpSize,
            CryptoMode::XChaCha20Poly1305RtpSize,
            CryptoMode::XSalsa20Poly1305,
        ] {
            let mut enc = RtpCodec::new(mode, &KEY).unwrap();
            let dec = RtpCodec::new(mode, &KEY).unwrap();

            let packet = enc.encode(header(1), b"opus frame bytes").unwrap();
            let (hdr, plain) = dec.decode(&packet).unwrap();

            assert_eq!(hdr, header(1));
            assert_eq!(plain, b"opus frame bytes");
        }
    }

    #[test]
    fn tampering_tag_fails_closed() {
        let mut enc = RtpCodec::new(CryptoMode::Aes256GcmRtpSize, &KEY).unwrap();
        let dec = RtpCodec::new(CryptoMode::Aes256GcmRtpSize, &KEY).unwrap();

        let mut packet = enc.encode(header(1), b"hello").unwrap();
        let last = packet.len() - 5; // inside the tag, before the counter suffix
        packet[last] ^= 0xff;

        assert!(matches!(dec.decode(&packet), Err(Error::DecryptFailed)));
    }

    #[test]
    fn nonce_counter_increases_per_packet() {
        let mut enc = RtpCodec::new(CryptoMode::Aes256GcmRtpSize, &KEY).unwrap();
        let a = enc.encode(header(1), b"x").unwrap();
        let b = enc.encode(header(2), b"x").unwrap();
        let counter_a = &a[a.len() - 4..];
        let counter_b = &b[b.len() - 4..];
        assert_ne!(counter_a, counter_b);
    }

    #[test]
    fn legacy_mode_carries_no_counter_suffix() {
        let mut enc = RtpCodec::new(CryptoMode::XSalsa20Poly1305, &KEY).unwrap();
        let packet = enc.encode(header(1), b"hi").unwrap();
        assert_eq!(packet.len(), RTP_HEADER_LEN + 2 + TAG_SIZE);
    }

    #[test]
    fn request_str_round_trips() {
        for mode in [
            CryptoMode::Aes256GcmRtpSize,
            CryptoMode::XChaCha20Poly1305RtpSize,
            CryptoMode::XSalsa20Poly1305,
        ] {
            assert_eq!(CryptoMode::from_request_str(mode.to_request_str()), Some(mode));
        }
    }
}
