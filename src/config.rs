//! Session configuration.

use crate::{crypto::CryptoMode, retry::Retry};
use derivative::Derivative;
use std::time::Duration;

/// Configuration for a voice session.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct Config {
    /// Preferred AEAD modes, in order, intersected against what the server
    /// offers in `READY.modes`.
    ///
    /// Defaults to `[aead_aes256_gcm_rtpsize, aead_xchacha20_poly1305_rtpsize,
    /// xsalsa20_poly1305]`, matching spec.md §4.4's stated preference order.
    pub crypto_mode_preference: Vec<CryptoMode>,

    /// How long to wait for `SESSION_DESCRIPTION` before failing a join.
    ///
    /// Defaults to 10 seconds.
    pub join_timeout: Duration,

    /// Reconnect backoff policy.
    pub retry: Retry,

    /// Override for the executable resolved by [`crate::audio::resolve_executable`].
    ///
    /// When set, this path is used verbatim instead of probing `PATH`.
    pub transcoder_path_override: Option<std::path::PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crypto_mode_preference: vec![
                CryptoMode::Aes256GcmRtpSize,
                CryptoMode::XChaCha20Poly1305RtpSize,
                CryptoMode::XSalsa20Poly1305,
            ],
            join_timeout: Duration::from_secs(10),
            retry: Retry::default(),
            transcoder_path_override: None,
        }
    }
}

impl Config {
    /// Overrides the client's crypto-mode preference order.
    #[must_use]
    pub fn crypto_mode_preference(mut self, modes: Vec<CryptoMode>) -> Self {
        self.crypto_mode_preference = modes;
        self
    }

    /// Overrides the join deadline.
    #[must_use]
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Overrides the reconnect backoff policy.
    #[must_use]
    pub fn retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// Pins the transcoder executable path, bypassing `PATH` resolution.
    #[must_use]
    pub fn transcoder_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.transcoder_path_override = Some(path.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_preference_matches_spec_order() {
        let cfg = Config::default();
        assert_eq!(
            cfg.crypto_mode_preference,
            vec![
                CryptoMode::Aes256GcmRtpSize,
                CryptoMode::XChaCha20Poly1305RtpSize,
                CryptoMode::XSalsa20Poly1305,
            ]
        );
        assert_eq!(cfg.join_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_methods_override_defaults() {
        let cfg = Config::default()
            .join_timeout(Duration::from_secs(3))
            .transcoder_path("/usr/bin/opusenc");
        assert_eq!(cfg.join_timeout, Duration::from_secs(3));
        assert_eq!(
            cfg.transcoder_path_override,
            Some(std::path::PathBuf::from("/usr/bin/opusenc"))
        );
    }
}
