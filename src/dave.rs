//! DAVE (MLS-based end-to-end media encryption) stub.
//!
//! The core must recognize DAVE's control opcodes and acknowledge
//! transitions so the session is not dropped, but need not implement MLS
//! itself (spec.md §1/§9). `MediaSecurityOverlay` is the extension point a
//! future, real implementation would plug into; [`NullOverlay`] answers
//! every transition with a no-op so protocol version 0 sessions behave
//! exactly as if DAVE were absent.

use async_trait::async_trait;
use serde_json::Value;

/// Pluggable hook for a DAVE/MLS implementation.
///
/// A session running protocol version 0 never needs a non-stub overlay;
/// this trait exists so a caller may supply a real MLS stack without the
/// supervisor's state machine changing shape.
#[async_trait]
pub trait MediaSecurityOverlay: Send + Sync {
    /// A `DAVE_PREPARE_TRANSITION`-class opcode arrived; the overlay may
    /// stage whatever state it needs before `execute_transition` commits.
    async fn prepare_transition(&self, body: &Value);

    /// A `DAVE_EXECUTE_TRANSITION`-class opcode arrived; the overlay
    /// commits the staged transition.
    async fn execute_transition(&self, body: &Value);

    /// An MLS key package for a remote participant arrived.
    async fn process_key_package(&self, body: &Value);

    /// An MLS commit/welcome message arrived.
    async fn process_commit_welcome(&self, body: &Value);
}

/// No-op overlay used whenever a caller does not supply a real MLS stack.
///
/// Keeps protocol version 0 sessions alive across DAVE transitions without
/// performing any cryptographic work; media stays under the transport-mode
/// AEAD negotiated in `SESSION_DESCRIPTION`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullOverlay;

#[async_trait]
impl MediaSecurityOverlay for NullOverlay {
    async fn prepare_transition(&self, _body: &Value) {}

    async fn execute_transition(&self, _body: &Value) {}

    async fn process_key_package(&self, _body: &Value) {}

    async fn process_commit_welcome(&self, _body: &Value) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn null_overlay_accepts_every_transition() {
        let overlay = NullOverlay;
        let body = serde_json::json!({});
        overlay.prepare_transition(&body).await;
        overlay.execute_transition(&body).await;
        overlay.process_key_package(&body).await;
        overlay.process_commit_welcome(&body).await;
    }
}
