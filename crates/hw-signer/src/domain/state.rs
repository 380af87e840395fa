//! # Session State Machine
//!
//! ```text
//! Closed ──open──→ Opening ──ready──→ Ready ⇄ Signing
//!                     │                 │        │
//!                     └──────fatal──────┴────────┴──→ Failed
//!
//! any ──close──→ Closed (terminal once the session has been opened)
//! ```

use super::errors::SignerError;

/// Lifecycle state of a signing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Not opened yet, or closed
    Closed,
    /// Open requested; backend readiness not yet observed
    Opening,
    /// Backend ready; no sign in flight
    Ready,
    /// A sign operation is in flight
    Signing,
    /// A fatal error was observed; only `close` is meaningful
    Failed,
}

/// Events that drive [`SessionState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Open,
    BackendReady,
    SignStarted,
    SignFinished,
    Fatal,
    Close,
}

impl SessionState {
    /// Apply `event`, returning the next state.
    ///
    /// `opened` records whether `open` has ever succeeded in reaching the
    /// backend: a closed session is not reopenable.
    pub fn on(self, event: SessionEvent, opened: bool) -> Result<SessionState, SignerError> {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (_, Close) => Ok(Closed),

            (Closed, Open) if !opened => Ok(Opening),
            (_, Open) => Err(SignerError::AlreadyOpened),

            (Failed, _) => Ok(Failed),
            (Closed, Fatal) => Ok(Closed),
            (_, Fatal) => Ok(Failed),

            (Closed, _) if opened => Err(SignerError::Closed),
            (Closed, _) => Err(SignerError::NotOpen),

            (Opening, BackendReady) | (Ready, BackendReady) => Ok(Ready),
            (Signing, BackendReady) => Ok(Signing),

            (Opening, SignStarted) | (Ready, SignStarted) => Ok(Signing),
            (Signing, SignStarted) => Err(SignerError::SignInFlight),

            (Signing, SignFinished) => Ok(Ready),
            (state, SignFinished) => Ok(state),
        }
    }

    /// Whether `public_key` / `sign` may be attempted in this state.
    pub fn accepts_requests(self) -> bool {
        matches!(
            self,
            SessionState::Opening | SessionState::Ready | SessionState::Signing
        )
    }
}
