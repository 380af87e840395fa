//! # Signing Session Service
//!
//! Application service implementing the `SigningSessionApi` inbound port
//! over one [`SigningBackend`].
//!
//! ## Responsibilities
//!
//! - Drives the [`SessionState`] machine and rejects out-of-order calls
//! - Serializes sign calls (later calls queue behind the one in flight)
//! - Holds the continuation token steady for the life of the session
//! - Records the first fatal error and reports it to every later caller

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::adapters::local::LocalHardwareBackend;
use crate::adapters::remote::RemoteHelperBackend;
use crate::config::{build_backend, ConfigError, SignerConfig};
use crate::domain::entities::{ContinuationToken, PublicKeyRecord, SignOutcome};
use crate::domain::errors::SignerError;
use crate::domain::state::{SessionEvent, SessionState};
use crate::ports::inbound::SigningSessionApi;
use crate::ports::outbound::{BackendKind, DeviceConnector, SigningBackend};

/// Mutable session bookkeeping, guarded as one unit.
#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    opened: bool,
    failure: Option<SignerError>,
    token: ContinuationToken,
}

impl Lifecycle {
    fn apply(&mut self, event: SessionEvent) -> Result<SessionState, SignerError> {
        if self.state == SessionState::Failed && event != SessionEvent::Close {
            if let Some(cause) = &self.failure {
                return Err(SignerError::Failed(Box::new(cause.clone())));
            }
        }
        self.state = self.state.on(event, self.opened)?;
        Ok(self.state)
    }
}

/// A hardware-backed signing session.
pub struct SigningSession {
    backend: Box<dyn SigningBackend>,
    lifecycle: Mutex<Lifecycle>,
    sign_guard: tokio::sync::Mutex<()>,
    public_key: OnceLock<PublicKeyRecord>,
}

impl SigningSession {
    pub fn new(backend: Box<dyn SigningBackend>) -> Self {
        Self {
            backend,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Closed,
                opened: false,
                failure: None,
                token: ContinuationToken::empty(),
            }),
            sign_guard: tokio::sync::Mutex::new(()),
            public_key: OnceLock::new(),
        }
    }

    /// Session over a helper executable.
    pub fn remote(program: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(RemoteHelperBackend::new(program)))
    }

    /// Session over a locally attached device.
    pub fn local(candidate_paths: Vec<PathBuf>, devices: Arc<dyn DeviceConnector>) -> Self {
        Self::new(Box::new(LocalHardwareBackend::new(candidate_paths, devices)))
    }

    /// Session over the backend selected by `config`.
    pub fn from_config(
        config: &SignerConfig,
        devices: Arc<dyn DeviceConnector>,
    ) -> Result<Self, ConfigError> {
        build_backend(config, devices).map(Self::new)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// The token established so far (empty until one is known).
    pub fn token(&self) -> ContinuationToken {
        self.lifecycle.lock().token.clone()
    }

    /// The first fatal error observed, if any.
    pub fn failure(&self) -> Option<SignerError> {
        self.lifecycle.lock().failure.clone()
    }

    fn transition(&self, event: SessionEvent) -> Result<SessionState, SignerError> {
        self.lifecycle.lock().apply(event)
    }

    /// Fail fast unless the session can take a request right now.
    fn admit(&self) -> Result<(), SignerError> {
        let lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            state if state.accepts_requests() => Ok(()),
            SessionState::Failed => Err(SignerError::Failed(Box::new(
                lifecycle.failure.clone().unwrap_or(SignerError::Closed),
            ))),
            SessionState::Closed if lifecycle.opened => Err(SignerError::Closed),
            _ => Err(SignerError::NotOpen),
        }
    }

    /// Route a backend error through the state machine and hand it back.
    fn observe(&self, err: SignerError) -> SignerError {
        if err.is_fatal() {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != SessionState::Closed {
                error!(error = %err, state = ?lifecycle.state, "Signing session failed");
                if lifecycle.failure.is_none() {
                    lifecycle.failure = Some(err.clone());
                }
                let _ = lifecycle.apply(SessionEvent::Fatal);
            }
        }
        err
    }

    /// Establish the token on first sight, reject a different one later.
    fn check_token(&self, token: &ContinuationToken) -> Result<(), SignerError> {
        if token.is_empty() {
            return Ok(());
        }

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.token.is_empty() {
            lifecycle.token = token.clone();
            Ok(())
        } else if lifecycle.token == *token {
            Ok(())
        } else {
            warn!(
                expected_len = lifecycle.token.as_str().len(),
                actual_len = token.as_str().len(),
                "Continuation token changed within a session"
            );
            Err(SignerError::TokenMismatch)
        }
    }
}

/// Returns the session to `Ready` when a sign ends, including when the
/// caller abandons it.
struct InFlightSign<'a> {
    session: &'a SigningSession,
}

impl Drop for InFlightSign<'_> {
    fn drop(&mut self) {
        let _ = self.session.transition(SessionEvent::SignFinished);
    }
}

#[async_trait]
impl SigningSessionApi for SigningSession {
    async fn open(&self, token: ContinuationToken) -> Result<(), SignerError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.apply(SessionEvent::Open)?;
            lifecycle.opened = true;
            lifecycle.token = token.clone();
        }

        match self.backend.open(&token).await {
            Ok(()) => {
                info!(
                    backend = ?self.backend.kind(),
                    resume = !token.is_empty(),
                    "Signing session opened"
                );
                Ok(())
            }
            Err(err) => Err(self.observe(err)),
        }
    }

    async fn public_key(&self) -> Result<PublicKeyRecord, SignerError> {
        self.admit()?;
        if let Some(public_key) = self.public_key.get() {
            return Ok(public_key.clone());
        }

        let public_key = self
            .backend
            .public_key()
            .await
            .map_err(|err| self.observe(err))?;

        self.transition(SessionEvent::BackendReady)?;
        Ok(self.public_key.get_or_init(|| public_key).clone())
    }

    async fn sign(&self, message: &[u8]) -> Result<SignOutcome, SignerError> {
        self.admit()?;
        let _queued = self.sign_guard.lock().await;

        // Close or a fatal error may have landed while queued.
        self.admit()?;
        self.transition(SessionEvent::SignStarted)?;
        let _in_flight = InFlightSign { session: self };

        let outcome = self
            .backend
            .sign(message)
            .await
            .map_err(|err| self.observe(err))?;

        self.check_token(&outcome.token)
            .map_err(|err| self.observe(err))?;

        Ok(outcome)
    }

    async fn close(&self) {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            let previous = lifecycle.state;
            let _ = lifecycle.apply(SessionEvent::Close);
            previous
        };

        self.backend.close().await;

        if previous != SessionState::Closed {
            info!(backend = ?self.backend.kind(), from = ?previous, "Signing session closed");
        }
    }

    fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }
}
