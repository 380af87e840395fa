//! # Remote Helper Backend
//!
//! Brokers Open/PublicKey/Sign/Close through a long-lived helper process
//! speaking the newline-delimited JSON protocol. Each request produces
//! exactly one response frame; a sign completes when the frame counter
//! advances past the value sampled before its request was written.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::OnceLock;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::protocol;
use super::supervisor::HelperProcess;
use crate::domain::entities::{
    ContinuationToken, HelperRequest, PublicKeyRecord, SignOutcome, SignatureRecord,
};
use crate::domain::errors::SignerError;
use crate::ports::outbound::{BackendKind, SigningBackend};

/// Signing backend driving an external helper executable.
pub struct RemoteHelperBackend {
    program: PathBuf,
    helper: OnceLock<HelperProcess>,
    sign_guard: tokio::sync::Mutex<()>,
}

impl RemoteHelperBackend {
    /// The helper is not started until `open`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            helper: OnceLock::new(),
            sign_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Helper process id, once spawned.
    pub fn pid(&self) -> Option<u32> {
        self.helper.get().and_then(HelperProcess::pid)
    }

    /// Exit status of the helper, once it has exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.helper.get().and_then(HelperProcess::exit_status)
    }

    /// Diagnostics the helper has written so far.
    pub fn diagnostics(&self) -> String {
        self.helper
            .get()
            .map(HelperProcess::diagnostics)
            .unwrap_or_default()
    }

    fn helper(&self) -> Result<&HelperProcess, SignerError> {
        self.helper.get().ok_or(SignerError::NotOpen)
    }

    /// The error to report once the reader has stopped without answering.
    ///
    /// Waits for exit (or close) so a non-zero exit carries its diagnostics.
    async fn settled_failure(helper: &HelperProcess) -> SignerError {
        helper.wait_exit_or_close().await;
        if let Some(failure) = helper.failure() {
            failure
        } else if helper.is_closing() {
            SignerError::Closed
        } else {
            SignerError::HelperClosedStream
        }
    }

    /// Wait for the open response and fail fast on a recorded error.
    async fn await_ready(helper: &HelperProcess) -> Result<(), SignerError> {
        helper.wait_ready().await;

        if let Some(failure) = helper.failure() {
            return Err(failure);
        }
        if helper.is_closing() {
            return Err(SignerError::Closed);
        }
        if helper.snapshot().frames == 0 {
            return Err(Self::settled_failure(helper).await);
        }
        Ok(())
    }
}

#[async_trait]
impl SigningBackend for RemoteHelperBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn open(&self, token: &ContinuationToken) -> Result<(), SignerError> {
        if self.helper.get().is_some() {
            return Err(SignerError::AlreadyOpened);
        }

        let helper = HelperProcess::spawn(&self.program)?;
        self.helper
            .set(helper)
            .map_err(|_| SignerError::AlreadyOpened)?;
        let helper = self.helper()?;

        let sent = match protocol::encode_frame(&HelperRequest::key(token)) {
            Ok(frame) => helper.send(&frame).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = sent {
            warn!(pid = ?helper.pid(), error = %err, "Key request failed, closing helper");
            helper.close().await;
            return Err(err);
        }

        info!(
            pid = ?helper.pid(),
            resume = !token.is_empty(),
            "Requested key from signing helper"
        );
        Ok(())
    }

    async fn public_key(&self) -> Result<PublicKeyRecord, SignerError> {
        let helper = self.helper()?;
        Self::await_ready(helper).await?;

        let state = helper.snapshot();
        if state.public_key.is_empty() {
            return Err(SignerError::MissingField("public_key"));
        }
        Ok(PublicKeyRecord::new(state.public_key))
    }

    async fn sign(&self, message: &[u8]) -> Result<SignOutcome, SignerError> {
        let helper = self.helper()?;
        let _guard = self.sign_guard.lock().await;

        Self::await_ready(helper).await?;

        let frame = protocol::encode_frame(&HelperRequest::sign(message))?;
        let baseline = helper.snapshot().frames;
        helper.send(&frame).await?;
        debug!(pid = ?helper.pid(), message_len = message.len(), baseline, "Sent sign request");

        let state = helper.wait_for_frame_after(baseline).await;
        if state.frames <= baseline {
            return Err(Self::settled_failure(helper).await);
        }

        if !state.signature_since(baseline) {
            warn!(pid = ?helper.pid(), "Helper answered a sign request without a signature");
            let failure = SignerError::MissingField("signature");
            helper.record_failure(failure.clone());
            return Err(failure);
        }

        debug!(
            pid = ?helper.pid(),
            signature_len = state.signature.len(),
            "Received signature from helper"
        );
        Ok(SignOutcome {
            token: ContinuationToken::new(state.token),
            signature: SignatureRecord::new(state.signature),
        })
    }

    async fn close(&self) {
        if let Some(helper) = self.helper.get() {
            helper.close().await;
            info!(pid = ?helper.pid(), "Closed signing helper");
        }
    }
}
