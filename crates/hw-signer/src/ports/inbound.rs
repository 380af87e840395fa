//! # Inbound Ports (Driving Ports / API)
//!
//! The user-facing signing session contract.

use crate::domain::entities::{ContinuationToken, PublicKeyRecord, SignOutcome};
use crate::domain::errors::SignerError;
use crate::domain::state::SessionState;

/// A hardware-backed signing session.
///
/// Implementations must be thread-safe (`Send + Sync`) so that `close` can
/// be called from one task while another waits in `public_key` or `sign`.
#[async_trait::async_trait]
pub trait SigningSessionApi: Send + Sync {
    /// Generate a new key (empty token) or rehydrate the key named by `token`.
    ///
    /// May be called at most once per session.
    async fn open(&self, token: ContinuationToken) -> Result<(), SignerError>;

    /// The SPKI public key, once the backend signals readiness.
    async fn public_key(&self) -> Result<PublicKeyRecord, SignerError>;

    /// Sign `message`. At most one sign is in flight per session; further
    /// calls queue behind it.
    async fn sign(&self, message: &[u8]) -> Result<SignOutcome, SignerError>;

    /// Release every backend resource. Idempotent; never fails. Callers
    /// blocked in `public_key` or `sign` are released with an error.
    async fn close(&self);

    /// Current lifecycle state.
    fn state(&self) -> SessionState;
}
