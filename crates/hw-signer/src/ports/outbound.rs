//! # Outbound Ports (Driven Ports / SPI)
//!
//! - [`SigningBackend`]: the Open/PublicKey/Sign/Close contract both
//!   backends implement.
//! - [`DeviceConnector`] / [`HardwareDevice`] / [`HardwareKey`]: the native
//!   hardware signing API the local backend drives.

use std::path::Path;

use crate::domain::entities::{ContinuationToken, PublicKeyRecord, SignOutcome};
use crate::domain::errors::SignerError;

/// Which backend variant is behind a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Hardware device accessed directly
    Local,
    /// Helper process brokering the hardware
    Remote,
}

/// A signing backend.
///
/// Methods take `&self` so that `close` can run while another task is
/// parked in `public_key` or `sign`.
#[async_trait::async_trait]
pub trait SigningBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Start obtaining the key. Must not block on the key becoming usable.
    async fn open(&self, token: &ContinuationToken) -> Result<(), SignerError>;

    /// Wait for readiness and return the public key.
    async fn public_key(&self) -> Result<PublicKeyRecord, SignerError>;

    /// Sign `message` with the held key.
    async fn sign(&self, message: &[u8]) -> Result<SignOutcome, SignerError>;

    /// Release resources. Idempotent, best-effort.
    async fn close(&self);
}

// =============================================================================
// Native hardware API
// =============================================================================

/// Elliptic curves a hardware key may be created on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCurve {
    NistP256,
}

/// Hash algorithms for the signing scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyHash {
    Sha256,
}

/// Properties requested of a freshly created hardware signing key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySpec {
    pub curve: KeyCurve,
    pub hash: KeyHash,
    /// Private part never leaves the device
    pub non_migratable: bool,
    /// Usable by the owner hierarchy with plain user authorization
    pub owner_authenticated: bool,
    /// Key may sign and do nothing else
    pub sign_only: bool,
}

impl KeySpec {
    /// ECDSA P-256 / SHA-256, non-migratable, owner-authenticated, sign-only.
    pub fn p256_signing() -> Self {
        Self {
            curve: KeyCurve::NistP256,
            hash: KeyHash::Sha256,
            non_migratable: true,
            owner_authenticated: true,
            sign_only: true,
        }
    }
}

/// Opens a hardware device at a filesystem access path.
pub trait DeviceConnector: Send + Sync {
    fn connect(&self, path: &Path) -> Result<Box<dyn HardwareDevice>, SignerError>;
}

/// An opened hardware signing device.
pub trait HardwareDevice: Send + Sync {
    /// Create a signing key inside the device.
    fn create_key(&self, spec: &KeySpec) -> Result<Box<dyn HardwareKey>, SignerError>;
}

/// A signing key held inside a hardware device.
pub trait HardwareKey: Send + Sync {
    /// SPKI DER encoding of the public half.
    fn public_key_der(&self) -> Result<Vec<u8>, SignerError>;

    /// Hash `message` with the key's scheme and sign it; returns a DER
    /// (r, s) signature.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Release the device handle. Called exactly once.
    fn close(&mut self);
}
