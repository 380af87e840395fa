//! # Hardware-Backed Signing Sessions
//!
//! Obtain or resume an ECDSA P-256 signing key held by hardware, read its
//! public key, sign messages and verify signatures produced elsewhere.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): records, session state machine, verifier. No I/O.
//! - **Ports Layer** (`ports/`): the session API and the backend / device contracts
//! - **Adapters Layer** (`adapters/`): helper process backend, local device backend
//! - **Service Layer** (`service.rs`): `SigningSession`, wiring a backend to the API
//!
//! ## Backends
//!
//! - **Remote**: a long-lived helper executable, spoken to over stdin/stdout
//!   with one JSON object per line. Its stderr is captured for diagnostics.
//! - **Local**: a device found among candidate access paths. Keys live as
//!   long as the backend; continuation tokens are not used.
//!
//! ## Example
//!
//! ```no_run
//! use hw_signer::{ContinuationToken, SigningSession, SigningSessionApi};
//!
//! # async fn run() -> Result<(), hw_signer::SignerError> {
//! let session = SigningSession::remote("./TpmAuth");
//! session.open(ContinuationToken::empty()).await?;
//!
//! let public_key = session.public_key().await?;
//! let outcome = session.sign(b"hello").await?;
//! assert!(public_key.verify(&outcome.signature, b"hello")?);
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::local::{probe_device_path, LocalHardwareBackend, DEFAULT_DEVICE_PATHS};
pub use adapters::remote::RemoteHelperBackend;
pub use adapters::software::{SoftwareConnector, SoftwareKey};
pub use config::{build_backend, BackendSelection, ConfigError, SignerConfig};
pub use domain::entities::{
    ContinuationToken, HelperRequest, HelperResponse, PublicKeyRecord, SignOutcome,
    SignatureRecord,
};
pub use domain::errors::{ProtocolError, SignerError, VerifyError};
pub use domain::state::SessionState;
pub use domain::verify::{verify_signature, EcVerifyingKey};
pub use ports::inbound::SigningSessionApi;
pub use ports::outbound::{
    BackendKind, DeviceConnector, HardwareDevice, HardwareKey, KeySpec, SigningBackend,
};
pub use service::SigningSession;
