//! # Signer Errors
//!
//! Error types for sessions, backends, the helper line protocol and
//! signature verification.
//!
//! Errors fall into three tiers:
//! - **Transport/process**: the helper or device is unusable. Fatal to the session.
//! - **Protocol**: the helper spoke something we cannot interpret. Fatal to the session.
//! - **Decoding**: a public key or signature could not be decoded. Returned
//!   to the caller, the session carries on.

use thiserror::Error;

/// Errors surfaced by a signing session or one of its backends.
///
/// `Clone` because a single recorded failure is delivered to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    // =========================================================================
    // Transport / process
    // =========================================================================
    /// The helper executable could not be started
    #[error("Failed to start helper {program}: {reason}")]
    HelperSpawn { program: String, reason: String },

    /// Reading from or writing to a helper pipe failed
    #[error("Helper I/O error: {0}")]
    HelperIo(String),

    /// The helper's input pipe is already closed
    #[error("Helper input pipe is closed")]
    PipeClosed,

    /// The helper exited unsuccessfully
    #[error("Helper exited with {status}: {diagnostics}")]
    HelperExited { status: String, diagnostics: String },

    /// The helper closed its output without answering the pending request
    #[error("Helper closed its output stream without responding")]
    HelperClosedStream,

    /// None of the candidate device paths exist
    #[error("No hardware signing device found (tried {tried:?})")]
    DeviceNotFound { tried: Vec<String> },

    /// A candidate device path could not be probed
    #[error("Failed to probe device path {path}: {reason}")]
    DeviceProbe { path: String, reason: String },

    /// The device exists but could not be opened
    #[error("Failed to open device {path}: {reason}")]
    DeviceOpen { path: String, reason: String },

    /// The device refused to create the signing key
    #[error("Failed to create signing key: {0}")]
    KeyCreation(String),

    /// The signing operation itself failed
    #[error("Failed to sign data: {0}")]
    SigningFailed(String),

    // =========================================================================
    // Protocol
    // =========================================================================
    /// A helper frame could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A response was received but lacked a field the operation needs
    #[error("Response is missing {0}")]
    MissingField(&'static str),

    /// The backend returned a different continuation token mid-session
    #[error("Continuation token changed within a session")]
    TokenMismatch,

    // =========================================================================
    // Session state
    // =========================================================================
    /// The session has not been opened
    #[error("Session is not open")]
    NotOpen,

    /// `open` was called on a session that was already opened
    #[error("Session was already opened")]
    AlreadyOpened,

    /// The session (or its backend) has been closed
    #[error("Session is closed")]
    Closed,

    /// A sign was started while another was still in flight
    #[error("A sign operation is already in flight")]
    SignInFlight,

    /// A previous fatal error put the session into the failed state
    #[error("Session failed: {0}")]
    Failed(Box<SignerError>),

    // =========================================================================
    // Decoding
    // =========================================================================
    /// A key or signature could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] VerifyError),
}

impl SignerError {
    /// Whether this error moves a session into the failed state.
    ///
    /// Decoding errors and misuse of the session API are reported to the
    /// caller without tearing the session down.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SignerError::Decode(_)
                | SignerError::NotOpen
                | SignerError::AlreadyOpened
                | SignerError::Closed
                | SignerError::SignInFlight
                | SignerError::Failed(_)
        )
    }

    pub(crate) fn helper_io(err: &std::io::Error) -> Self {
        SignerError::HelperIo(format!("{} ({:?})", err, err.kind()))
    }
}

/// Errors in the newline-delimited JSON protocol spoken with a helper.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A request could not be serialized
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// A frame was not valid JSON
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// A frame was valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// A blank line was received where a frame was expected
    #[error("Empty frame")]
    EmptyFrame,
}

/// Errors decoding inputs to signature verification.
///
/// A signature that decodes cleanly but does not verify is not an error;
/// verification reports it as `Ok(false)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The public key is not valid base64
    #[error("Public key is not valid base64: {0}")]
    PublicKeyEncoding(String),

    /// The public key bytes are not a SubjectPublicKeyInfo structure
    #[error("Public key is not a valid SubjectPublicKeyInfo: {0}")]
    PublicKeyStructure(String),

    /// The public key is not an elliptic-curve key
    #[error("Public key is not an elliptic-curve key")]
    NotEllipticCurve,

    /// The public key is on a curve we cannot verify
    #[error("Unsupported elliptic curve: {0}")]
    UnsupportedCurve(String),

    /// The signature is not valid base64
    #[error("Signature is not valid base64: {0}")]
    SignatureEncoding(String),

    /// The signature bytes are not a DER (r, s) pair
    #[error("Signature is not a valid DER (r, s) pair: {0}")]
    SignatureStructure(String),
}
