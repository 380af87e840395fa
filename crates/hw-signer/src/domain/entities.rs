//! # Domain Entities
//!
//! Core data structures shared by the session, the backends and the
//! helper line protocol.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::VerifyError;
use super::verify;

// =============================================================================
// Records
// =============================================================================

/// Opaque base64 string naming persisted private key material.
///
/// Produced by a backend the first time a key is created. Passing it back
/// into a later `open` reproduces the same public key. An empty token
/// means "no persisted key": generate one.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The "generate a new key" token.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

// Tokens name private key material; keep them out of logs.
impl fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContinuationToken(<{} chars>)", self.0.len())
    }
}

impl From<&str> for ContinuationToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for ContinuationToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Base64-encoded SubjectPublicKeyInfo (SPKI) public key.
///
/// Immutable once derived for a given key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKeyRecord(String);

impl PublicKeyRecord {
    pub fn new(spki_base64: impl Into<String>) -> Self {
        Self(spki_base64.into())
    }

    /// Encode raw SPKI DER bytes.
    pub fn from_der(spki_der: &[u8]) -> Self {
        Self(STANDARD.encode(spki_der))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Decode back to SPKI DER bytes.
    pub fn to_der(&self) -> Result<Vec<u8>, VerifyError> {
        STANDARD
            .decode(&self.0)
            .map_err(|e| VerifyError::PublicKeyEncoding(e.to_string()))
    }

    /// Verify `signature` over `message` with this key.
    pub fn verify(&self, signature: &SignatureRecord, message: &[u8]) -> Result<bool, VerifyError> {
        verify::verify_signature(self.as_str(), signature.as_str(), message)
    }
}

impl fmt::Display for PublicKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base64-encoded DER ECDSA signature (integer pair r, s).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureRecord(String);

impl SignatureRecord {
    pub fn new(der_base64: impl Into<String>) -> Self {
        Self(der_base64.into())
    }

    /// Encode raw DER signature bytes.
    pub fn from_der(der: &[u8]) -> Self {
        Self(STANDARD.encode(der))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SignatureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful sign operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignOutcome {
    /// Token naming the key that produced the signature (empty for
    /// backends whose keys only live as long as the process)
    pub token: ContinuationToken,
    /// The fresh signature
    pub signature: SignatureRecord,
}

// =============================================================================
// Helper Protocol Messages
// =============================================================================

/// A request frame sent to the helper process.
///
/// Exactly two shapes exist; each is one JSON object on one line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HelperRequest {
    /// Sent once at open: `{"key_data": "<token-or-empty>"}`
    Key { key_data: String },
    /// Sent once per sign: `{"sign_data": "<base64(message)>"}`
    Sign { sign_data: String },
}

impl HelperRequest {
    pub fn key(token: &ContinuationToken) -> Self {
        HelperRequest::Key {
            key_data: token.as_str().to_string(),
        }
    }

    pub fn sign(message: &[u8]) -> Self {
        HelperRequest::Sign {
            sign_data: STANDARD.encode(message),
        }
    }
}

/// A response frame from the helper. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

// =============================================================================
// Helper Response State
// =============================================================================

/// What the backend has learned from the helper so far.
///
/// Written only by the reader task; read by callers after a signal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HelperState {
    pub token: String,
    pub public_key: String,
    pub signature: String,
    /// Number of frames applied so far
    pub frames: u64,
    /// Value of `frames` when `signature` last changed (0 = never)
    pub signature_frame: u64,
    /// The reader task has stopped; no further frames will arrive
    pub reader_finished: bool,
}

impl HelperState {
    /// Apply a response frame with sparse semantics.
    ///
    /// A field only updates when present and non-empty; an empty or absent
    /// field never overwrites a value learned earlier.
    pub fn apply(&mut self, frame: HelperResponse) {
        self.frames += 1;

        if let Some(token) = non_empty(frame.key_data) {
            self.token = token;
        }
        if let Some(public_key) = non_empty(frame.public_key) {
            self.public_key = public_key;
        }
        if let Some(signature) = non_empty(frame.signature) {
            self.signature = signature;
            self.signature_frame = self.frames;
        }
    }

    /// Whether a signature arrived in a frame after `baseline`.
    pub fn signature_since(&self, baseline: u64) -> bool {
        self.signature_frame > baseline
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(key: Option<&str>, public: Option<&str>, sig: Option<&str>) -> HelperResponse {
        HelperResponse {
            key_data: key.map(str::to_string),
            public_key: public.map(str::to_string),
            signature: sig.map(str::to_string),
        }
    }

    #[test]
    fn test_signature_only_frame_keeps_public_key() {
        let mut state = HelperState::default();
        state.apply(frame(Some("tok"), Some("pub"), None));
        state.apply(frame(None, None, Some("sig")));

        assert_eq!(state.public_key, "pub");
        assert_eq!(state.token, "tok");
        assert_eq!(state.signature, "sig");
        assert_eq!(state.frames, 2);
    }

    #[test]
    fn test_empty_fields_do_not_overwrite() {
        let mut state = HelperState::default();
        state.apply(frame(Some("tok"), Some("pub"), Some("sig")));
        state.apply(frame(Some(""), Some(""), Some("")));

        assert_eq!(state.token, "tok");
        assert_eq!(state.public_key, "pub");
        assert_eq!(state.signature, "sig");
        assert_eq!(state.signature_frame, 1);
    }

    #[test]
    fn test_signature_since_tracks_latest_frame() {
        let mut state = HelperState::default();
        state.apply(frame(Some("tok"), Some("pub"), None));
        let baseline = state.frames;
        assert!(!state.signature_since(baseline));

        state.apply(frame(None, None, Some("sig")));
        assert!(state.signature_since(baseline));

        let baseline = state.frames;
        state.apply(frame(Some("tok"), None, None));
        assert!(!state.signature_since(baseline));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = ContinuationToken::new("c2VjcmV0");
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("c2VjcmV0"));
    }

    #[test]
    fn test_sign_request_encodes_message() {
        assert_eq!(
            HelperRequest::sign(b"hello"),
            HelperRequest::Sign {
                sign_data: "aGVsbG8=".to_string()
            }
        );
    }
}
