//! # Software Device
//!
//! A P-256 key held in process memory, exposed through the same hardware
//! ports the local backend drives. Backs the reference helper executable
//! and lets the local backend run on machines without a signing module.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::EncodePublicKey;
use rand::rngs::OsRng;
use tracing::debug;

use crate::domain::entities::{ContinuationToken, PublicKeyRecord, SignatureRecord};
use crate::domain::errors::SignerError;
use crate::domain::verify::sha256;
use crate::ports::outbound::{DeviceConnector, HardwareDevice, HardwareKey, KeyCurve, KeyHash, KeySpec};

/// An in-memory ECDSA P-256 signing key.
///
/// Its continuation token is the base64 encoding of the 32-byte secret
/// scalar, so the same token always yields the same public key.
pub struct SoftwareKey {
    signing_key: SigningKey,
}

impl SoftwareKey {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Rehydrate the key named by `token`.
    pub fn from_token(token: &ContinuationToken) -> Result<Self, SignerError> {
        let secret = STANDARD
            .decode(token.as_str())
            .map_err(|e| SignerError::KeyCreation(format!("token is not valid base64: {}", e)))?;
        let signing_key = SigningKey::from_slice(&secret)
            .map_err(|e| SignerError::KeyCreation(format!("token is not a P-256 secret: {}", e)))?;
        Ok(Self { signing_key })
    }

    /// Generate for an empty token, rehydrate otherwise.
    pub fn load_or_generate(token: &ContinuationToken) -> Result<Self, SignerError> {
        if token.is_empty() {
            Ok(Self::generate())
        } else {
            Self::from_token(token)
        }
    }

    pub fn token(&self) -> ContinuationToken {
        ContinuationToken::new(STANDARD.encode(self.signing_key.to_bytes()))
    }

    pub fn public_key_der(&self) -> Result<Vec<u8>, SignerError> {
        self.signing_key
            .verifying_key()
            .to_public_key_der()
            .map(|document| document.as_bytes().to_vec())
            .map_err(|e| SignerError::KeyCreation(format!("SPKI export failed: {}", e)))
    }

    pub fn public_key_record(&self) -> Result<PublicKeyRecord, SignerError> {
        self.public_key_der().map(|der| PublicKeyRecord::from_der(&der))
    }

    /// SHA-256 then ECDSA; returns the DER (r, s) encoding.
    pub fn sign_der(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(&sha256(message))
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    pub fn sign(&self, message: &[u8]) -> Result<SignatureRecord, SignerError> {
        self.sign_der(message).map(|der| SignatureRecord::from_der(&der))
    }
}

impl HardwareKey for SoftwareKey {
    fn public_key_der(&self) -> Result<Vec<u8>, SignerError> {
        SoftwareKey::public_key_der(self)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.sign_der(message)
    }

    fn close(&mut self) {
        debug!("Released software signing key");
    }
}

/// A "device" that creates fresh software keys.
pub struct SoftwareDevice {
    path: PathBuf,
}

impl SoftwareDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HardwareDevice for SoftwareDevice {
    fn create_key(&self, spec: &KeySpec) -> Result<Box<dyn HardwareKey>, SignerError> {
        let KeySpec {
            curve: KeyCurve::NistP256,
            hash: KeyHash::Sha256,
            sign_only,
            ..
        } = *spec;
        if !sign_only {
            return Err(SignerError::KeyCreation(
                "software keys are restricted to signing".to_string(),
            ));
        }
        debug!(device = %self.path.display(), "Created software signing key");
        Ok(Box::new(SoftwareKey::generate()))
    }
}

/// Connects to any path as a [`SoftwareDevice`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareConnector;

impl DeviceConnector for SoftwareConnector {
    fn connect(&self, path: &Path) -> Result<Box<dyn HardwareDevice>, SignerError> {
        Ok(Box::new(SoftwareDevice {
            path: path.to_path_buf(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_reproduces_public_key() {
        let key = SoftwareKey::generate();
        let resumed = SoftwareKey::from_token(&key.token()).unwrap();
        assert_eq!(
            key.public_key_record().unwrap(),
            resumed.public_key_record().unwrap()
        );
    }

    #[test]
    fn test_signature_verifies() {
        let key = SoftwareKey::generate();
        let public_key = key.public_key_record().unwrap();
        let signature = key.sign(b"hello").unwrap();

        assert!(public_key.verify(&signature, b"hello").unwrap());
        assert!(!public_key.verify(&signature, b"yes").unwrap());
    }

    #[test]
    fn test_public_key_is_p256_spki() {
        let der = SoftwareKey::generate().public_key_der().unwrap();
        assert_eq!(der.len(), 91);
    }

    #[test]
    fn test_bad_tokens_rejected() {
        assert!(matches!(
            SoftwareKey::from_token(&ContinuationToken::new("not base64!")),
            Err(SignerError::KeyCreation(_))
        ));
        assert!(matches!(
            SoftwareKey::from_token(&ContinuationToken::new(STANDARD.encode([0u8; 32]))),
            Err(SignerError::KeyCreation(_))
        ));
        assert!(matches!(
            SoftwareKey::from_token(&ContinuationToken::new(STANDARD.encode([1u8; 7]))),
            Err(SignerError::KeyCreation(_))
        ));
    }

    #[test]
    fn test_load_or_generate() {
        let fresh = SoftwareKey::load_or_generate(&ContinuationToken::empty()).unwrap();
        let resumed = SoftwareKey::load_or_generate(&fresh.token()).unwrap();
        assert_eq!(fresh.token(), resumed.token());
    }

    #[test]
    fn test_device_creates_sign_only_keys() {
        let device = SoftwareConnector.connect(Path::new("/dev/tpmrm0")).unwrap();
        let key = device.create_key(&KeySpec::p256_signing()).unwrap();
        assert_eq!(key.public_key_der().unwrap().len(), 91);

        let mut spec = KeySpec::p256_signing();
        spec.sign_only = false;
        assert!(device.create_key(&spec).is_err());
    }
}
