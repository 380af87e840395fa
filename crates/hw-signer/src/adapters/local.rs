//! # Local Hardware Backend
//!
//! Talks to a signing device directly. Every operation completes on the
//! caller's task; the key lives exactly as long as the backend, so
//! continuation tokens are not used.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::entities::{
    ContinuationToken, PublicKeyRecord, SignOutcome, SignatureRecord,
};
use crate::domain::errors::SignerError;
use crate::ports::outbound::{
    BackendKind, DeviceConnector, HardwareKey, KeySpec, SigningBackend,
};

/// Device access paths probed when none are configured, in priority order.
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/tpmrm0",
    "/dev/tpm0",
    "/dev/tpmrm1",
    "/dev/tpm1",
    "/dev/tpm",
];

/// Return the first candidate path that exists.
///
/// A path that does not exist moves on to the next candidate; a path that
/// cannot be probed at all is an error naming it.
pub fn probe_device_path(candidates: &[PathBuf]) -> Result<PathBuf, SignerError> {
    for path in candidates {
        match path.try_exists() {
            Ok(true) => return Ok(path.clone()),
            Ok(false) => debug!(path = %path.display(), "Device path absent"),
            Err(err) => {
                return Err(SignerError::DeviceProbe {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    Err(SignerError::DeviceNotFound {
        tried: candidates
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
    })
}

/// Signing backend holding a key inside a locally attached device.
pub struct LocalHardwareBackend {
    candidate_paths: Vec<PathBuf>,
    connector: Arc<dyn DeviceConnector>,
    device_path: OnceLock<PathBuf>,
    key: Mutex<Option<Box<dyn HardwareKey>>>,
    public_key: OnceLock<PublicKeyRecord>,
    closed: Mutex<bool>,
}

impl LocalHardwareBackend {
    pub fn new(candidate_paths: Vec<PathBuf>, connector: Arc<dyn DeviceConnector>) -> Self {
        Self {
            candidate_paths,
            connector,
            device_path: OnceLock::new(),
            key: Mutex::new(None),
            public_key: OnceLock::new(),
            closed: Mutex::new(false),
        }
    }

    /// The device selected by `open`.
    pub fn device_path(&self) -> Option<&Path> {
        self.device_path.get().map(PathBuf::as_path)
    }

    fn open_key(&self) -> Result<(PathBuf, Box<dyn HardwareKey>, PublicKeyRecord), SignerError> {
        let path = probe_device_path(&self.candidate_paths)?;
        let device = self.connector.connect(&path)?;
        let mut key = device.create_key(&KeySpec::p256_signing())?;

        match key.public_key_der() {
            Ok(der) => Ok((path, key, PublicKeyRecord::from_der(&der))),
            Err(err) => {
                key.close();
                Err(err)
            }
        }
    }
}

#[async_trait]
impl SigningBackend for LocalHardwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn open(&self, token: &ContinuationToken) -> Result<(), SignerError> {
        if *self.closed.lock() {
            return Err(SignerError::Closed);
        }
        if self.public_key.get().is_some() {
            return Err(SignerError::AlreadyOpened);
        }
        if !token.is_empty() {
            warn!(
                token_len = token.as_str().len(),
                "Local device keys do not outlive the process; ignoring continuation token"
            );
        }

        let (path, key, public_key) = self.open_key()?;
        info!(device = %path.display(), "Created signing key on local device");

        *self.key.lock() = Some(key);
        let _ = self.device_path.set(path);
        let _ = self.public_key.set(public_key);
        Ok(())
    }

    async fn public_key(&self) -> Result<PublicKeyRecord, SignerError> {
        if *self.closed.lock() {
            return Err(SignerError::Closed);
        }
        self.public_key.get().cloned().ok_or(SignerError::NotOpen)
    }

    async fn sign(&self, message: &[u8]) -> Result<SignOutcome, SignerError> {
        let key = self.key.lock();
        let Some(key) = key.as_ref() else {
            return Err(if *self.closed.lock() {
                SignerError::Closed
            } else {
                SignerError::NotOpen
            });
        };

        let der = key.sign(message)?;
        debug!(message_len = message.len(), "Signed with local device key");

        Ok(SignOutcome {
            token: ContinuationToken::empty(),
            signature: SignatureRecord::from_der(&der),
        })
    }

    async fn close(&self) {
        *self.closed.lock() = true;
        if let Some(mut key) = self.key.lock().take() {
            key.close();
            info!("Released local device key");
        }
    }
}
