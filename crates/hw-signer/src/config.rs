//! Signer configuration with validation.
//!
//! Backend selection is a runtime choice: `local` drives a hardware device
//! directly, `remote` brokers it through a helper executable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::adapters::local::{LocalHardwareBackend, DEFAULT_DEVICE_PATHS};
use crate::adapters::remote::RemoteHelperBackend;
use crate::ports::outbound::{DeviceConnector, SigningBackend};

/// Default helper executable, resolved relative to the working directory.
pub const DEFAULT_HELPER_PROGRAM: &str = "./TpmAuth";

/// Which backend a session uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    /// Hardware device accessed through the native API
    Local,
    /// Helper process speaking the line protocol
    #[default]
    Remote,
}

impl FromStr for BackendSelection {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendSelection::Local),
            "remote" => Ok(BackendSelection::Remote),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Main signer configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Backend selection (default: remote)
    pub backend: BackendSelection,
    /// Helper process configuration (remote backend)
    pub helper: HelperConfig,
    /// Device discovery configuration (local backend)
    pub device: DeviceConfig,
}

/// Helper process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// Executable invoked with no arguments
    pub program: PathBuf,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_HELPER_PROGRAM),
        }
    }
}

/// Device discovery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Access paths probed in order; the first that exists wins
    pub candidate_paths: Vec<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            candidate_paths: DEFAULT_DEVICE_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl SignerConfig {
    /// Load from environment variables, falling back to defaults for
    /// anything missing or unrecognised.
    ///
    /// - `SIGNER_BACKEND`: `local` or `remote`
    /// - `SIGNER_HELPER_PATH`: helper executable
    /// - `SIGNER_DEVICE_PATHS`: device paths in platform path-list syntax
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), false).unwrap_or_default()
    }

    /// Like [`SignerConfig::from_env`], but an unrecognised backend is an error.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), true)
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        strict: bool,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(backend) = lookup("SIGNER_BACKEND").filter(|v| !v.trim().is_empty()) {
            match backend.parse() {
                Ok(selection) => config.backend = selection,
                Err(err) if strict => return Err(err),
                Err(_) => {}
            }
        }

        if let Some(program) = lookup("SIGNER_HELPER_PATH").filter(|v| !v.is_empty()) {
            config.helper.program = PathBuf::from(program);
        }

        if let Some(paths) = lookup("SIGNER_DEVICE_PATHS") {
            let paths: Vec<PathBuf> = std::env::split_paths(&paths)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                config.device.candidate_paths = paths;
            }
        }

        Ok(config)
    }

    /// Validate configuration for the selected backend
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            BackendSelection::Remote if self.helper.program.as_os_str().is_empty() => {
                Err(ConfigError::EmptyHelperProgram)
            }
            BackendSelection::Local if self.device.candidate_paths.is_empty() => {
                Err(ConfigError::NoCandidatePaths)
            }
            _ => Ok(()),
        }
    }
}

/// Build the backend selected by `config`.
///
/// `devices` opens hardware devices for the local backend; the remote
/// backend ignores it.
pub fn build_backend(
    config: &SignerConfig,
    devices: Arc<dyn DeviceConnector>,
) -> Result<Box<dyn SigningBackend>, ConfigError> {
    config.validate()?;

    Ok(match config.backend {
        BackendSelection::Local => Box::new(LocalHardwareBackend::new(
            config.device.candidate_paths.clone(),
            devices,
        )),
        BackendSelection::Remote => Box::new(RemoteHelperBackend::new(
            config.helper.program.clone(),
        )),
    })
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Helper program path is empty")]
    EmptyHelperProgram,

    #[error("No candidate device paths configured")]
    NoCandidatePaths,

    #[error("Unknown backend: {0} (expected local or remote)")]
    UnknownBackend(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::software::SoftwareConnector;
    use crate::ports::outbound::BackendKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SignerConfig::default();
        assert_eq!(config.backend, BackendSelection::Remote);
        assert_eq!(config.helper.program, PathBuf::from("./TpmAuth"));
        assert_eq!(
            config.device.candidate_paths.first(),
            Some(&PathBuf::from("/dev/tpmrm0"))
        );
        assert_eq!(config.device.candidate_paths.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_lookup_overrides() {
        let config = SignerConfig::from_lookup(
            lookup(&[
                ("SIGNER_BACKEND", "Local"),
                ("SIGNER_HELPER_PATH", "/opt/signer/helper"),
                ("SIGNER_DEVICE_PATHS", "/dev/a:/dev/b"),
            ]),
            true,
        )
        .unwrap();

        assert_eq!(config.backend, BackendSelection::Local);
        assert_eq!(config.helper.program, PathBuf::from("/opt/signer/helper"));
        assert_eq!(
            config.device.candidate_paths,
            vec![PathBuf::from("/dev/a"), PathBuf::from("/dev/b")]
        );
    }

    #[test]
    fn test_unknown_backend() {
        let vars = [("SIGNER_BACKEND", "cloud")];
        assert_eq!(
            SignerConfig::from_lookup(lookup(&vars), true),
            Err(ConfigError::UnknownBackend("cloud".to_string()))
        );
        let lenient = SignerConfig::from_lookup(lookup(&vars), false).unwrap();
        assert_eq!(lenient.backend, BackendSelection::Remote);
    }

    #[test]
    fn test_validate() {
        let mut config = SignerConfig::default();
        config.helper.program = PathBuf::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyHelperProgram));

        config.backend = BackendSelection::Local;
        assert!(config.validate().is_ok());
        config.device.candidate_paths.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoCandidatePaths));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SignerConfig =
            serde_json::from_str(r#"{"backend":"local","device":{"candidate_paths":["/dev/x"]}}"#)
                .unwrap();
        assert_eq!(config.backend, BackendSelection::Local);
        assert_eq!(config.helper, HelperConfig::default());
        assert_eq!(config.device.candidate_paths, vec![PathBuf::from("/dev/x")]);
    }

    #[test]
    fn test_build_backend_selects_variant() {
        let devices: Arc<dyn DeviceConnector> = Arc::new(SoftwareConnector);

        let remote = build_backend(&SignerConfig::default(), Arc::clone(&devices)).unwrap();
        assert_eq!(remote.kind(), BackendKind::Remote);

        let local_config = SignerConfig {
            backend: BackendSelection::Local,
            ..SignerConfig::default()
        };
        let local = build_backend(&local_config, devices).unwrap();
        assert_eq!(local.kind(), BackendKind::Local);
    }
}
