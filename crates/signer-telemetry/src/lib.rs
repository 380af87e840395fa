//! # Signer Telemetry
//!
//! Logging setup shared by the hardware signer binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signer_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::for_binary("my-helper"))?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `hw-signer` | Service name in log lines |
//! | `SIGNER_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `SIGNER_JSON_LOGS` | `false` | JSON output |
//! | `SIGNER_LOG_ANSI` | `false` | Coloured pretty output |

#![warn(missing_docs)]

mod config;
mod logging;
mod tracing_setup;

pub use config::TelemetryConfig;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log filter directive could not be parsed
    #[error("Invalid log filter: {0}")]
    Filter(String),
}

/// Initialize logging.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let installed = tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
        installed,
    })
}

/// Guard held for the lifetime of a binary.
pub struct TelemetryGuard {
    service_name: String,
    installed: bool,
}

impl TelemetryGuard {
    /// Whether this guard's initialisation installed the global subscriber.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.installed {
            tracing::debug!(service = %self.service_name, "Shutting down telemetry");
        }
    }
}
