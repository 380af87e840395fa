//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `hw_signer=debug,info`
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to emit ANSI colours in pretty output
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "hw-signer".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            ansi: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: hw-signer)
    /// - `SIGNER_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `SIGNER_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `SIGNER_LOG_ANSI`: Enable ANSI colours (default: false)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "hw-signer".to_string()),

            log_level: env::var("SIGNER_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("SIGNER_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),

            ansi: env::var("SIGNER_LOG_ANSI")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    /// Create configuration for a named binary.
    pub fn for_binary(binary_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = binary_name.to_string();
        config
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
