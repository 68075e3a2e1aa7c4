mod connection;
mod http;
mod polling;

pub use connection::*;
pub use http::*;
pub use polling::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MageConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl MageConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing keys.
    pub fn load(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| crate::error::Error::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Load from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl MageConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let identifiers = [
            ("connection.protocol", &self.connection.protocol),
            ("connection.domain", &self.connection.domain),
            ("connection.application", &self.connection.application),
        ];
        for (field, value) in identifiers {
            if value.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: "must not be empty".into(),
                });
            }
        }

        if self.connection.protocol.contains("://") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.protocol".into(),
                message: "expected a bare scheme such as \"http\", not a URL".into(),
            });
        }

        if matches!(self.connection.session_key.as_deref(), Some("")) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "connection.session_key".into(),
                message: "empty session key is treated as unset; polling will be refused".into(),
            });
        }

        if self.polling.transport == PollTransport::ShortPolling
            && self.polling.short_interval_secs == 0
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "polling.short_interval_secs".into(),
                message: "0 makes short-polling spin without pause".into(),
            });
        }

        if self.polling.transport == PollTransport::LongPolling
            && self.http.poll_timeout_ms <= self.http.request_timeout_ms
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "http.poll_timeout_ms".into(),
                message: "long-polling fetches should be allowed to outlive regular requests"
                    .into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
