//! Session configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use idgate_capture::{CaptureOptions, Facing, DEFAULT_COUNTDOWN_MS};
use idgate_client::HttpClientOptions;
use idgate_utils::LogFormat;
use idgate_wallet_core::SEPOLIA_CHAIN_ID;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::SecondFactorScope;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the verification service.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Whole-request deadline for service calls. `0` disables it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Take the still automatically when the countdown ends.
    #[serde(default = "default_auto_capture")]
    pub auto_capture: bool,

    #[serde(default = "default_countdown_ms")]
    pub countdown_ms: u64,

    #[serde(default)]
    pub facing: Facing,

    #[serde(default)]
    pub second_factor_scope: SecondFactorScope,

    /// Chain id the wallet is expected to be on. Other networks only warn.
    #[serde(default = "default_expected_chain_id")]
    pub expected_chain_id: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_auto_capture() -> bool {
    true
}

fn default_countdown_ms() -> u64 {
    DEFAULT_COUNTDOWN_MS
}

fn default_expected_chain_id() -> String {
    SEPOLIA_CHAIN_ID.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            auto_capture: default_auto_capture(),
            countdown_ms: default_countdown_ms(),
            facing: Facing::default(),
            second_factor_scope: SecondFactorScope::default(),
            expected_chain_id: default_expected_chain_id(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "backend_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.expected_chain_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "expected_chain_id",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn http_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            request_timeout: (self.request_timeout_secs > 0)
                .then(|| Duration::from_secs(self.request_timeout_secs)),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        if self.auto_capture {
            CaptureOptions::auto(self.facing, self.countdown_ms)
        } else {
            CaptureOptions::manual(self.facing)
        }
    }
}
