//! Link configuration.
//!
//! Links are usually configured in code through [`LinkConfig::binary`] or
//! [`LinkConfig::text`], but the same settings load from YAML:
//!
//! ```yaml
//! name: micon
//! timeout_ms: 4000
//! verify_checksum: true
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, LinkResult};

/// Default reply timeout of the binary dialect.
pub const BINARY_TIMEOUT: Duration = Duration::from_secs(4);
/// Default reply timeout of the text dialect.
pub const TEXT_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings for one MCU link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Name used in log output, metric labels and the event thread name.
    pub name: String,
    /// Reply timeout in milliseconds. `None` uses the dialect default.
    pub timeout_ms: Option<u64>,
    /// Reject binary replies whose checksum does not sum to zero.
    pub verify_checksum: bool,
    /// Name of the event dispatcher thread. Defaults to `mculink-events-<name>`.
    pub dispatcher_thread: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            name: "mcu".to_string(),
            timeout_ms: None,
            verify_checksum: true,
            dispatcher_thread: None,
        }
    }
}

impl LinkConfig {
    /// Defaults for a binary (MICON) link.
    pub fn binary() -> Self {
        LinkConfig {
            name: "micon".to_string(),
            timeout_ms: Some(BINARY_TIMEOUT.as_millis() as u64),
            ..Default::default()
        }
    }

    /// Defaults for a text (R8C) link.
    pub fn text() -> Self {
        LinkConfig {
            name: "r8c".to_string(),
            timeout_ms: Some(TEXT_TIMEOUT.as_millis() as u64),
            ..Default::default()
        }
    }

    /// Parse a configuration from YAML. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> LinkResult<Self> {
        let config: LinkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the link name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Enable or disable reply checksum verification.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Check the settings.
    pub fn validate(&self) -> LinkResult<()> {
        if self.timeout_ms == Some(0) {
            return Err(LinkError::Argument("timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// The reply timeout, or `fallback` if none is configured.
    pub fn timeout_or(&self, fallback: Duration) -> Duration {
        self.timeout_ms.map_or(fallback, Duration::from_millis)
    }

    pub(crate) fn dispatcher_thread_name(&self) -> String {
        self.dispatcher_thread
            .clone()
            .unwrap_or_else(|| format!("mculink-events-{}", self.name))
    }
}
