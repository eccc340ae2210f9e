//! Process-wide configuration.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::errors::ContextError;

static CONFIG: OnceLock<ContextConfig> = OnceLock::new();

/// Tunables for the context engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Whether every install/uninstall updates the root registry.
    #[serde(default = "default_track_root_ids")]
    pub track_root_ids: bool,
    /// Whether replacing an existing local entry emits a warning.
    #[serde(default)]
    pub warn_on_overwrite: bool,
    /// Whether every context switch emits a trace event.
    #[serde(default)]
    pub log_transitions: bool,
}

fn default_track_root_ids() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            track_root_ids: default_track_root_ids(),
            warn_on_overwrite: false,
            log_transitions: false,
        }
    }
}

impl ContextConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from a JSON document.
    ///
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ContextError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets whether the root registry is maintained.
    #[must_use]
    pub const fn with_track_root_ids(mut self, track: bool) -> Self {
        self.track_root_ids = track;
        self
    }

    /// Sets whether overwrites are reported.
    #[must_use]
    pub const fn with_warn_on_overwrite(mut self, warn: bool) -> Self {
        self.warn_on_overwrite = warn;
        self
    }

    /// Sets whether context switches are traced.
    #[must_use]
    pub const fn with_log_transitions(mut self, log: bool) -> Self {
        self.log_transitions = log;
        self
    }
}

/// Installs the process-wide configuration.
///
/// Must run before the first context operation reads the configuration;
/// afterwards the configuration is fixed.
pub fn configure(config: ContextConfig) -> Result<(), ContextError> {
    debug!(?config, "installing ctxflow configuration");
    CONFIG
        .set(config)
        .map_err(|_| ContextError::AlreadyConfigured)
}

/// Returns the installed configuration, fixing the defaults if none was installed.
pub fn config() -> &'static ContextConfig {
    CONFIG.get_or_init(ContextConfig::default)
}
