//! Runtime configuration

use serde::{Deserialize, Serialize};

use gobj_core::{GObjError, GObjResult};

/// Runtime configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum nesting of `send_event` calls; `None` disables the guard
    pub max_dispatch_depth: Option<usize>,
    /// Drop an instance's non-hard subscribings when it stops
    pub unsubscribe_on_stop: bool,
    /// Debug traces for create/destroy
    pub trace_creation: bool,
    /// Debug traces for every dispatched event
    pub trace_events: bool,
    /// Debug traces for subscribe/unsubscribe
    pub trace_subscriptions: bool,
    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_dispatch_depth: Some(512),
            unsubscribe_on_stop: true,
            trace_creation: false,
            trace_events: false,
            trace_subscriptions: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse from JSON text; missing fields take their defaults
    pub fn from_json_str(text: &str) -> GObjResult<Self> {
        serde_json::from_str(text).map_err(|e| GObjError::InvalidTree(format!("runtime config: {e}")))
    }
}

/// Logging output settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `gobj_runtime=debug`
    pub level: String,
    /// JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}
