//! Runtime options for a [`ScriptSource`](crate::ScriptSource).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PATTERN: &str = "*.js";

/// Extension of the per-directory main file (`<dir>/<dir>.js`).
pub const MAIN_FILE_EXTENSION: &str = "js";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSourceConfig {
    /// File-name glob restricting which files are listed.
    pub pattern: String,
    /// Subscribe to filesystem notifications. When disabled the list is only
    /// rebuilt after an explicit invalidation.
    pub watch: bool,
    /// Pause between failed attempts to re-establish a broken subscription.
    pub resubscribe_delay_ms: u64,
}

impl Default for ScriptSourceConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            watch: true,
            resubscribe_delay_ms: 250,
        }
    }
}

impl ScriptSourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON document; missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}
