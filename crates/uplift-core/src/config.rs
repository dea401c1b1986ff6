use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Required gate for `rerun`: the command refuses to run unless this is `1`.
pub const ENV_UNSUPPORTED: &str = "UPLIFT_UNSUPPORTED";

/// Developer override variables, captured verbatim into the configuration
/// snapshot and otherwise opaque to the engine.
pub const DEVEL_PREFIX: &str = "UPLIFT_DEVEL_";
pub const SKIP_PREFIX: &str = "UPLIFT_SKIP_";

// ---------------------------------------------------------------------------
// ExecutionConfig
// ---------------------------------------------------------------------------

/// Frozen configuration snapshot of one execution. Stored as JSON in the
/// execution row and carried unchanged into cloned contexts, so a rerun sees
/// exactly what the original run saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub source_version: Option<String>,
    #[serde(default)]
    pub target_version: Option<String>,
    /// Passthrough `UPLIFT_DEVEL_*` / `UPLIFT_SKIP_*` variables.
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
    /// When non-empty, only actors carrying one of these tag names run.
    #[serde(default)]
    pub only_with_tags: Vec<String>,
}

impl ExecutionConfig {
    /// Load an operator-provided YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Capture developer override variables from the process environment.
    pub fn capture_env(&mut self) {
        for (key, value) in std::env::vars() {
            if key.starts_with(DEVEL_PREFIX) || key.starts_with(SKIP_PREFIX) {
                self.flags.insert(key, value);
            }
        }
    }

    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

/// True when `UPLIFT_UNSUPPORTED=1` is present in the environment.
pub fn unsupported_enabled() -> bool {
    std::env::var(ENV_UNSUPPORTED).map(|v| v == "1").unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
