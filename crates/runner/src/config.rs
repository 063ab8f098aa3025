//! Runner configuration
//!
//! Loaded from `uisuite.toml`. Every section and key is optional; CLI flags
//! are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use uisuite_common::{BackendKind, CrashSignatures};

use crate::error::{HarnessError, HarnessResult};

/// Name of the config file looked up in the suite directory
pub const CONFIG_FILE_NAME: &str = "uisuite.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Extra stderr patterns that classify a failure as a crash
    pub crash_signatures: Vec<String>,

    /// Run behaviour
    pub run: RunSettings,

    /// Per-backend launch overrides
    pub backends: BackendOverrides,
}

/// Settings for a single suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    /// Per-case timeout
    pub timeout_secs: u64,

    /// Halt after the first non-passing case
    pub stop_on_failure: bool,

    /// Directory for screenshots and per-case logs
    pub artifacts_dir: PathBuf,

    /// Suite name used in reports (defaults to the manifest name)
    pub suite_name: Option<String>,

    /// Time between SIGTERM and SIGKILL when terminating a case
    pub grace_period_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            stop_on_failure: false,
            artifacts_dir: PathBuf::from("test-results"),
            suite_name: None,
            grace_period_ms: 500,
        }
    }
}

impl RunSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendOverrides {
    pub native_ui: LauncherOverride,
    pub browser: LauncherOverride,
    pub os_script: LauncherOverride,
}

impl BackendOverrides {
    pub fn get(&self, kind: BackendKind) -> &LauncherOverride {
        match kind {
            BackendKind::NativeUi => &self.native_ui,
            BackendKind::Browser => &self.browser,
            BackendKind::OsScript => &self.os_script,
        }
    }

    pub fn get_mut(&mut self, kind: BackendKind) -> &mut LauncherOverride {
        match kind {
            BackendKind::NativeUi => &mut self.native_ui,
            BackendKind::Browser => &mut self.browser,
            BackendKind::OsScript => &mut self.os_script,
        }
    }
}

/// Fields left unset keep the backend's built-in launcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherOverride {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub probe: Option<Vec<String>>,
    pub cleanup: Option<Vec<String>>,
    pub collect: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
}

impl HarnessConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(toml: &str) -> HarnessResult<Self> {
        toml::from_str(toml).map_err(HarnessError::from)
    }

    /// Parse configuration from a TOML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Load the explicit config file, or `uisuite.toml` in the suite directory
    /// when present, or fall back to defaults.
    pub fn discover(explicit: Option<&Path>, suite_dir: &Path) -> HarnessResult<Self> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        let candidate = suite_dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            debug!("Loading config from {}", candidate.display());
            Self::from_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Compile the crash signature set
    pub fn crash_signatures(&self) -> HarnessResult<CrashSignatures> {
        CrashSignatures::with_extra(&self.crash_signatures)
            .map_err(|e| HarnessError::Config(format!("invalid crash signature: {}", e)))
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.run.timeout_secs == 0 {
            return Err(HarnessError::Config("run.timeout_secs must be greater than zero".to_string()));
        }
        for kind in BackendKind::ALL {
            if let Some(program) = &self.backends.get(kind).program {
                if program.trim().is_empty() {
                    return Err(HarnessError::Config(format!("backends.{}.program is empty", kind)));
                }
            }
        }
        self.crash_signatures().map(|_| ())
    }
}
