//! Snapshot of the device or host a suite ran against

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use uisuite_common::BackendKind;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub device_type: String,
    pub os: String,
}

impl EnvironmentSnapshot {
    /// Host description, used when no device backend is involved
    pub fn host() -> Self {
        Self {
            device_type: "Desktop".to_string(),
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Describe the environment for the backends a suite uses.
    ///
    /// Suites with native UI cases report the attached Android device;
    /// anything else reports the host.
    pub async fn capture(kinds: &BTreeSet<BackendKind>, env: &BTreeMap<String, String>) -> Self {
        if !kinds.contains(&BackendKind::NativeUi) {
            return Self::host();
        }

        let model = getprop("ro.product.model", env).await;
        let release = getprop("ro.build.version.release", env).await;

        Self {
            device_type: model.unwrap_or_else(|| UNKNOWN.to_string()),
            os: release
                .map(|v| format!("Android {}", v))
                .unwrap_or_else(|| "Unknown OS".to_string()),
        }
    }
}

async fn getprop(property: &str, env: &BTreeMap<String, String>) -> Option<String> {
    let output = Command::new("adb")
        .args(["shell", "getprop", property])
        .envs(env)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {
            let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        Ok(Ok(output)) => {
            debug!("adb getprop {} exited with {}", property, output.status);
            None
        }
        Ok(Err(e)) => {
            debug!("adb getprop {} failed: {}", property, e);
            None
        }
        Err(_) => {
            debug!("adb getprop {} timed out", property);
            None
        }
    }
}
