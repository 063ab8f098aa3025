//! Error types for suite runs
//!
//! Only the fatal classes live here. Per-case outcomes (assertion failures,
//! crashes, timeouts) are verdicts, never errors.

use std::path::PathBuf;
use thiserror::Error;
use uisuite_common::{BackendKind, EXIT_INFRASTRUCTURE};

/// Bad fixture listing; detected before any invocation
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Suite directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Failed to parse manifest {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Duplicate test case id: {0}")]
    DuplicateId(String),

    #[error("Test case has an empty id (target: {0})")]
    EmptyId(PathBuf),

    #[error("Target for `{id}` does not exist: {target}")]
    MissingTarget { id: String, target: PathBuf },

    #[error("No test cases found in {0}")]
    Empty(PathBuf),
}

/// Environment failure; aborts the whole suite
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("{kind} backend unavailable: {reason}")]
    BackendUnavailable { kind: BackendKind, reason: String },

    #[error("Failed to spawn {program} for `{id}`: {source}")]
    Spawn {
        id: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Lost control of `{id}`: {reason}")]
    Session { id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HarnessError {
    /// Process exit code for errors that halt a run
    pub fn exit_code(&self) -> i32 {
        EXIT_INFRASTRUCTURE
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, HarnessError::Infrastructure(_))
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
