//! CLI Commands

pub mod check;
pub mod list;
pub mod run;

use clap::Args;
use std::path::PathBuf;
use uisuite_runner::{HarnessResult, Suite};

/// Where to find the suite
#[derive(Args, Debug, Clone)]
pub struct SuiteArgs {
    /// Suite directory (holds suite.yaml or fixture files)
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Explicit manifest file; overrides the lookup in --dir
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

impl SuiteArgs {
    pub fn load(&self) -> HarnessResult<Suite> {
        Suite::load(&self.dir, self.manifest.as_deref())
    }

    /// Directory searched for `uisuite.toml`
    pub fn config_dir(&self) -> PathBuf {
        match &self.manifest {
            Some(path) => path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| self.dir.clone()),
            None => self.dir.clone(),
        }
    }
}
