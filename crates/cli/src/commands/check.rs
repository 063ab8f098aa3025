//! Check Command
//!
//! Loads the suite and configuration and runs the backend probes, without
//! invoking any case.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use uisuite_common::EXIT_SUCCESS;
use uisuite_runner::{HarnessConfig, SuiteRunner};

use super::SuiteArgs;
use crate::output::{print_message, print_success, OutputFormat};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,

    /// Config file (default: uisuite.toml in the suite directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: CheckArgs, format: OutputFormat) -> Result<i32> {
    let config = HarnessConfig::discover(args.config.as_deref(), &args.suite.config_dir())?;
    let runner = SuiteRunner::new(&config)?;
    let suite = args.suite.load()?;

    runner.preflight(&suite).await?;

    let kinds: Vec<&str> = suite.backend_kinds().into_iter().map(|k| k.as_str()).collect();
    let message = format!(
        "Suite `{}` is ready: {} case(s), backends reachable: {}",
        suite.name,
        suite.len(),
        kinds.join(", ")
    );

    match format {
        OutputFormat::Table => print_success(&message),
        _ => print_message(&message, format),
    }
    Ok(EXIT_SUCCESS)
}
