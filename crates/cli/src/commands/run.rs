//! Run Command

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uisuite_runner::{file_sink, ConsoleSummary, EnvironmentSnapshot, HarnessConfig, MultiSink, SuiteRunner};

use super::SuiteArgs;

/// Report file name used when `--report-path` is not given
const DEFAULT_REPORT_NAME: &str = "report.tsv";

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,

    /// Config file (default: uisuite.toml in the suite directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Halt after the first case that does not pass
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Per-case timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Report file; .json and .xml select those formats, anything else is TSV
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    /// Directory for screenshots and per-case logs
    #[arg(long)]
    pub artifacts_dir: Option<PathBuf>,

    /// Suite name used in reports
    #[arg(long)]
    pub suite_name: Option<String>,
}

impl RunArgs {
    /// Flags win over the config file
    fn apply(&self, config: &mut HarnessConfig) {
        if self.stop_on_failure {
            config.run.stop_on_failure = true;
        }
        if let Some(timeout) = self.timeout {
            config.run.timeout_secs = timeout;
        }
        if let Some(dir) = &self.artifacts_dir {
            config.run.artifacts_dir = dir.clone();
        }
        if let Some(name) = &self.suite_name {
            config.run.suite_name = Some(name.clone());
        }
    }
}

pub async fn execute(args: RunArgs) -> Result<i32> {
    let mut config = HarnessConfig::discover(args.config.as_deref(), &args.suite.config_dir())?;
    args.apply(&mut config);

    let runner = SuiteRunner::new(&config)?;
    let suite = args.suite.load()?;
    runner.preflight(&suite).await?;

    let environment = EnvironmentSnapshot::capture(&suite.backend_kinds(), &config.backends.native_ui.env).await;
    info!("Environment: {} ({})", environment.device_type, environment.os);

    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| runner.settings().artifacts_dir.join(DEFAULT_REPORT_NAME));

    let mut sinks = MultiSink::new();
    sinks.push(Box::new(ConsoleSummary::stdout()));
    sinks.push(file_sink(report_path, environment));

    let cancel = CancellationToken::new();
    let watcher = watch_signals(cancel.clone());

    let report = runner.run(&suite, &mut sinks, &cancel).await;
    watcher.abort();

    Ok(report?.exit_code())
}

/// Cancel the run on Ctrl-C or SIGTERM
fn watch_signals(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Interrupt received, terminating the running case");
        cancel.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot install SIGTERM handler: {}", e);
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
