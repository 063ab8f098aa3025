//! uisuite CLI - Main Entry Point
//!
//! Runs UI-automation suites, lists their cases and checks that the
//! backends they need are reachable.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use uisuite_common::EXIT_INFRASTRUCTURE;
use uisuite_runner::HarnessError;

mod commands;
mod output;

use commands::{check, list, run};

/// uisuite - sequential runner for UI-automation test suites
#[derive(Parser)]
#[command(name = "uisuite")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format for `list` and `check`
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a suite and write its report
    Run(run::RunArgs),

    /// List the cases of a suite in run order
    List(list::ListArgs),

    /// Probe the backends a suite needs without running it
    Check(check::CheckArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run(args) => run::execute(args).await,
        Commands::List(args) => list::execute(args, cli.format),
        Commands::Check(args) => check::execute(args, cli.format).await,
    };

    if let Err(e) = &result {
        output::print_error(&format!("{:#}", e));
    }
    exit_code(status_code(&result))
}

/// Process exit code for a command outcome.
///
/// Commands return 0 or 1 themselves; any error that halted them is 2. The
/// error chain is searched so added context never hides the harness error.
fn status_code(result: &anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => *code,
        Err(e) => e
            .chain()
            .find_map(|cause| cause.downcast_ref::<HarnessError>())
            .map(HarnessError::exit_code)
            .unwrap_or(EXIT_INFRASTRUCTURE),
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::path::Path;
    use tempfile::TempDir;
    use uisuite_common::{EXIT_FAILURE, EXIT_SUCCESS};

    fn suite_dir(tmp: &Path, fixtures: &[(&str, &str)], config: &str) -> std::path::PathBuf {
        let dir = tmp.join("suite");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, body) in fixtures {
            std::fs::write(dir.join(name), body).unwrap();
        }
        std::fs::write(dir.join("uisuite.toml"), config).unwrap();
        dir
    }

    const SH_BACKEND: &str = r#"
[backends.native_ui]
program = "sh"
args = ["{target}"]
probe = ["sh", "-c", "exit 0"]
"#;

    fn run_args(dir: &Path, artifacts: &Path) -> run::RunArgs {
        run::RunArgs {
            suite: commands::SuiteArgs {
                dir: dir.to_path_buf(),
                manifest: None,
            },
            config: None,
            stop_on_failure: false,
            timeout: Some(5),
            report_path: None,
            artifacts_dir: Some(artifacts.to_path_buf()),
            suite_name: None,
        }
    }

    async fn run_status(fixtures: &[(&str, &str)], config: &str) -> i32 {
        let tmp = TempDir::new().unwrap();
        let dir = suite_dir(tmp.path(), fixtures, config);
        status_code(&run::execute(run_args(&dir, &tmp.path().join("artifacts"))).await)
    }

    #[tokio::test]
    async fn test_all_pass_exits_zero() {
        let code = run_status(&[("a.sh", "exit 0\n"), ("b.sh", "exit 0\n")], SH_BACKEND).await;
        assert_eq!(code, EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_any_failure_exits_one() {
        let code = run_status(&[("a.sh", "exit 0\n"), ("b_fail.sh", "exit 1\n")], SH_BACKEND).await;
        assert_eq!(code, EXIT_FAILURE);
    }

    #[tokio::test]
    async fn test_invalid_config_exits_two() {
        let config = format!("{}\n[run]\ntimeout_secs = 0\n", SH_BACKEND);
        let tmp = TempDir::new().unwrap();
        let dir = suite_dir(tmp.path(), &[("a.sh", "exit 0\n")], &config);
        let mut args = run_args(&dir, &tmp.path().join("artifacts"));
        args.timeout = None;

        let result = run::execute(args).await;
        assert!(matches!(
            result.as_ref().unwrap_err().downcast_ref::<HarnessError>(),
            Some(HarnessError::Config(_))
        ));
        assert_eq!(status_code(&result), EXIT_INFRASTRUCTURE);
    }

    #[tokio::test]
    async fn test_failed_preflight_exits_two() {
        let config = SH_BACKEND.replace(r#"probe = ["sh", "-c", "exit 0"]"#, r#"probe = ["sh", "-c", "exit 1"]"#);
        let code = run_status(&[("a.sh", "exit 0\n")], &config).await;
        assert_eq!(code, EXIT_INFRASTRUCTURE);
    }

    #[tokio::test]
    async fn test_manifest_error_exits_two() {
        let manifest = "cases:\n  - { id: a, backend: native_ui, target: missing.sh }\n";
        let code = run_status(&[("suite.yaml", manifest)], SH_BACKEND).await;
        assert_eq!(code, EXIT_INFRASTRUCTURE);
    }

    #[test]
    fn test_context_keeps_harness_exit_code() {
        let err = HarnessError::Config("bad".to_string());
        let result: anyhow::Result<i32> = Err(err).context("loading uisuite.toml");
        assert_eq!(status_code(&result), EXIT_INFRASTRUCTURE);
        assert_eq!(status_code(&Ok(EXIT_FAILURE)), EXIT_FAILURE);
    }
}
