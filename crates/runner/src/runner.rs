//! Suite runner
//!
//! Runs the cases of a [`Suite`] strictly one after another in manifest
//! order. UI-automation backends own a single device, browser or display, so
//! there is never more than one invocation in flight.

use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uisuite_common::{classify, CrashSignatures, SuiteOutcome, SuiteReport, SuiteReportBuilder};

use crate::backend::{Backends, Invocation, InvokeContext};
use crate::config::{HarnessConfig, RunSettings};
use crate::error::HarnessResult;
use crate::manifest::Suite;
use crate::report::ReportSink;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Running,
    Invoking,
    Classifying,
    Done,
}

impl RunState {
    fn advance(&mut self, next: RunState) {
        debug!("Runner state {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Main suite runner
pub struct SuiteRunner {
    backends: Backends,
    signatures: CrashSignatures,
    settings: RunSettings,
}

impl SuiteRunner {
    /// Create a runner from validated configuration
    pub fn new(config: &HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            backends: Backends::from_config(config),
            signatures: config.crash_signatures()?,
            settings: config.run.clone(),
        })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Probe every backend the suite needs before anything runs
    pub async fn preflight(&self, suite: &Suite) -> HarnessResult<()> {
        for kind in suite.backend_kinds() {
            self.backends.get(kind).probe(self.settings.timeout()).await?;
            info!("{} backend is reachable", kind);
        }
        Ok(())
    }

    /// Run every case, feeding each record to `sink` as soon as it is
    /// classified.
    ///
    /// Returns the final report, which is partial when the run was stopped
    /// or cancelled. An infrastructure error aborts the run; the sink still
    /// receives the partial report before the error is returned.
    pub async fn run(
        &self,
        suite: &Suite,
        sink: &mut dyn ReportSink,
        cancel: &CancellationToken,
    ) -> HarnessResult<SuiteReport> {
        let mut state = RunState::Ready;
        let start = Instant::now();
        let renamed;
        let suite = match &self.settings.suite_name {
            Some(name) => {
                renamed = Suite {
                    name: name.clone(),
                    ..suite.clone()
                };
                &renamed
            }
            None => suite,
        };

        std::fs::create_dir_all(&self.settings.artifacts_dir)?;

        let mut builder = SuiteReportBuilder::new(suite.name.clone(), suite.len());
        let mut outcome = SuiteOutcome::Completed;
        sink.begin(suite);

        state.advance(RunState::Running);
        info!("Running {} test case(s)...", suite.len());

        let ctx = InvokeContext {
            timeout: self.settings.timeout(),
            grace: self.settings.grace_period(),
            artifacts_dir: &self.settings.artifacts_dir,
            cancel,
        };

        for (index, case) in suite.cases.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome = SuiteOutcome::Interrupted;
                break;
            }

            state.advance(RunState::Invoking);
            debug!("[{}/{}] {} via {}", index + 1, suite.len(), case.id, case.backend);

            let backend = self.backends.get(case.backend);
            let result = match backend.invoke(case, &ctx).await {
                Ok(Invocation::Finished(result)) => result,
                Ok(Invocation::Interrupted { elapsed_ms }) => {
                    warn!("Interrupted during `{}` after {} ms; discarding it", case.id, elapsed_ms);
                    outcome = SuiteOutcome::Interrupted;
                    break;
                }
                Err(e) => {
                    error!("Aborting suite at `{}`: {}", case.id, e);
                    let report = builder.finish(SuiteOutcome::Aborted);
                    sink.finish(&report);
                    return Err(e);
                }
            };

            state.advance(RunState::Classifying);
            let verdict = classify(&result, &self.signatures, backend.signature_scope());

            debug!(
                "{} -> {} (exit {}, {} ms)",
                case.id, verdict, result.exit_code, result.elapsed_ms
            );

            let record = builder.record(case.clone(), result, verdict);
            sink.record(record);

            let remaining = suite.len() - (index + 1);
            if self.settings.stop_on_failure && !verdict.is_pass() && remaining > 0 {
                info!("Stopping after first failure; {} case(s) not run", remaining);
                outcome = SuiteOutcome::Stopped;
                break;
            }
        }

        state.advance(RunState::Done);
        let report = builder.finish(outcome);

        info!(
            "Test Results: {} passed, {} failed, {} not run ({} ms)",
            report.pass_count,
            report.fail_count,
            report.total_count - report.records.len(),
            start.elapsed().as_millis()
        );

        sink.finish(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_rejects_invalid_config() {
        let mut config = HarnessConfig::default();
        config.run.timeout_secs = 0;
        assert!(matches!(SuiteRunner::new(&config), Err(crate::HarnessError::Config(_))));

        let mut config = HarnessConfig::default();
        config.crash_signatures = vec!["(unclosed".to_string()];
        assert!(SuiteRunner::new(&config).is_err());
    }

    #[test]
    fn test_runner_uses_configured_launchers() {
        let mut config = HarnessConfig::default();
        config.backends.os_script.program = Some("sh".to_string());
        let runner = SuiteRunner::new(&config).unwrap();

        let kind = uisuite_common::BackendKind::OsScript;
        assert_eq!(runner.backends().get(kind).launcher().program, "sh");
        assert_eq!(runner.backends().get(kind).kind(), kind);
        assert_eq!(runner.settings().timeout_secs, 30);
    }

    #[test]
    fn test_state_advance() {
        let mut state = RunState::Ready;
        state.advance(RunState::Running);
        state.advance(RunState::Invoking);
        assert_eq!(state, RunState::Invoking);
    }
}
