//! Reporting
//!
//! The suite runner hands every classified case to a [`ReportSink`] as soon
//! as it is recorded, and calls [`ReportSink::finish`] on every exit path.
//! Sinks never fail the run: write errors are logged and swallowed.

pub mod json;
pub mod junit;
pub mod summary;
pub mod table;

use std::path::{Path, PathBuf};
use uisuite_common::{CaseRecord, SuiteReport};

use crate::environment::EnvironmentSnapshot;
use crate::manifest::Suite;

pub use json::{JobReport, JsonReport};
pub use junit::{render_junit, JunitReport};
pub use summary::{render_summary, ConsoleSummary};
pub use table::TableReport;

/// Receives results while a suite runs
pub trait ReportSink {
    /// Called once before the first case runs
    fn begin(&mut self, _suite: &Suite) {}

    /// Called once per recorded case, in manifest order
    fn record(&mut self, record: &CaseRecord);

    /// Called with the final (possibly partial) report
    fn finish(&mut self, report: &SuiteReport);
}

/// Fans results out to several sinks
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ReportSink + Send>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn ReportSink + Send>) {
        self.sinks.push(sink);
    }
}

impl ReportSink for MultiSink {
    fn begin(&mut self, suite: &Suite) {
        for sink in &mut self.sinks {
            sink.begin(suite);
        }
    }

    fn record(&mut self, record: &CaseRecord) {
        for sink in &mut self.sinks {
            sink.record(record);
        }
    }

    fn finish(&mut self, report: &SuiteReport) {
        for sink in &mut self.sinks {
            sink.finish(report);
        }
    }
}

/// Report artifact format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Tab-separated rows, appended as cases complete
    Table,
    /// Job report document
    Json,
    /// JUnit XML
    Junit,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "json" => ReportFormat::Json,
            Some(ext) if ext == "xml" => ReportFormat::Junit,
            _ => ReportFormat::Table,
        }
    }
}

/// Build the file sink for a report path
pub fn file_sink(path: PathBuf, environment: EnvironmentSnapshot) -> Box<dyn ReportSink + Send> {
    match ReportFormat::from_path(&path) {
        ReportFormat::Table => Box::new(TableReport::new(path)),
        ReportFormat::Json => Box::new(JsonReport::new(path, environment)),
        ReportFormat::Junit => Box::new(JunitReport::new(path)),
    }
}

/// Write a whole document through a sibling temp file so readers never see
/// a half-written report.
pub(crate) fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use uisuite_common::{
        BackendKind, CaseRecord, Expectation, InvocationResult, SuiteOutcome, SuiteReport, SuiteReportBuilder,
        TestCase, Verdict,
    };

    pub fn record(id: &str, backend: BackendKind, expect: Expectation, exit_code: i32, verdict: Verdict) -> CaseRecord {
        CaseRecord {
            case: TestCase::new(id, backend, format!("{}.fixture", id), expect),
            verdict,
            result: InvocationResult {
                test_case_id: id.to_string(),
                exit_code,
                stdout: String::new(),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    format!("Error: {} failed\n  at step 2", id)
                },
                elapsed_ms: 120,
                timed_out: verdict == Verdict::Timeout,
                screenshot: None,
            },
        }
    }

    /// Four recorded cases covering every verdict, out of five in the manifest
    pub fn report() -> SuiteReport {
        let records = vec![
            record("01_wifi", BackendKind::NativeUi, Expectation::Pass, 0, Verdict::Pass),
            record("02_bluetooth_fail", BackendKind::NativeUi, Expectation::Fail, 1, Verdict::AssertionFailure),
            record("03_chrome_crash", BackendKind::Browser, Expectation::Fail, 1, Verdict::Crash),
            record("04_display", BackendKind::OsScript, Expectation::Pass, -1, Verdict::Timeout),
        ];
        let mut builder = SuiteReportBuilder::new("settings", 5);
        for r in records {
            builder.record(r.case, r.result, r.verdict);
        }
        builder.finish(SuiteOutcome::Interrupted)
    }
}
