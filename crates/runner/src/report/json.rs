//! JSON job report
//!
//! The document is rewritten after every recorded case (status `RUNNING`)
//! and once more when the suite finishes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};
use uisuite_common::{matches_expectation, CaseRecord, SuiteOutcome, SuiteReport, Verdict};
use uuid::Uuid;

use super::{write_atomically, ReportSink};
use crate::environment::EnvironmentSnapshot;
use crate::manifest::Suite;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub suite_name: String,
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_seconds: f64,
    pub passrate: String,
    pub progress: String,
    pub messages: Vec<String>,
    pub screenshots: Vec<String>,
    pub environment: EnvironmentSnapshot,
    pub summary: JobSummary,
    pub test_cases: Vec<JobTestCase>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub assertion_failures: usize,
    pub crashed: usize,
    pub timed_out: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTestCase {
    pub id: String,
    pub name: String,
    pub backend: String,
    pub expect: String,
    pub verdict: Verdict,
    pub matches_expectation: bool,
    pub duration_ms: u64,
    pub screenshot: Option<String>,
    pub logs: String,
}

impl JobTestCase {
    fn from_record(record: &CaseRecord) -> Self {
        let logs = if record.verdict.is_pass() {
            String::new()
        } else {
            record.result.stderr.trim().to_string()
        };

        Self {
            id: record.case.id.clone(),
            name: record.case.display_name(),
            backend: record.case.backend.as_str().to_string(),
            expect: record.case.expect.as_str().to_string(),
            verdict: record.verdict,
            matches_expectation: matches_expectation(record.case.expect, record.verdict),
            duration_ms: record.result.elapsed_ms,
            screenshot: record
                .result
                .screenshot
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
            logs,
        }
    }
}

/// Status string for a finished run
pub fn job_status(report: &SuiteReport) -> &'static str {
    match report.outcome {
        SuiteOutcome::Completed if report.all_passed() => "PASSED",
        SuiteOutcome::Completed => "FAILED",
        SuiteOutcome::Stopped => "STOPPED",
        SuiteOutcome::Interrupted => "INTERRUPTED",
        SuiteOutcome::Aborted => "ABORTED",
    }
}

impl JobReport {
    /// Assemble the document from recorded cases
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        job_id: &str,
        suite_name: &str,
        total: usize,
        records: &[CaseRecord],
        status: &str,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        environment: &EnvironmentSnapshot,
    ) -> Self {
        let passed = records.iter().filter(|r| r.verdict.is_pass()).count();
        let count = |v: Verdict| records.iter().filter(|r| r.verdict == v).count();

        let passrate = if total > 0 {
            passed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let duration_seconds = ended_at
            .map(|end| (end - started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        let mut messages = vec!["Test suite initiated.".to_string()];
        for record in records.iter().filter(|r| !r.verdict.is_pass()) {
            let detail = record.result.first_error_line().unwrap_or("no output");
            messages.push(format!(
                "Test '{}' {}: {}",
                record.case.id,
                record.verdict.label(),
                detail
            ));
        }
        if ended_at.is_some() {
            messages.push("Test suite finished.".to_string());
        }

        Self {
            job_id: job_id.to_string(),
            suite_name: suite_name.to_string(),
            status: status.to_string(),
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ended_at: ended_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            duration_seconds,
            passrate: format!("{:.2}%", passrate),
            progress: format!("{}/{}", records.len(), total),
            messages,
            screenshots: records
                .iter()
                .filter_map(|r| r.result.screenshot.as_ref())
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
            environment: environment.clone(),
            summary: JobSummary {
                total,
                passed,
                failed: records.len() - passed,
                assertion_failures: count(Verdict::AssertionFailure),
                crashed: count(Verdict::Crash),
                timed_out: count(Verdict::Timeout),
            },
            test_cases: records.iter().map(JobTestCase::from_record).collect(),
        }
    }
}

/// Sink that keeps the JSON job report current on disk
pub struct JsonReport {
    path: PathBuf,
    job_id: String,
    environment: EnvironmentSnapshot,
    suite_name: String,
    total: usize,
    started_at: DateTime<Utc>,
    records: Vec<CaseRecord>,
}

impl JsonReport {
    pub fn new(path: PathBuf, environment: EnvironmentSnapshot) -> Self {
        Self {
            path,
            job_id: Uuid::new_v4().to_string(),
            environment,
            suite_name: String::new(),
            total: 0,
            started_at: Utc::now(),
            records: Vec::new(),
        }
    }

    fn write(&self, report: &JobReport) {
        let result = serde_json::to_vec_pretty(report)
            .map_err(std::io::Error::from)
            .and_then(|json| write_atomically(&self.path, &json));

        if let Err(e) = result {
            warn!("Failed to write report {}: {}", self.path.display(), e);
        }
    }
}

impl ReportSink for JsonReport {
    fn begin(&mut self, suite: &Suite) {
        self.suite_name = suite.name.clone();
        self.total = suite.len();
        self.started_at = Utc::now();
    }

    fn record(&mut self, record: &CaseRecord) {
        self.records.push(record.clone());
        let report = JobReport::build(
            &self.job_id,
            &self.suite_name,
            self.total,
            &self.records,
            "RUNNING",
            self.started_at,
            None,
            &self.environment,
        );
        self.write(&report);
    }

    fn finish(&mut self, report: &SuiteReport) {
        let job = JobReport::build(
            &self.job_id,
            &report.suite_name,
            report.total_count,
            &report.records,
            job_status(report),
            self.started_at,
            Some(Utc::now()),
            &self.environment,
        );
        self.write(&job);
        info!("Results written to: {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures;
    use tempfile::TempDir;

    #[test]
    fn test_build_job_report() {
        let report = fixtures::report();
        let started = Utc::now();
        let ended = started + chrono::Duration::milliseconds(2500);
        let job = JobReport::build(
            "job-1",
            &report.suite_name,
            report.total_count,
            &report.records,
            job_status(&report),
            started,
            Some(ended),
            &EnvironmentSnapshot::host(),
        );

        assert_eq!(job.status, "INTERRUPTED");
        assert_eq!(job.passrate, "20.00%");
        assert_eq!(job.progress, "4/5");
        assert_eq!(job.duration_seconds, 2.5);
        assert_eq!(job.summary.passed, 1);
        assert_eq!(job.summary.failed, 3);
        assert_eq!(job.summary.crashed, 1);
        assert_eq!(job.summary.timed_out, 1);
        assert_eq!(job.messages.first().unwrap(), "Test suite initiated.");
        assert_eq!(job.messages.last().unwrap(), "Test suite finished.");
        assert_eq!(job.messages.len(), 5);
        assert!(job.messages[1].starts_with("Test '02_bluetooth_fail' ASSERTION_FAILURE: Error:"));

        let case = &job.test_cases[1];
        assert_eq!(case.name, "Bluetooth Fail");
        assert!(case.matches_expectation);
        assert!(case.logs.contains("at step 2"));
        assert!(job.test_cases[0].logs.is_empty());
        assert!(!job.test_cases[3].matches_expectation);
    }

    #[test]
    fn test_sink_rewrites_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("result.json");
        let report = fixtures::report();

        let mut sink = JsonReport::new(path.clone(), EnvironmentSnapshot::host());
        sink.record(&report.records[0]);

        let partial: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(partial["status"], "RUNNING");
        assert_eq!(partial["test_cases"].as_array().unwrap().len(), 1);
        assert!(partial["ended_at"].is_null());

        sink.finish(&report);
        let done: JobReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(done.status, "INTERRUPTED");
        assert_eq!(done.test_cases.len(), 4);
        assert_eq!(done.test_cases[2].verdict, Verdict::Crash);
        assert!(done.ended_at.is_some());
    }
}
