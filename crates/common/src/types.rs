//! Core types for uisuite

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Process exit code when every case passed
pub const EXIT_SUCCESS: i32 = 0;

/// Process exit code when at least one case did not pass
pub const EXIT_FAILURE: i32 = 1;

/// Process exit code for manifest, config or infrastructure errors
pub const EXIT_INFRASTRUCTURE: i32 = 2;

/// Automation technology that drives a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Native UI inspector (UiAutomator instrumentation on a device)
    #[serde(alias = "native_ui_automation", alias = "NATIVE_UI_AUTOMATION")]
    NativeUi,
    /// Browser driver (Playwright)
    #[serde(alias = "browser_automation", alias = "BROWSER_AUTOMATION")]
    Browser,
    /// OS scripting engine (AppleScript)
    #[serde(alias = "OS_SCRIPT")]
    OsScript,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::NativeUi, BackendKind::Browser, BackendKind::OsScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::NativeUi => "native_ui",
            BackendKind::Browser => "browser",
            BackendKind::OsScript => "os_script",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared outcome of a test case
///
/// Suites intentionally carry failing cases to exercise failure reporting;
/// the expectation is informational and never changes the exit code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    #[default]
    #[serde(alias = "PASS")]
    Pass,
    #[serde(alias = "FAIL")]
    Fail,
}

impl Expectation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expectation::Pass => "pass",
            Expectation::Fail => "fail",
        }
    }
}

/// Static descriptor of one test case, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique identifier; suites are ordered lexicographically by id
    pub id: String,

    /// Backend that runs this case
    pub backend: BackendKind,

    /// Fixture path handed to the backend
    pub target: PathBuf,

    /// Declared outcome
    #[serde(default)]
    pub expect: Expectation,
}

impl TestCase {
    pub fn new(id: impl Into<String>, backend: BackendKind, target: impl Into<PathBuf>, expect: Expectation) -> Self {
        Self {
            id: id.into(),
            backend,
            target: target.into(),
            expect,
        }
    }

    /// Human-readable name derived from the id.
    ///
    /// A leading ordinal token (`01`, `TC03`) is dropped and the remaining
    /// words are capitalized: `TC01_open_wifi` becomes `Open Wifi`.
    pub fn display_name(&self) -> String {
        let mut words: Vec<&str> = self
            .id
            .split(|c| c == '_' || c == '-' || c == ' ')
            .filter(|w| !w.is_empty())
            .collect();

        if words.len() > 1 && is_ordinal(words[0]) {
            words.remove(0);
        }

        words
            .iter()
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

fn is_ordinal(token: &str) -> bool {
    let digits = token
        .strip_prefix("TC")
        .or_else(|| token.strip_prefix("tc"))
        .unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Raw outcome of one invocation, produced once by the backend invoker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub test_case_id: String,

    /// Process exit code; `128 + signal` when killed by a signal, `-1` on timeout
    pub exit_code: i32,

    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub timed_out: bool,

    /// Screenshot artifact written by the case, if any
    #[serde(default)]
    pub screenshot: Option<PathBuf>,
}

impl InvocationResult {
    /// First non-empty line of stderr, falling back to stdout
    pub fn first_error_line(&self) -> Option<&str> {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
    }
}

/// Normalized classification of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    AssertionFailure,
    Crash,
    Timeout,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::AssertionFailure => "ASSERTION_FAILURE",
            Verdict::Crash => "CRASH",
            Verdict::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the ordered verdict sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case: TestCase,
    pub verdict: Verdict,
    pub result: InvocationResult,
}

/// How a suite run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuiteOutcome {
    /// Every case got its attempt
    Completed,
    /// Halted after the first non-passing case
    Stopped,
    /// Cancelled by the operator
    Interrupted,
    /// Halted by an infrastructure error
    Aborted,
}

/// Aggregated, immutable result of a suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite_name: String,

    /// Number of cases in the manifest
    pub total_count: usize,
    pub pass_count: usize,

    /// Recorded cases that did not pass
    pub fail_count: usize,

    /// Recorded cases in manifest order
    pub records: Vec<CaseRecord>,

    pub outcome: SuiteOutcome,
}

impl SuiteReport {
    /// Ordered `(id, verdict)` pairs
    pub fn verdicts(&self) -> Vec<(&str, Verdict)> {
        self.records
            .iter()
            .map(|r| (r.case.id.as_str(), r.verdict))
            .collect()
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.records.iter().filter(|r| r.verdict == verdict).count()
    }

    pub fn all_passed(&self) -> bool {
        self.pass_count == self.total_count
    }

    /// 0 when every manifest case passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    /// Percentage of manifest cases that passed
    pub fn pass_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.pass_count as f64 / self.total_count as f64 * 100.0
    }
}

/// Accumulates records while a suite runs
#[derive(Debug)]
pub struct SuiteReportBuilder {
    suite_name: String,
    total_count: usize,
    records: Vec<CaseRecord>,
}

impl SuiteReportBuilder {
    pub fn new(suite_name: impl Into<String>, total_count: usize) -> Self {
        Self {
            suite_name: suite_name.into(),
            total_count,
            records: Vec::with_capacity(total_count),
        }
    }

    pub fn record(&mut self, case: TestCase, result: InvocationResult, verdict: Verdict) -> &CaseRecord {
        self.records.push(CaseRecord { case, verdict, result });
        &self.records[self.records.len() - 1]
    }

    pub fn recorded(&self) -> usize {
        self.records.len()
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn suite_name(&self) -> &str {
        &self.suite_name
    }

    pub fn finish(self, outcome: SuiteOutcome) -> SuiteReport {
        let pass_count = self.records.iter().filter(|r| r.verdict.is_pass()).count();
        let fail_count = self.records.len() - pass_count;

        SuiteReport {
            suite_name: self.suite_name,
            total_count: self.total_count,
            pass_count,
            fail_count,
            records: self.records,
            outcome,
        }
    }
}
