//! Verdict classification
//!
//! Maps a raw [`InvocationResult`] to a [`Verdict`]. The mapping is pure:
//! timeout wins over everything, exit code 0 is a pass, and a non-zero exit
//! is a crash only when the scoped output carries a known crash signature.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use std::borrow::Cow;

use crate::types::{Expectation, InvocationResult, Verdict};

/// Crash signatures recognised in stderr of every backend
const BUILTIN_SIGNATURES: &[&str] = &[
    r"(?i)uncaught\s+(exception|error|typeerror)",
    r"(?i)unhandled\s+(exception|promise rejection)",
    r"(?i)null\s*reference",
    r"NullPointerException",
    r"'NoneType' object (has no attribute|is not subscriptable)",
    r"Traceback \(most recent call last\)",
    r"(?i)process crashed",
    r"(?i)cannot read propert(y|ies) of (null|undefined)",
    r"(?i)segmentation fault",
];

static BUILTIN: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(BUILTIN_SIGNATURES).expect("built-in crash signatures are valid"));

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("ANSI escape pattern is valid")
});

/// Set of stderr patterns that mark a failure as a crash
#[derive(Debug, Clone, Default)]
pub struct CrashSignatures {
    extra: Option<RegexSet>,
}

impl CrashSignatures {
    /// Built-in signatures plus user-supplied patterns
    pub fn with_extra<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let set = RegexSet::new(patterns.iter().map(|p| p.as_ref()))?;
        Ok(Self { extra: Some(set) })
    }

    pub fn matches(&self, stderr: &str) -> bool {
        BUILTIN.is_match(stderr) || self.extra.as_ref().map(|s| s.is_match(stderr)).unwrap_or(false)
    }
}

/// Which captured output crash signatures are matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureScope {
    /// Only stderr
    #[default]
    Stderr,
    /// Stderr, then stdout; for runners that report test errors on stdout
    StderrThenStdout,
}

/// Classify one invocation
pub fn classify(result: &InvocationResult, signatures: &CrashSignatures, scope: SignatureScope) -> Verdict {
    if result.timed_out {
        Verdict::Timeout
    } else if result.exit_code == 0 {
        Verdict::Pass
    } else if is_crash(result, signatures, scope) {
        Verdict::Crash
    } else {
        Verdict::AssertionFailure
    }
}

fn is_crash(result: &InvocationResult, signatures: &CrashSignatures, scope: SignatureScope) -> bool {
    match scope {
        SignatureScope::Stderr => signatures.matches(&result.stderr),
        SignatureScope::StderrThenStdout => signatures.matches(&result.stderr) || signatures.matches(&result.stdout),
    }
}

/// Whether a verdict is what the case declared.
///
/// A `Fail` expectation is met by any non-passing verdict.
pub fn matches_expectation(expect: Expectation, verdict: Verdict) -> bool {
    match expect {
        Expectation::Pass => verdict.is_pass(),
        Expectation::Fail => !verdict.is_pass(),
    }
}

/// Remove terminal color and cursor escape sequences
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}
