//! Human-readable summary

use colored::Colorize;
use std::io::Write;
use tracing::warn;
use uisuite_common::{matches_expectation, CaseRecord, Expectation, SuiteOutcome, SuiteReport, Verdict};

use super::ReportSink;
use crate::manifest::Suite;

/// Prints one line per case as it completes, then the tally
pub struct ConsoleSummary<W: Write> {
    out: W,
}

impl ConsoleSummary<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSummary<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, result: std::io::Result<()>) {
        if let Err(e) = result.and_then(|_| self.out.flush()) {
            warn!("Failed to write summary: {}", e);
        }
    }
}

impl<W: Write> ReportSink for ConsoleSummary<W> {
    fn begin(&mut self, suite: &Suite) {
        let header = format!("Running suite `{}` ({} case(s))...", suite.name, suite.len());
        let result = writeln!(self.out, "{}\n", header.blue().bold());
        self.emit(result);
    }

    fn record(&mut self, record: &CaseRecord) {
        let result = write_case_line(&mut self.out, record);
        self.emit(result);
    }

    fn finish(&mut self, report: &SuiteReport) {
        let result = write_tally(&mut self.out, report);
        self.emit(result);
    }
}

/// Render the whole summary for a finished report
pub fn render_summary<W: Write>(report: &SuiteReport, out: &mut W) -> std::io::Result<()> {
    for record in &report.records {
        write_case_line(out, record)?;
    }
    write_tally(out, report)
}

fn write_case_line<W: Write>(out: &mut W, record: &CaseRecord) -> std::io::Result<()> {
    let elapsed = format!("({} ms)", record.result.elapsed_ms).dimmed();
    let expectation = if !matches_expectation(record.case.expect, record.verdict) {
        format!(" [expected {}]", record.case.expect.as_str()).yellow()
    } else if record.case.expect == Expectation::Fail {
        " [expected]".dimmed()
    } else {
        "".normal()
    };

    match record.verdict {
        Verdict::Pass => writeln!(out, "  {} {} {}{}", "✓".green(), record.case.id, elapsed, expectation),
        verdict => {
            writeln!(
                out,
                "  {} {} {} {}{}",
                "✗".red(),
                record.case.id,
                verdict_label(verdict),
                elapsed,
                expectation
            )?;
            if let Some(line) = record.result.first_error_line() {
                writeln!(out, "      {}", line.dimmed())?;
            }
            Ok(())
        }
    }
}

fn verdict_label(verdict: Verdict) -> colored::ColoredString {
    match verdict {
        Verdict::Pass => verdict.label().green(),
        Verdict::AssertionFailure => verdict.label().red(),
        Verdict::Crash => verdict.label().magenta().bold(),
        Verdict::Timeout => verdict.label().yellow().bold(),
    }
}

fn write_tally<W: Write>(out: &mut W, report: &SuiteReport) -> std::io::Result<()> {
    writeln!(out)?;

    match report.outcome {
        SuiteOutcome::Completed => {}
        SuiteOutcome::Stopped => writeln!(out, "{}", "Stopped after first failure.".yellow())?,
        SuiteOutcome::Interrupted => writeln!(out, "{}", "Run interrupted.".yellow())?,
        SuiteOutcome::Aborted => writeln!(out, "{}", "Run aborted by an infrastructure error.".red())?,
    }

    let recorded = report.records.len();
    let line = format!(
        "{} of {} case(s) run: {} passed, {} failed ({} assertion failure(s), {} crash(es), {} timeout(s))",
        recorded,
        report.total_count,
        report.pass_count,
        report.fail_count,
        report.count(Verdict::AssertionFailure),
        report.count(Verdict::Crash),
        report.count(Verdict::Timeout),
    );

    if report.all_passed() {
        writeln!(out, "{}", line.green().bold())
    } else {
        writeln!(out, "{}", line.red().bold())
    }
}
