//! JUnit XML report
//!
//! One `<testsuite>` per run. ASSERTION_FAILURE cases carry a `<failure>`;
//! CRASH and TIMEOUT carry an `<error>`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use uisuite_common::{CaseRecord, SuiteReport, Verdict};

use super::{write_atomically, ReportSink};

pub struct JunitReport {
    path: PathBuf,
}

impl JunitReport {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReportSink for JunitReport {
    fn record(&mut self, _record: &CaseRecord) {}

    fn finish(&mut self, report: &SuiteReport) {
        let mut buf = Vec::new();
        let result = render_junit(report, &mut buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            .and_then(|_| write_atomically(&self.path, &buf));

        match result {
            Ok(()) => info!("Results written to: {}", self.path.display()),
            Err(e) => warn!("Failed to write report {}: {}", self.path.display(), e),
        }
    }
}

/// Serialize a report as JUnit XML
pub fn render_junit<W: Write>(report: &SuiteReport, out: W) -> Result<(), quick_xml::Error> {
    let mut writer = Writer::new_with_indent(out, b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let errors = report.count(Verdict::Crash) + report.count(Verdict::Timeout);
    let failures = report.count(Verdict::AssertionFailure);
    let skipped = report.total_count - report.records.len();
    let time: u64 = report.records.iter().map(|r| r.result.elapsed_ms).sum();

    let mut suites = BytesStart::new("testsuites");
    suites.extend_attributes([
        ("name", report.suite_name.as_str()),
        ("tests", report.total_count.to_string().as_str()),
        ("failures", failures.to_string().as_str()),
        ("errors", errors.to_string().as_str()),
    ]);
    serialize_time(&mut suites, time);
    writer.write_event(Event::Start(suites))?;

    let mut suite = BytesStart::new("testsuite");
    suite.extend_attributes([
        ("name", report.suite_name.as_str()),
        ("tests", report.total_count.to_string().as_str()),
        ("failures", failures.to_string().as_str()),
        ("errors", errors.to_string().as_str()),
        ("skipped", skipped.to_string().as_str()),
    ]);
    serialize_time(&mut suite, time);
    writer.write_event(Event::Start(suite))?;

    for record in &report.records {
        serialize_case(record, &mut writer)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;
    Ok(())
}

fn serialize_case<W: Write>(record: &CaseRecord, writer: &mut Writer<W>) -> Result<(), quick_xml::Error> {
    let mut tag = BytesStart::new("testcase");
    tag.extend_attributes([
        ("name", record.case.id.as_str()),
        ("classname", record.case.backend.as_str()),
    ]);
    serialize_time(&mut tag, record.result.elapsed_ms);

    let child = match record.verdict {
        Verdict::Pass => return writer.write_event(Event::Empty(tag)),
        Verdict::AssertionFailure => "failure",
        Verdict::Crash | Verdict::Timeout => "error",
    };

    writer.write_event(Event::Start(tag))?;

    let message = record.result.first_error_line().unwrap_or("").to_string();
    let mut detail = BytesStart::new(child);
    detail.extend_attributes([
        ("type", record.verdict.label()),
        ("message", message.as_str()),
    ]);
    writer.write_event(Event::Start(detail))?;
    writer.write_event(Event::Text(BytesText::new(record.result.stderr.trim())))?;
    writer.write_event(Event::End(BytesEnd::new(child)))?;

    writer.write_event(Event::End(BytesEnd::new("testcase")))
}

fn serialize_time(tag: &mut BytesStart<'_>, elapsed_ms: u64) {
    tag.push_attribute(("time", format!("{:.3}", elapsed_ms as f64 / 1000.0).as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures;

    #[test]
    fn test_render_junit() {
        let report = fixtures::report();
        let mut out = Vec::new();
        render_junit(&report, &mut out).unwrap();
        let xml = String::from_utf8(out).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<testsuite name="settings" tests="5" failures="1" errors="2" skipped="1" time="0.480">"#));
        assert!(xml.contains(r#"<testcase name="01_wifi" classname="native_ui" time="0.120"/>"#));
        assert!(xml.contains(r#"<failure type="ASSERTION_FAILURE" message="Error: 02_bluetooth_fail failed">"#));
        assert!(xml.contains(r#"<error type="CRASH""#));
        assert!(xml.contains(r#"<error type="TIMEOUT""#));
        assert_eq!(xml.matches("<testcase ").count(), 4);
    }
}
