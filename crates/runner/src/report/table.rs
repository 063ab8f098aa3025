//! Tab-separated result table
//!
//! The header is written when the suite begins and each row is appended and
//! flushed as soon as its case is recorded, so an interrupted or killed run
//! still leaves every completed row on disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use uisuite_common::{CaseRecord, SuiteReport};

use super::ReportSink;
use crate::manifest::Suite;

pub const HEADER: [&str; 6] = ["id", "backend", "expect", "verdict", "elapsed_ms", "screenshot"];

pub struct TableReport {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    failed: bool,
}

impl TableReport {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: None,
            failed: false,
        }
    }

    fn open(&mut self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        writeln!(writer, "{}", HEADER.join("\t"))?;
        writer.flush()?;
        self.writer = Some(writer);
        Ok(())
    }

    fn append(&mut self, record: &CaseRecord) -> std::io::Result<()> {
        if self.writer.is_none() {
            self.open()?;
        }
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", row(record).join("\t"))?;
            writer.flush()?;
        }
        Ok(())
    }

    fn report_error(&mut self, e: std::io::Error) {
        // One warning per report is enough
        if !self.failed {
            warn!("Failed to write report {}: {}", self.path.display(), e);
            self.failed = true;
        }
    }
}

/// Table cells for one record; tabs and newlines in values are flattened
pub fn row(record: &CaseRecord) -> Vec<String> {
    let screenshot = record
        .result
        .screenshot
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "-".to_string());

    vec![
        record.case.id.clone(),
        record.case.backend.as_str().to_string(),
        record.case.expect.as_str().to_string(),
        record.verdict.label().to_string(),
        record.result.elapsed_ms.to_string(),
        screenshot,
    ]
    .into_iter()
    .map(|cell| cell.replace(['\t', '\n', '\r'], " "))
    .collect()
}

impl ReportSink for TableReport {
    fn begin(&mut self, _suite: &Suite) {
        if let Err(e) = self.open() {
            self.report_error(e);
        }
    }

    fn record(&mut self, record: &CaseRecord) {
        if let Err(e) = self.append(record) {
            self.report_error(e);
        }
    }

    fn finish(&mut self, _report: &SuiteReport) {
        if self.writer.is_none() && !self.failed {
            // Nothing ran; still leave a header-only table behind
            if let Err(e) = self.open() {
                self.report_error(e);
            }
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                self.report_error(e);
            }
        }
        if !self.failed {
            info!("Results written to: {}", self.path.display());
        }
    }
}
