//! uisuite Runner
//!
//! Runs a suite of UI-automation test cases one after another and reports
//! what happened:
//! - Loads the suite from a YAML manifest or a fixture directory scan
//! - Invokes each case through its backend in its own process group
//! - Classifies the outcome into a verdict
//! - Streams records to report sinks as they complete
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SuiteRunner                                                 │
//! │    ├── preflight(suite)            probe each needed backend │
//! │    └── run(suite, sink, cancel) -> SuiteReport               │
//! │          for case in manifest order:                         │
//! │            Backend::invoke(case) -> InvocationResult         │
//! │              └── Session: process group, timeout, cleanup    │
//! │            classify(result) -> Verdict                       │
//! │            sink.record(record)                               │
//! │          sink.finish(report)                                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Backends                                                    │
//! │    ├── NativeUi   python3 <harness>      (UiAutomator, adb)  │
//! │    ├── Browser    npx playwright test    (Playwright)        │
//! │    └── OsScript   osascript <script>     (AppleScript)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Report sinks                                                │
//! │    ├── ConsoleSummary   terminal lines + tally               │
//! │    ├── TableReport      .tsv, one row flushed per case       │
//! │    ├── JsonReport       .json job report                     │
//! │    └── JunitReport      .xml                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod environment;
pub mod error;
pub mod manifest;
pub mod report;
pub mod runner;
pub mod session;

pub use backend::{Backend, Backends, Invocation, InvokeContext, Launcher};
pub use config::{HarnessConfig, LauncherOverride, RunSettings, CONFIG_FILE_NAME};
pub use environment::EnvironmentSnapshot;
pub use error::{HarnessError, HarnessResult, InfrastructureError, ManifestError};
pub use manifest::Suite;
pub use report::{file_sink, ConsoleSummary, MultiSink, ReportFormat, ReportSink};
pub use runner::{RunState, SuiteRunner};
