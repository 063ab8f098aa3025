//! uisuite Common Library
//!
//! Data model shared by the runner and the CLI: test case descriptors,
//! invocation results, verdicts and the suite report, plus the pure
//! classifier that turns an invocation into a verdict.

pub mod classify;
pub mod types;

// Re-export commonly used types
pub use classify::{classify, matches_expectation, strip_ansi, CrashSignatures, SignatureScope};
pub use types::*;

/// uisuite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
