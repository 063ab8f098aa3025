//! Suite loading from a YAML manifest or a fixture directory

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uisuite_common::{BackendKind, Expectation, TestCase};

use crate::error::{HarnessResult, ManifestError};

/// Manifest file names looked up in the suite directory
pub const MANIFEST_NAMES: [&str; 2] = ["suite.yaml", "suite.yml"];

/// On-disk manifest layout
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    name: Option<String>,
    cases: Vec<TestCase>,
}

/// A loaded, validated suite in manifest order
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,

    /// Directory that relative targets were resolved against
    pub root: PathBuf,

    /// Cases sorted lexicographically by id
    pub cases: Vec<TestCase>,
}

impl Suite {
    /// Load a suite from `dir`: an explicit manifest wins, then `suite.yaml`
    /// in the directory, then a fixture scan.
    pub fn load(dir: &Path, manifest: Option<&Path>) -> HarnessResult<Self> {
        if let Some(path) = manifest {
            return Self::from_manifest(path);
        }

        if !dir.is_dir() {
            return Err(ManifestError::MissingDirectory(dir.to_path_buf()).into());
        }

        match MANIFEST_NAMES.iter().map(|n| dir.join(n)).find(|p| p.is_file()) {
            Some(path) => Self::from_manifest(&path),
            None => Self::scan(dir),
        }
    }

    /// Parse a suite from a YAML manifest file
    pub fn from_manifest(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self::from_yaml(&content, path, &root)
    }

    /// Parse a suite from YAML, resolving targets against `root`
    pub fn from_yaml(yaml: &str, origin: &Path, root: &Path) -> HarnessResult<Self> {
        let manifest: ManifestFile = serde_yaml::from_str(yaml).map_err(|e| ManifestError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        let name = manifest.name.unwrap_or_else(|| dir_name(root));
        let cases = manifest
            .cases
            .into_iter()
            .map(|mut case| {
                if case.target.is_relative() {
                    case.target = root.join(&case.target);
                }
                case
            })
            .collect();

        let suite = Self::finalize(name, root.to_path_buf(), cases)?;
        info!("Loaded {} case(s) from manifest {}", suite.len(), origin.display());
        Ok(suite)
    }

    /// Discover fixtures under `dir` by file name
    pub fn scan(dir: &Path) -> HarnessResult<Self> {
        if !dir.is_dir() {
            return Err(ManifestError::MissingDirectory(dir.to_path_buf()).into());
        }

        let mut cases = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let file_name = entry.file_name().to_string_lossy();
            if let Some((id, backend)) = classify_fixture(&file_name) {
                debug!("Discovered {} fixture {}", backend, entry.path().display());
                let expect = infer_expectation(&id);
                cases.push(TestCase::new(id, backend, entry.path(), expect));
            }
        }

        let suite = Self::finalize(dir_name(dir), dir.to_path_buf(), cases)?;
        info!("Discovered {} case(s) in {}", suite.len(), dir.display());
        Ok(suite)
    }

    fn finalize(name: String, root: PathBuf, mut cases: Vec<TestCase>) -> Result<Self, ManifestError> {
        if cases.is_empty() {
            return Err(ManifestError::Empty(root));
        }

        if let Some(case) = cases.iter().find(|c| c.id.trim().is_empty()) {
            return Err(ManifestError::EmptyId(case.target.clone()));
        }

        cases.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(pair) = cases.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(ManifestError::DuplicateId(pair[0].id.clone()));
        }

        if let Some(case) = cases.iter().find(|c| !c.target.exists()) {
            return Err(ManifestError::MissingTarget {
                id: case.id.clone(),
                target: case.target.clone(),
            });
        }

        Ok(Self { name, root, cases })
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Backends the suite needs
    pub fn backend_kinds(&self) -> BTreeSet<BackendKind> {
        self.cases.iter().map(|c| c.backend).collect()
    }
}

/// Map a fixture file name to its case id and backend.
///
/// `*.spec.ts`, `*.spec.js` and `*.test.ts` are browser cases,
/// `*.applescript` and `*.scpt` are OS scripts, `*.py` and `*.sh` are native
/// UI harnesses. Python helper modules (`__init__.py`, `conftest.py`) are
/// not cases.
pub fn classify_fixture(file_name: &str) -> Option<(String, BackendKind)> {
    const HELPERS: &[&str] = &["conftest.py", "setup.py"];

    if HELPERS.contains(&file_name) || (file_name.starts_with("__") && file_name.ends_with("__.py")) {
        return None;
    }

    const SUFFIXES: &[(&str, BackendKind)] = &[
        (".spec.ts", BackendKind::Browser),
        (".spec.js", BackendKind::Browser),
        (".test.ts", BackendKind::Browser),
        (".applescript", BackendKind::OsScript),
        (".scpt", BackendKind::OsScript),
        (".py", BackendKind::NativeUi),
        (".sh", BackendKind::NativeUi),
    ];

    SUFFIXES.iter().find_map(|(suffix, kind)| {
        file_name
            .strip_suffix(suffix)
            .filter(|id| !id.is_empty())
            .map(|id| (id.to_string(), *kind))
    })
}

/// Cases named with a `fail` or `crash` token are expected to fail
fn infer_expectation(id: &str) -> Expectation {
    let expects_failure = id
        .split(|c: char| c == '_' || c == '-' || c == '.')
        .any(|token| token.eq_ignore_ascii_case("fail") || token.eq_ignore_ascii_case("crash"));

    if expects_failure {
        Expectation::Fail
    } else {
        Expectation::Pass
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn dir_name(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(dir)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "suite".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use tempfile::TempDir;
    use test_case::test_case;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "").unwrap();
    }

    #[test_case("chrome-settings.spec.ts", Some(("chrome-settings", BackendKind::Browser)))]
    #[test_case("03_dark_mode.applescript", Some(("03_dark_mode", BackendKind::OsScript)))]
    #[test_case("wifi.py", Some(("wifi", BackendKind::NativeUi)))]
    #[test_case("notes.md", None)]
    #[test_case(".py", None)]
    #[test_case("__init__.py", None)]
    #[test_case("__main__.py", None)]
    #[test_case("conftest.py", None)]
    #[test_case("__wifi.py", Some(("__wifi", BackendKind::NativeUi)))]
    fn test_classify_fixture(name: &str, expected: Option<(&str, BackendKind)>) {
        let got = classify_fixture(name);
        assert_eq!(got.as_ref().map(|(id, k)| (id.as_str(), *k)), expected);
    }

    #[test_case("02_toggle_fail", Expectation::Fail)]
    #[test_case("crash-on-open", Expectation::Fail)]
    #[test_case("failover_settings", Expectation::Pass)]
    #[test_case("01_open_wifi", Expectation::Pass)]
    fn test_infer_expectation(id: &str, expected: Expectation) {
        assert_eq!(infer_expectation(id), expected);
    }

    #[test]
    fn test_manifest_sorted_and_resolved() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "android/wifi.py");
        touch(tmp.path(), "web/chrome.spec.ts");

        let yaml = r#"
name: settings-smoke
cases:
  - id: 02_chrome
    backend: browser_automation
    target: web/chrome.spec.ts
    expect: fail
  - id: 01_wifi
    backend: native_ui
    target: android/wifi.py
"#;
        let manifest = tmp.path().join("suite.yaml");
        std::fs::write(&manifest, yaml).unwrap();

        let suite = Suite::load(tmp.path(), None).unwrap();
        assert_eq!(suite.name, "settings-smoke");
        let ids: Vec<&str> = suite.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["01_wifi", "02_chrome"]);
        assert_eq!(suite.cases[0].target, tmp.path().join("android/wifi.py"));
        assert_eq!(suite.cases[0].expect, Expectation::Pass);
        assert_eq!(suite.cases[1].expect, Expectation::Fail);
        assert_eq!(suite.backend_kinds().len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.py");
        let yaml = r#"
cases:
  - { id: same, backend: native_ui, target: a.py }
  - { id: same, backend: os_script, target: a.py }
"#;
        let err = Suite::from_yaml(yaml, Path::new("suite.yaml"), tmp.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Manifest(ManifestError::DuplicateId(id)) if id == "same"));
    }

    #[test]
    fn test_missing_target_rejected() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.py");
        let yaml = r#"
cases:
  - { id: a, backend: native_ui, target: a.py }
  - { id: c, backend: browser, target: missing.spec.ts }
"#;
        let err = Suite::from_yaml(yaml, Path::new("suite.yaml"), tmp.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Manifest(ManifestError::MissingTarget { id, .. }) if id == "c"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.py");
        let yaml = "cases:\n  - { id: '  ', backend: native_ui, target: a.py }\n";
        let err = Suite::from_yaml(yaml, Path::new("suite.yaml"), tmp.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Manifest(ManifestError::EmptyId(_))));
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let yaml = "cases:\n  - { id: a, backend: selenium, target: a.py }\n";
        let err = Suite::from_yaml(yaml, Path::new("suite.yaml"), tmp.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Manifest(ManifestError::Parse { .. })));
    }

    #[test]
    fn test_scan_directory() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "web_scripts/chrome-settings.spec.ts");
        touch(tmp.path(), "android_scripts/02_bluetooth_fail.py");
        touch(tmp.path(), "macos/01_display.applescript");
        touch(tmp.path(), "macos/README.md");
        touch(tmp.path(), ".cache/ignored.py");

        let suite = Suite::load(tmp.path(), None).unwrap();
        let ids: Vec<&str> = suite.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["01_display", "02_bluetooth_fail", "chrome-settings"]);
        assert_eq!(suite.cases[1].expect, Expectation::Fail);
        assert_eq!(suite.cases[2].backend, BackendKind::Browser);
    }

    #[test]
    fn test_scan_empty_and_missing() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "notes.txt");
        assert!(matches!(
            Suite::load(tmp.path(), None),
            Err(HarnessError::Manifest(ManifestError::Empty(_)))
        ));
        assert!(matches!(
            Suite::load(&tmp.path().join("absent"), None),
            Err(HarnessError::Manifest(ManifestError::MissingDirectory(_)))
        ));
    }
}
