//! Backend invocation
//!
//! Each [`BackendKind`] maps to one [`Backend`] variant wrapping a resolved
//! [`Launcher`]. Invoking a backend spawns its process for one test case,
//! races it against the timeout and the cancellation token, and returns the
//! captured outcome. A failing test is a normal [`InvocationResult`]; only
//! environment problems surface as errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uisuite_common::{strip_ansi, BackendKind, InvocationResult, SignatureScope, TestCase};

use crate::config::{HarnessConfig, LauncherOverride};
use crate::error::{HarnessResult, InfrastructureError};
use crate::session::Session;

/// How long to keep draining pipes after the process is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Exit code recorded for a timed-out invocation
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Filesystem timestamps may trail the wall clock by up to this much
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// Command templates for one backend.
///
/// `args`, `cleanup` and `collect` may use the placeholders `{target}`,
/// `{id}` and `{artifacts}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    pub program: String,
    pub args: Vec<String>,

    /// Reachability check run before the suite starts; empty to skip
    pub probe: Vec<String>,

    /// Run after a case had to be terminated
    pub cleanup: Vec<String>,

    /// Run after every case to gather artifacts (e.g. `adb pull`)
    pub collect: Vec<String>,

    pub env: BTreeMap<String, String>,
}

impl Launcher {
    /// Built-in launcher for a backend kind
    pub fn defaults(kind: BackendKind) -> Self {
        let (program, args, probe): (&str, &[&str], &[&str]) = match kind {
            BackendKind::NativeUi => ("python3", &["{target}"], &["adb", "get-state"]),
            BackendKind::Browser => (
                "npx",
                &["playwright", "test", "{target}", "--reporter=line"],
                &["npx", "playwright", "--version"],
            ),
            BackendKind::OsScript => ("osascript", &["{target}"], &["osascript", "-e", "return 0"]),
        };

        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            probe: probe.iter().map(|s| s.to_string()).collect(),
            cleanup: Vec::new(),
            collect: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Apply configured overrides on top of this launcher
    pub fn with_override(mut self, o: &LauncherOverride) -> Self {
        if let Some(program) = &o.program {
            self.program = program.clone();
        }
        if let Some(args) = &o.args {
            self.args = args.clone();
        }
        if let Some(probe) = &o.probe {
            self.probe = probe.clone();
        }
        if let Some(cleanup) = &o.cleanup {
            self.cleanup = cleanup.clone();
        }
        if let Some(collect) = &o.collect {
            self.collect = collect.clone();
        }
        self.env.extend(o.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Substitute `{target}`, `{id}` and `{artifacts}` in a command template
pub fn expand(template: &[String], case: &TestCase, artifacts: &Path) -> Vec<String> {
    let target = case.target.to_string_lossy();
    let artifacts = artifacts.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace("{target}", &target)
                .replace("{id}", &case.id)
                .replace("{artifacts}", &artifacts)
        })
        .collect()
}

/// Per-invocation settings supplied by the suite runner
#[derive(Debug, Clone)]
pub struct InvokeContext<'a> {
    pub timeout: Duration,
    pub grace: Duration,
    pub artifacts_dir: &'a Path,
    pub cancel: &'a CancellationToken,
}

/// Outcome of one invocation attempt
#[derive(Debug, Clone)]
pub enum Invocation {
    Finished(InvocationResult),

    /// Cancelled while running; the case gets no verdict
    Interrupted { elapsed_ms: u64 },
}

enum Exit {
    Status(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Automation backend, one variant per [`BackendKind`]
#[derive(Debug, Clone)]
pub enum Backend {
    /// UiAutomator harness driving an Android device over adb
    NativeUi(Launcher),
    /// Playwright driving a browser
    Browser(Launcher),
    /// AppleScript driving macOS System Settings
    OsScript(Launcher),
}

impl Backend {
    pub fn new(kind: BackendKind, launcher: Launcher) -> Self {
        match kind {
            BackendKind::NativeUi => Backend::NativeUi(launcher),
            BackendKind::Browser => Backend::Browser(launcher),
            BackendKind::OsScript => Backend::OsScript(launcher),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::NativeUi(_) => BackendKind::NativeUi,
            Backend::Browser(_) => BackendKind::Browser,
            Backend::OsScript(_) => BackendKind::OsScript,
        }
    }

    pub fn launcher(&self) -> &Launcher {
        match self {
            Backend::NativeUi(l) | Backend::Browser(l) | Backend::OsScript(l) => l,
        }
    }

    /// Environment each backend needs for clean, uncolored, unbuffered output
    fn backend_env(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Backend::NativeUi(_) => &[("PYTHONUNBUFFERED", "1")],
            Backend::Browser(_) => &[("FORCE_COLOR", "0"), ("CI", "1")],
            Backend::OsScript(_) => &[],
        }
    }

    /// Output searched for crash signatures.
    ///
    /// Playwright and `am instrument` report test errors on stdout.
    pub fn signature_scope(&self) -> SignatureScope {
        match self {
            Backend::NativeUi(_) | Backend::Browser(_) => SignatureScope::StderrThenStdout,
            Backend::OsScript(_) => SignatureScope::Stderr,
        }
    }

    /// Check that the backend is reachable
    pub async fn probe(&self, timeout: Duration) -> HarnessResult<()> {
        let launcher = self.launcher();
        let Some((program, args)) = launcher.probe.split_first() else {
            return Ok(());
        };

        debug!("Probing {} backend: {} {:?}", self.kind(), program, args);

        let status = Command::new(program)
            .args(args)
            .envs(&launcher.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let unavailable = |reason: String| InfrastructureError::BackendUnavailable {
            kind: self.kind(),
            reason,
        };

        match tokio::time::timeout(timeout, status).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(unavailable(format!("`{}` exited with {}", program, status)).into()),
            Ok(Err(e)) => Err(unavailable(format!("cannot run `{}`: {}", program, e)).into()),
            Err(_) => Err(unavailable(format!("`{}` did not answer within {:?}", program, timeout)).into()),
        }
    }

    /// Run one test case
    pub async fn invoke(&self, case: &TestCase, ctx: &InvokeContext<'_>) -> HarnessResult<Invocation> {
        let launcher = self.launcher();
        let args = expand(&launcher.args, case, ctx.artifacts_dir);

        debug!("Invoking `{}`: {} {:?}", case.id, launcher.program, args);

        let mut cmd = Command::new(&launcher.program);
        cmd.args(&args)
            .envs(&launcher.env)
            .envs(self.backend_env().iter().copied())
            .env("UISUITE_CASE_ID", &case.id)
            .env("UISUITE_ARTIFACTS_DIR", ctx.artifacts_dir)
            .env("UISUITE_TIMEOUT_SECS", ctx.timeout.as_secs().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let started_at = SystemTime::now();
        let child = cmd.spawn().map_err(|source| InfrastructureError::Spawn {
            id: case.id.clone(),
            program: launcher.program.clone(),
            source,
        })?;

        let cleanup = expand(&launcher.cleanup, case, ctx.artifacts_dir);
        let mut session = Session::new(case.id.clone(), child, cleanup, ctx.grace);
        let stdout = drain(session.take_stdout());
        let stderr = drain(session.take_stderr());

        let exit = tokio::select! {
            status = session.wait() => Exit::Status(status?),
            _ = tokio::time::sleep(ctx.timeout) => Exit::TimedOut,
            _ = ctx.cancel.cancelled() => Exit::Cancelled,
        };

        if !matches!(exit, Exit::Status(_)) {
            session.terminate().await;
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;
        session.release().await;

        let stdout = collect_output(stdout).await;
        let stderr = collect_output(stderr).await;

        let (exit_code, timed_out) = match exit {
            Exit::Status(status) => (exit_code(status), false),
            Exit::TimedOut => {
                warn!("`{}` timed out after {:?}", case.id, ctx.timeout);
                (TIMEOUT_EXIT_CODE, true)
            }
            Exit::Cancelled => {
                warn!("`{}` interrupted after {} ms", case.id, elapsed_ms);
                return Ok(Invocation::Interrupted { elapsed_ms });
            }
        };

        self.collect_artifacts(case, ctx).await;

        let result = InvocationResult {
            test_case_id: case.id.clone(),
            exit_code,
            stdout: strip_ansi(&stdout).into_owned(),
            stderr: strip_ansi(&stderr).into_owned(),
            elapsed_ms,
            timed_out,
            screenshot: find_screenshot(ctx.artifacts_dir, &case.id, started_at),
        };

        write_case_log(ctx.artifacts_dir, &result);

        Ok(Invocation::Finished(result))
    }

    /// Run the collect command; a failure only loses artifacts
    async fn collect_artifacts(&self, case: &TestCase, ctx: &InvokeContext<'_>) {
        let collect = expand(&self.launcher().collect, case, ctx.artifacts_dir);
        let Some((program, args)) = collect.split_first() else {
            return;
        };

        let status = Command::new(program)
            .args(args)
            .envs(&self.launcher().env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(ctx.timeout, status).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => warn!("Artifact collection for `{}` exited with {}", case.id, status),
            Ok(Err(e)) => warn!("Artifact collection for `{}` failed: {}", case.id, e),
            Err(_) => warn!("Artifact collection for `{}` timed out", case.id),
        }
    }
}

/// The backend for every kind, resolved from configuration
#[derive(Debug, Clone)]
pub struct Backends {
    backends: BTreeMap<BackendKind, Backend>,
}

impl Backends {
    pub fn from_config(config: &HarnessConfig) -> Self {
        let backends = BackendKind::ALL
            .into_iter()
            .map(|kind| {
                let launcher = Launcher::defaults(kind).with_override(config.backends.get(kind));
                (kind, Backend::new(kind, launcher))
            })
            .collect();
        Self { backends }
    }

    pub fn get(&self, kind: BackendKind) -> &Backend {
        // Every kind is populated at construction
        &self.backends[&kind]
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect_output(handle: JoinHandle<String>) -> String {
    let abort = handle.abort_handle();
    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            // A descendant outside the process group still holds the pipe
            abort.abort();
            warn!("Gave up draining output after {:?}", DRAIN_TIMEOUT);
            String::new()
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    TIMEOUT_EXIT_CODE
}

/// Screenshot written by this invocation: `<artifacts>/<id>.png`, or the
/// first `<id>_*.png` / `<id>-*.png` by name. Files older than `since` are
/// left over from other runs and ignored.
pub fn find_screenshot(artifacts_dir: &Path, id: &str, since: SystemTime) -> Option<PathBuf> {
    let fresh = |path: &Path| {
        path.metadata()
            .and_then(|m| m.modified())
            .map(|modified| modified + MTIME_SLACK >= since)
            .unwrap_or(false)
    };

    let exact = artifacts_dir.join(format!("{}.png", id));
    if exact.is_file() && fresh(&exact) {
        return Some(exact);
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(artifacts_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension().map(|e| e.eq_ignore_ascii_case("png")).unwrap_or(false)
                && p.file_stem()
                    .map(|stem| is_screenshot_of(&stem.to_string_lossy(), id))
                    .unwrap_or(false)
                && fresh(p)
        })
        .collect();

    candidates.sort();
    candidates.into_iter().next()
}

fn is_screenshot_of(stem: &str, id: &str) -> bool {
    stem.strip_prefix(id)
        .map(|rest| rest.starts_with('_') || rest.starts_with('-'))
        .unwrap_or(false)
}

/// Persist captured output to `<artifacts>/logs/<id>.log`
fn write_case_log(artifacts_dir: &Path, result: &InvocationResult) {
    let dir = artifacts_dir.join("logs");
    let path = dir.join(format!("{}.log", result.test_case_id));
    let content = format!(
        "--- stdout ---\n{}\n\n--- stderr ---\n{}\n",
        result.stdout, result.stderr
    );

    if let Err(e) = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, content)) {
        warn!("Failed to write log {}: {}", path.display(), e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uisuite_common::Expectation;

    fn shell_launcher() -> Launcher {
        Launcher {
            program: "sh".to_string(),
            args: vec!["{target}".to_string()],
            probe: vec!["sh".to_string(), "-c".to_string(), "exit 0".to_string()],
            cleanup: Vec::new(),
            collect: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    fn fixture(dir: &Path, name: &str, body: &str) -> TestCase {
        let path = dir.join(format!("{}.sh", name));
        std::fs::write(&path, body).unwrap();
        TestCase::new(name, BackendKind::NativeUi, path, Expectation::Pass)
    }

    fn ctx<'a>(artifacts: &'a Path, cancel: &'a CancellationToken, timeout: Duration) -> InvokeContext<'a> {
        InvokeContext {
            timeout,
            grace: Duration::from_millis(100),
            artifacts_dir: artifacts,
            cancel,
        }
    }

    #[test]
    fn test_launcher_override() {
        let o = LauncherOverride {
            program: Some("node".to_string()),
            cleanup: Some(vec!["pkill".to_string(), "chrome".to_string()]),
            env: [("DEBUG".to_string(), "pw:api".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let launcher = Launcher::defaults(BackendKind::Browser).with_override(&o);
        assert_eq!(launcher.program, "node");
        assert_eq!(launcher.args[2], "{target}");
        assert_eq!(launcher.cleanup, vec!["pkill", "chrome"]);
        assert_eq!(launcher.env["DEBUG"], "pw:api");
    }

    #[test]
    fn test_expand_placeholders() {
        let case = TestCase::new("01_wifi", BackendKind::NativeUi, "/suite/wifi.py", Expectation::Pass);
        let template = vec!["{target}".to_string(), "--out={artifacts}/{id}.png".to_string()];
        let args = expand(&template, &case, Path::new("/tmp/art"));
        assert_eq!(args, vec!["/suite/wifi.py", "--out=/tmp/art/01_wifi.png"]);
    }

    #[tokio::test]
    async fn test_invoke_captures_output() {
        let tmp = TempDir::new().unwrap();
        let case = fixture(
            tmp.path(),
            "01_capture",
            "echo \"id=$UISUITE_CASE_ID\"\necho 'AssertionError: toggle off' >&2\nexit 1\n",
        );
        let cancel = CancellationToken::new();
        let backend = Backend::new(BackendKind::NativeUi, shell_launcher());

        let invocation = backend
            .invoke(&case, &ctx(tmp.path(), &cancel, Duration::from_secs(10)))
            .await
            .unwrap();

        let Invocation::Finished(result) = invocation else {
            panic!("expected a finished invocation");
        };
        assert_eq!(result.exit_code, 1);
        assert!(!result.timed_out);
        assert_eq!(result.stdout.trim(), "id=01_capture");
        assert!(result.stderr.contains("AssertionError"));
        assert!(tmp.path().join("logs/01_capture.log").exists());
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let tmp = TempDir::new().unwrap();
        let case = fixture(tmp.path(), "slow", "sleep 30\n");
        let cancel = CancellationToken::new();
        let backend = Backend::new(BackendKind::NativeUi, shell_launcher());

        let start = Instant::now();
        let invocation = backend
            .invoke(&case, &ctx(tmp.path(), &cancel, Duration::from_millis(300)))
            .await
            .unwrap();

        let Invocation::Finished(result) = invocation else {
            panic!("expected a finished invocation");
        };
        assert!(result.timed_out);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invoke_cancelled() {
        let tmp = TempDir::new().unwrap();
        let case = fixture(tmp.path(), "cancelled", "sleep 30\n");
        let cancel = CancellationToken::new();
        let backend = Backend::new(BackendKind::NativeUi, shell_launcher());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let invocation = backend
            .invoke(&case, &ctx(tmp.path(), &cancel, Duration::from_secs(30)))
            .await
            .unwrap();
        assert!(matches!(invocation, Invocation::Interrupted { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_infrastructure_error() {
        let tmp = TempDir::new().unwrap();
        let case = fixture(tmp.path(), "nobin", "exit 0\n");
        let cancel = CancellationToken::new();
        let mut launcher = shell_launcher();
        launcher.program = "uisuite-definitely-missing-binary".to_string();
        let backend = Backend::new(BackendKind::OsScript, launcher);

        let err = backend
            .invoke(&case, &ctx(tmp.path(), &cancel, Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_probe() {
        let ok = Backend::new(BackendKind::Browser, shell_launcher());
        ok.probe(Duration::from_secs(5)).await.unwrap();

        let mut launcher = shell_launcher();
        launcher.probe = vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()];
        let down = Backend::new(BackendKind::Browser, launcher);
        let err = down.probe(Duration::from_secs(5)).await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    fn age(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_find_screenshot() {
        let tmp = TempDir::new().unwrap();
        let since = SystemTime::now();
        assert_eq!(find_screenshot(tmp.path(), "wifi", since), None);

        std::fs::write(tmp.path().join("wifi_after_toggle.png"), b"png").unwrap();
        std::fs::write(tmp.path().join("wifi-before.PNG"), b"png").unwrap();
        std::fs::write(tmp.path().join("wifihotspot.png"), b"png").unwrap();
        std::fs::write(tmp.path().join("bluetooth.png"), b"png").unwrap();
        assert_eq!(
            find_screenshot(tmp.path(), "wifi", since),
            Some(tmp.path().join("wifi-before.PNG"))
        );

        std::fs::write(tmp.path().join("wifi.png"), b"png").unwrap();
        assert_eq!(find_screenshot(tmp.path(), "wifi", since), Some(tmp.path().join("wifi.png")));
    }

    #[test]
    fn test_find_screenshot_ignores_stale_files() {
        let tmp = TempDir::new().unwrap();
        let stale = tmp.path().join("wifi_extra.png");
        std::fs::write(&stale, b"png").unwrap();
        age(&stale, Duration::from_secs(3600));
        let exact = tmp.path().join("wifi.png");
        std::fs::write(&exact, b"png").unwrap();
        age(&exact, Duration::from_secs(3600));

        assert_eq!(find_screenshot(tmp.path(), "wifi", SystemTime::now()), None);
    }

    #[tokio::test]
    async fn test_invoke_skips_screenshot_left_by_earlier_run() {
        let tmp = TempDir::new().unwrap();
        let case = fixture(tmp.path(), "wifi", "exit 0\n");
        let stale = tmp.path().join("wifi_extra.png");
        std::fs::write(&stale, b"png").unwrap();
        age(&stale, Duration::from_secs(3600));

        let cancel = CancellationToken::new();
        let backend = Backend::new(BackendKind::NativeUi, shell_launcher());
        let Invocation::Finished(result) = backend
            .invoke(&case, &ctx(tmp.path(), &cancel, Duration::from_secs(10)))
            .await
            .unwrap()
        else {
            panic!("expected a finished invocation");
        };
        assert_eq!(result.screenshot, None);
    }

    #[tokio::test]
    async fn test_elapsed_excludes_cleanup() {
        let tmp = TempDir::new().unwrap();
        let case = fixture(tmp.path(), "quick", "exit 0\n");
        let mut launcher = shell_launcher();
        launcher.cleanup = vec!["sleep".to_string(), "2".to_string()];

        let cancel = CancellationToken::new();
        let backend = Backend::new(BackendKind::NativeUi, launcher);
        let start = Instant::now();
        let Invocation::Finished(result) = backend
            .invoke(&case, &ctx(tmp.path(), &cancel, Duration::from_secs(10)))
            .await
            .unwrap()
        else {
            panic!("expected a finished invocation");
        };

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(result.elapsed_ms < 1500, "elapsed_ms = {}", result.elapsed_ms);
    }

    #[test]
    fn test_signature_scope_per_backend() {
        let launcher = shell_launcher();
        assert_eq!(
            Backend::new(BackendKind::Browser, launcher.clone()).signature_scope(),
            SignatureScope::StderrThenStdout
        );
        assert_eq!(
            Backend::new(BackendKind::NativeUi, launcher.clone()).signature_scope(),
            SignatureScope::StderrThenStdout
        );
        assert_eq!(
            Backend::new(BackendKind::OsScript, launcher).signature_scope(),
            SignatureScope::Stderr
        );
    }
}
