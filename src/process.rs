//! External tool execution with a hard time limit.
//!
//! Every strategy that shells out (LibreOffice, Ghostscript, Pandoc, cwebp)
//! goes through [`run_tool`]. The child gets a null stdin and piped
//! stdout/stderr, and is spawned with `kill_on_drop(true)` so that when
//! `tokio::time::timeout` gives up on it, dropping the future kills the
//! process instead of leaving it running. On unix the child also leads its
//! own process group, and a timeout sends `SIGKILL` to the whole group so
//! wrapper launchers (`soffice` → `oosplash` → `soffice.bin`) take their
//! descendants down with them.
//!
//! The three ways a tool can let us down map to three distinct
//! [`StrategyError`]s: [`StrategyError::Timeout`],
//! [`StrategyError::ProcessFailed`] (non-zero exit or signal), and
//! [`StrategyError::OutputNotProduced`] (checked by the caller, since only
//! it knows where the tool was told to write).

use crate::config::ProcessLimits;
use crate::error::StrategyError;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, info};

/// Maximum stderr characters kept in a diagnostic.
const STDERR_LIMIT: usize = 2000;

/// A fully resolved external command.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Short name used in diagnostics (`soffice`, `gs`, ...).
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub env_vars: Vec<(OsString, OsString)>,
}

impl ToolCommand {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env_vars: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env_vars
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }
}

/// Captured output of a tool that exited successfully.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Run `cmd`, waiting at most `limits.timeout_secs`.
pub async fn run_tool(cmd: &ToolCommand, limits: ProcessLimits) -> Result<ToolOutput, StrategyError> {
    let start = Instant::now();

    info!(
        "Executing tool: program='{}', args={:?}",
        cmd.program.display(),
        cmd.args
    );

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(ref dir) = cmd.working_dir {
        command.current_dir(dir);
    }
    for (key, value) in &cmd.env_vars {
        command.env(key, value);
    }
    #[cfg(unix)]
    command.process_group(0);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StrategyError::MissingDependency {
                dependency: cmd.name.clone(),
                hint: format!("'{}' could not be executed", cmd.program.display()),
            });
        }
        Err(e) => {
            error!("Failed to execute tool '{}': {}", cmd.name, e);
            return Err(StrategyError::Io(format!("failed to run '{}': {e}", cmd.name)));
        }
    };
    let pid = child.id();

    let timeout = Duration::from_secs(limits.timeout_secs);
    let result = tokio::time::timeout(timeout, child.wait_with_output()).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();

            if !output.status.success() {
                error!(
                    "Tool failed: program='{}', exit_code={:?}, stderr='{}'",
                    cmd.name,
                    output.status.code(),
                    stderr.chars().take(500).collect::<String>()
                );
                return Err(StrategyError::ProcessFailed {
                    program: cmd.name.clone(),
                    code: output.status.code(),
                    stderr: truncate(stderr.trim(), STDERR_LIMIT),
                });
            }

            debug!("Tool '{}' completed in {}ms", cmd.name, duration_ms);
            Ok(ToolOutput {
                stdout,
                stderr,
                duration_ms,
            })
        }
        Ok(Err(e)) => {
            error!("Failed to wait for tool '{}': {}", cmd.name, e);
            Err(StrategyError::Io(format!("failed to run '{}': {e}", cmd.name)))
        }
        Err(_) => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            error!(
                "Tool timed out after {}s: program='{}'",
                limits.timeout_secs, cmd.name
            );
            Err(StrategyError::Timeout {
                program: cmd.name.clone(),
                secs: limits.timeout_secs,
            })
        }
    }
}

/// Send `SIGKILL` to every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this
    // child by `process_group(0)`, so no unrelated process is addressed.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "killpg({pgid}) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Locate the first of `candidates` on `PATH`.
///
/// Candidates may also be absolute paths. On Windows each `PATHEXT`
/// extension is tried as well.
pub fn find_program(candidates: &[&str]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = std::env::split_paths(&path_var).collect();

    for candidate in candidates {
        let direct = Path::new(candidate);
        if direct.is_absolute() {
            if is_executable(direct) {
                return Some(direct.to_path_buf());
            }
            continue;
        }
        for dir in &dirs {
            for name in executable_names(candidate) {
                let full = dir.join(&name);
                if is_executable(&full) {
                    return Some(full);
                }
            }
        }
    }
    None
}

/// Resolve `candidates` or report which dependency is missing.
pub fn require_program(dependency: &str, candidates: &[&str]) -> Result<PathBuf, StrategyError> {
    find_program(candidates).ok_or_else(|| StrategyError::MissingDependency {
        dependency: dependency.to_string(),
        hint: format!("none of [{}] found on PATH", candidates.join(", ")),
    })
}

#[cfg(windows)]
fn executable_names(candidate: &str) -> Vec<String> {
    let exts = std::env::var("PATHEXT").unwrap_or_else(|_| ".EXE;.CMD;.BAT;.COM".into());
    let mut names = vec![candidate.to_string()];
    names.extend(
        exts.split(';')
            .filter(|e| !e.is_empty())
            .map(|e| format!("{candidate}{}", e.to_ascii_lowercase())),
    );
    names
}

#[cfg(not(windows))]
fn executable_names(candidate: &str) -> Vec<String> {
    vec![candidate.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push('\u{2026}');
        out
    } else {
        s.to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh", "/bin/sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn successful_tool_captures_stdout() {
        let out = run_tool(&sh("echo hello"), ProcessLimits::new(10))
            .await
            .expect("sh should run");
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_process_failed() {
        let err = run_tool(&sh("echo oops >&2; exit 3"), ProcessLimits::new(10))
            .await
            .unwrap_err();
        match err {
            StrategyError::ProcessFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected ProcessFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let start = Instant::now();
        let err = run_tool(&sh("sleep 5"), ProcessLimits::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Timeout { secs: 1, .. }), "got {err:?}");
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn timeout_kills_background_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = sh("(sleep 3; touch alive) & wait").current_dir(dir.path());
        let err = run_tool(&cmd, ProcessLimits::new(1)).await.unwrap_err();
        assert!(matches!(err, StrategyError::Timeout { secs: 1, .. }), "got {err:?}");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(
            !dir.path().join("alive").exists(),
            "grandchild outlived the timeout"
        );
    }

    #[tokio::test]
    async fn missing_program_is_missing_dependency() {
        let cmd = ToolCommand::new("nope", "/definitely/not/here/convkit-tool");
        let err = run_tool(&cmd, ProcessLimits::new(5)).await.unwrap_err();
        assert!(matches!(err, StrategyError::MissingDependency { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = sh("printf '%s' \"$CONVKIT_PROBE\" > probe.txt")
            .env("CONVKIT_PROBE", "42")
            .current_dir(dir.path());
        run_tool(&cmd, ProcessLimits::new(10)).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join("probe.txt")).unwrap();
        assert_eq!(written, "42");
    }

    #[test]
    fn finds_sh_and_rejects_garbage() {
        assert!(find_program(&["sh"]).is_some());
        assert!(find_program(&["convkit-no-such-binary-xyz"]).is_none());
        let err = require_program("thing", &["convkit-no-such-binary-xyz"]).unwrap_err();
        assert!(err.to_string().contains("missing dependency 'thing'"));
    }

    #[test]
    fn truncates_long_stderr() {
        let long = "x".repeat(10);
        assert_eq!(truncate(&long, 4), "xxxx\u{2026}");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
