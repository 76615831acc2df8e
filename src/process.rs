//! Child process execution with a wall-clock timeout.
//!
//! A timeout is not an error at this layer. Agents under test commonly print
//! a startup banner and then block waiting for protocol input, which is
//! correct behavior; the classifier one level up decides what an outcome
//! means. Termination on timeout is two-phase — graceful signal, bounded
//! grace wait, then force kill — because many agents intentionally outlive
//! the verification window.

use crate::resolve::LaunchPlan;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a terminated process gets to exit before being killed.
pub const KILL_GRACE: Duration = Duration::from_secs(2);
const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed while waiting for {command}: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// How the child ended, from the verifier's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Exited(i32),
    Signaled,
    /// Still alive when the timeout expired; terminated by us.
    TimedOut,
}

/// Captured outcome of one launch attempt. Never mutated after construction.
#[derive(Debug)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn the plan's command with empty stdin and captured output, waiting up
/// to `timeout` for natural termination.
pub fn run(plan: &LaunchPlan, timeout: Duration) -> Result<ProcessResult, SpawnError> {
    let command_label = plan.command.display().to_string();
    let mut child = Command::new(&plan.command)
        .args(&plan.args)
        .current_dir(&plan.cwd)
        .envs(&plan.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SpawnError::Launch {
            command: command_label.clone(),
            source,
        })?;

    let stdout_handle = drain_pipe(child.stdout.take());
    let stderr_handle = drain_pipe(child.stderr.take());

    let status = wait_with_timeout(&mut child, timeout).map_err(|source| SpawnError::Wait {
        command: command_label,
        source,
    })?;

    let stdout = join_pipe(stdout_handle);
    let stderr = join_pipe(stderr_handle);

    Ok(ProcessResult {
        status,
        stdout,
        stderr,
    })
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<ProcessStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(exit_disposition(&status));
        }
        if Instant::now() >= deadline {
            terminate(child);
            return Ok(ProcessStatus::TimedOut);
        }
        thread::sleep(WAIT_POLL);
    }
}

fn exit_disposition(status: &std::process::ExitStatus) -> ProcessStatus {
    match status.code() {
        Some(code) => ProcessStatus::Exited(code),
        None => ProcessStatus::Signaled,
    }
}

/// Two-phase termination: graceful signal, bounded grace wait, force kill.
pub fn terminate(child: &mut Child) {
    send_term(child);
    let deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        thread::sleep(WAIT_POLL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn send_term(child: &Child) {
    let pid = child.id() as libc::pid_t;
    // Safety: signalling a pid we own; worst case the process already exited
    // and the signal lands on nothing.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_term(child: &Child) {
    let _ = child;
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_pipe(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Ensure a command file carries the executable bit before spawning it.
///
/// Freshly extracted archives do not always preserve modes; this mirrors the
/// pre-launch fixup the resolver applies, for callers that spawn directly.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut permissions = metadata.permissions();
        if permissions.mode() & 0o111 == 0 {
            permissions.set_mode(permissions.mode() | 0o755);
            let _ = std::fs::set_permissions(path, permissions);
        }
    }
}

#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn sh_plan(script: &str) -> LaunchPlan {
        LaunchPlan {
            command: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn clean_exit_is_reported_with_captured_output() {
        let result = run(&sh_plan("echo out; echo err >&2"), Duration::from_secs(5))
            .expect("run sh");
        assert_eq!(result.status, ProcessStatus::Exited(0));
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[test]
    fn nonzero_exit_codes_pass_through() {
        let result = run(&sh_plan("exit 3"), Duration::from_secs(5)).expect("run sh");
        assert_eq!(result.status, ProcessStatus::Exited(3));
    }

    #[test]
    fn long_running_processes_time_out_and_are_terminated() {
        let start = Instant::now();
        let result = run(
            &sh_plan("echo started; sleep 30"),
            Duration::from_millis(300),
        )
        .expect("run sh");
        assert_eq!(result.status, ProcessStatus::TimedOut);
        assert_eq!(result.stdout, "started\n");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_executables_are_spawn_errors() {
        let plan = LaunchPlan {
            command: PathBuf::from("/nonexistent/agent-binary"),
            args: Vec::new(),
            cwd: std::env::temp_dir(),
            env: BTreeMap::new(),
        };
        let err = run(&plan, Duration::from_secs(1)).expect_err("spawn must fail");
        assert!(matches!(err, SpawnError::Launch { .. }));
    }

    #[test]
    fn env_overlay_merges_over_inherited_environment() {
        // PATH is inherited (sh resolves), the overlay var is added on top.
        let mut plan = sh_plan("printf '%s' \"$VERIFIER_MARKER\"");
        plan.env
            .insert("VERIFIER_MARKER".to_string(), "overlay-wins".to_string());
        let result = run(&plan, Duration::from_secs(5)).expect("run sh");
        assert_eq!(result.stdout, "overlay-wins");
    }
}
