// ============================================================================
// splicer-core/src/external/command.rs
// ============================================================================
//
// COMMAND EXECUTION: Running External Processes Under Control
//
// `run_command` is a plain blocking run used for short probes.
// `run_controlled` is used for long encodes: it polls the child, kills it
// when the attempt timeout elapses or the shared cancellation token fires,
// and reports those as typed errors instead of exit codes. On unix the child
// leads its own process group, so a kill also reaches the ffmpeg and encoder
// processes it started.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::error::{
    CoreError, CoreResult, command_failed_error, command_start_error, command_wait_error,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Shared flag used to stop in-flight work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits applied to one controlled process run.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl ProcessControl {
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

fn log_command(cmd: &Command) {
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    debug!("Running: {} {}", program_name(cmd), args.join(" "));
}

/// Execute a simple command and return the output
pub fn run_command(cmd: &mut Command) -> CoreResult<Output> {
    log_command(cmd);
    let name = program_name(cmd);

    let output = cmd.output().map_err(|e| command_start_error(&name, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("{name} failed with {}: {}", output.status, stderr.trim());
        return Err(command_failed_error(name, output.status, stderr.trim()));
    }

    Ok(output)
}

/// Runs `cmd` to completion unless `control` stops it first.
///
/// Returns `CoreError::Timeout` or `CoreError::Cancelled` after killing the
/// child, and `CoreError::CommandFailed` with the tail of stderr on a
/// non-zero exit.
pub fn run_controlled(cmd: &mut Command, control: &ProcessControl) -> CoreResult<Output> {
    log_command(cmd);
    let name = program_name(cmd);

    if control.cancel.is_cancelled() {
        return Err(CoreError::Cancelled(name));
    }

    own_process_group(cmd);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| command_start_error(&name, e))?;

    let stdout = child.stdout.take().map(|out| spawn_reader(out, false));
    let stderr = child.stderr.take().map(|err| spawn_reader(err, true));

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().map_err(|e| command_wait_error(&name, e))? {
            break status;
        }
        if control.cancel.is_cancelled() {
            warn!("Cancelling {name}");
            kill(&mut child, &name);
            return Err(CoreError::Cancelled(name));
        }
        if let Some(timeout) = control.timeout {
            if started.elapsed() >= timeout {
                warn!("{name} exceeded its {timeout:?} timeout, killing it");
                kill(&mut child, &name);
                return Err(CoreError::Timeout {
                    command: name,
                    after: timeout,
                });
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout_lines = join_reader(stdout);
    let stderr_lines = join_reader(stderr);
    finish(name, status, stdout_lines, stderr_lines)
}

fn finish(
    name: String,
    status: ExitStatus,
    stdout: Vec<String>,
    stderr: Vec<String>,
) -> CoreResult<Output> {
    if !status.success() {
        let tail = stderr[stderr.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        error!("{name} failed with {status}");
        return Err(command_failed_error(name, status, tail));
    }
    Ok(Output {
        status,
        stdout: stdout.join("\n").into_bytes(),
        stderr: stderr.join("\n").into_bytes(),
    })
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

// Readers are detached on kill and finish once the group's pipes close.
fn kill(child: &mut Child, name: &str) {
    if let Err(e) = kill_process_tree(child) {
        warn!("Failed to kill {name}: {e}");
    }
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(errno) => {
            debug!("killpg failed ({errno}), killing the child only");
            child.kill()
        }
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

fn spawn_reader<R: Read + Send + 'static>(source: R, is_stderr: bool) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut lines = Vec::new();
        for line in BufReader::new(source).lines().map_while(Result::ok) {
            if is_stderr {
                debug!("STDERR: {line}");
            }
            lines.push(line);
        }
        lines
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_echo() {
        let mut cmd = Command::new("echo");
        cmd.arg("test");
        let output = run_command(&mut cmd).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "test");
    }

    #[test]
    fn test_run_controlled_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello"]);
        let output = run_controlled(&mut cmd, &ProcessControl::default()).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello");
    }

    #[test]
    fn test_run_controlled_reports_exit_failure() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo broken >&2; exit 3"]);
        let err = run_controlled(&mut cmd, &ProcessControl::default()).unwrap_err();
        match err {
            CoreError::CommandFailed(_, status, stderr) => {
                assert_eq!(status.code(), Some(3));
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_controlled_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let control = ProcessControl::new(Some(Duration::from_millis(200)), CancellationToken::new());
        let started = Instant::now();
        let err = run_controlled(&mut cmd, &control).unwrap_err();
        assert!(matches!(err, CoreError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_also_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("grandchild-finished");
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("(sleep 1; touch '{}') & wait", marker.display()));
        let control = ProcessControl::new(Some(Duration::from_millis(300)), CancellationToken::new());

        let err = run_controlled(&mut cmd, &control).unwrap_err();
        assert!(matches!(err, CoreError::Timeout { .. }));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "background process outlived the timeout");
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_precision() {
        let err = CoreError::Timeout {
            command: "ab-av1".to_string(),
            after: Duration::from_millis(300),
        };
        assert_eq!(err.to_string(), "ab-av1 timed out after 300ms");
    }

    #[test]
    fn test_run_controlled_honours_cancellation() {
        let token = CancellationToken::new();
        let control = ProcessControl::new(None, token.clone());
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            token.cancel();
        });

        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_controlled(&mut cmd, &control).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, CoreError::Cancelled(_)));
    }

    #[test]
    fn test_already_cancelled_does_not_spawn() {
        let control = ProcessControl::default();
        control.cancel.cancel();
        let mut cmd = Command::new("this-binary-does-not-exist");
        assert!(matches!(
            run_controlled(&mut cmd, &control),
            Err(CoreError::Cancelled(_))
        ));
    }
}
