//! Run an external listing tool and capture its output, with a deadline.

use std::io::{ErrorKind, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use super::error::SourceUnavailable;
use super::host::CancelToken;

/// How often a waiting call looks at the cancel flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `program` and return its stdout. The child is killed once `timeout`
/// elapses or `cancel` fires, whichever comes first.
pub fn run_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<String, SourceUnavailable> {
    if cancel.is_cancelled() {
        return Err(SourceUnavailable::Cancelled);
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    hide_console_window(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => SourceUnavailable::ToolMissing(program.to_string()),
        _ => SourceUnavailable::from_io(program, &e),
    })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SourceUnavailable::Io(format!("{}: stdout not captured", program)))?;

    // Read on a helper thread so a hung tool can't block past the deadline
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = stdout.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });

    let deadline = Instant::now() + timeout;
    let buf = loop {
        if cancel.is_cancelled() {
            return Err(stop(&mut child, program, SourceUnavailable::Cancelled));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(&mut child, program, timeout));
        }
        match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(Ok(buf)) => break buf,
            Ok(Err(e)) => {
                let reason = SourceUnavailable::from_io(program, &e);
                return Err(stop(&mut child, program, reason));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                let reason = SourceUnavailable::Io(format!("{}: output reader vanished", program));
                return Err(stop(&mut child, program, reason));
            }
        }
    };

    // stdout can close before the process exits
    let status = wait_until(&mut child, program, deadline, timeout, cancel)?;
    if !status.success() {
        return Err(SourceUnavailable::ToolFailed {
            tool: program.to_string(),
            status: status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn wait_until(
    child: &mut Child,
    program: &str,
    deadline: Instant,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ExitStatus, SourceUnavailable> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                let reason = SourceUnavailable::from_io(program, &e);
                return Err(stop(child, program, reason));
            }
        }
        if cancel.is_cancelled() {
            return Err(stop(child, program, SourceUnavailable::Cancelled));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(child, program, timeout));
        }
        thread::sleep(remaining.min(POLL_INTERVAL));
    }
}

fn timed_out(child: &mut Child, program: &str, timeout: Duration) -> SourceUnavailable {
    log::warn!("{} did not finish within {:?}, killing it", program, timeout);
    let reason = SourceUnavailable::TimedOut {
        tool: program.to_string(),
        after: timeout,
    };
    stop(child, program, reason)
}

/// Kill and reap the child, handing back `reason`
fn stop(child: &mut Child, program: &str, reason: SourceUnavailable) -> SourceUnavailable {
    log::debug!("Stopping {}: {}", program, reason);
    let _ = child.kill();
    let _ = child.wait();
    reason
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}
