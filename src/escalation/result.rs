//! Recovering the inner command's real outcome. The elevation mechanisms
//! don't reliably pass exit codes or streams through, so the elevated side
//! reports them out of band.

use tracing::{debug, info};

use super::Output;
use crate::{error::Error, host::ExecOutput};

/// Polkit's message when nothing is around to show a password dialog. The
/// only stderr text ever inspected; everything else is localized.
const NO_AGENT_MARKER: &str = "No authentication agent found";

/// Interprets the captured output of a mechanism whose own stdout is the
/// channel. `token` was printed by the elevated shell before the command, so
/// its presence proves elevation succeeded regardless of the exit code.
pub fn from_inline(token: &str, command: &str, out: ExecOutput) -> Result<Output, Error> {
    let marker = format!("{token}\n");
    let ExecOutput {
        code,
        stdout,
        stderr,
    } = out;

    let (elevated, stdout) = match stdout.strip_prefix(&marker) {
        Some(rest) => (true, rest.to_owned()),
        None => (false, stdout),
    };
    debug!(elevated, ?code, "Mechanism exited");

    if code == Some(0) {
        return Ok(Output { stdout, stderr });
    }
    if !elevated {
        if stderr.contains(NO_AGENT_MARKER) {
            return Err(Error::NoPolkitAgent);
        }
        return Err(Error::PermissionDenied {
            cause: Some(describe_failure(code, &stderr)),
        });
    }

    info!(?code, "Command ran elevated and failed");
    Err(Error::CommandFailed {
        command: command.to_owned(),
        // Killed by a signal.
        code: code.unwrap_or(-1),
        stdout,
        stderr,
    })
}

/// Interprets the status, stdout and stderr files written by the elevated
/// side. `status` holds the exit code followed by a line terminator.
pub fn from_triad(
    command: &str,
    status: &str,
    stdout: String,
    stderr: String,
) -> Result<Output, Error> {
    let code: i32 = status
        .trim()
        .parse()
        .map_err(|_| Error::MalformedStatus(status.to_owned()))?;
    debug!(code, "Read exit status");

    if code == 0 {
        Ok(Output { stdout, stderr })
    } else {
        Err(Error::CommandFailed {
            command: command.to_owned(),
            code,
            stdout,
            stderr,
        })
    }
}

pub(crate) fn describe_failure(code: Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    match code {
        Some(c) if stderr.is_empty() => format!("exited with code {c}"),
        Some(c) => format!("exited with code {c}: {stderr}"),
        None => format!("killed by signal: {stderr}"),
    }
}
