use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use bytesize::ByteSize;
use rand::{rngs::OsRng, RngCore};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};
use tracing::{debug, trace, warn};

use super::{ExecOutput, ExecRequest, FileStat, Host, Invocation};
use crate::error::Error;

/// [`Host`] backed by the real operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl SystemHost {
    fn command(invocation: &Invocation) -> Command {
        match invocation {
            #[cfg(windows)]
            Invocation::Shell(line) => {
                let mut cmd = Command::new("cmd.exe");
                cmd.args(["/d", "/s", "/c"]).raw_arg(format!("\"{line}\""));
                cmd
            }
            #[cfg(not(windows))]
            Invocation::Shell(line) => {
                let mut cmd = Command::new("/bin/sh");
                cmd.arg("-c").arg(line);
                cmd
            }
            Invocation::Program { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        }
    }
}

#[async_trait::async_trait]
impl Host for SystemHost {
    #[tracing::instrument(skip_all, fields(program = %request.program_name()))]
    async fn exec(&self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        let mut cmd = Self::command(&request.invocation);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!(%request, "Spawning");
        let mut child = cmd.spawn()?;
        let limit = request.max_output.map_or(u64::MAX, |l| l.as_u64());

        let streams = tokio::try_join!(
            read_capped(child.stdout.take(), limit),
            read_capped(child.stderr.take(), limit),
        );
        let (stdout, stderr) = match streams {
            Ok(s) => s,
            Err(e) => {
                warn!(?e, "Abandoning child process");
                let _ = child.kill().await;
                return Err(e);
            }
        };
        let status = child.wait().await?;
        debug!(?status, "Child exited");

        Ok(ExecOutput {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            len: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn user(&self) -> Option<String> {
        std::env::var("USER").ok().filter(|u| !u.is_empty())
    }

    fn fill_random(&self, buf: &mut [u8]) -> io::Result<()> {
        OsRng.try_fill_bytes(buf).map_err(io::Error::other)
    }
}

async fn read_capped(stream: Option<impl AsyncRead + Unpin>, limit: u64) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let Some(stream) = stream else {
        return Ok(buf);
    };
    stream.take(limit.saturating_add(1)).read_to_end(&mut buf).await?;
    if buf.len() as u64 > limit {
        return Err(Error::OutputLimitExceeded {
            limit: ByteSize(limit),
        });
    }
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn captures_streams_and_code() {
        let out = SystemHost
            .exec(&ExecRequest::shell("echo out; echo err >&2; exit 4"))
            .await
            .unwrap();
        assert_eq!(out.code, Some(4));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn program_runs_in_cwd() {
        let out = SystemHost
            .exec(&ExecRequest::program("pwd").cwd("/"))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "/");
    }

    #[tokio::test]
    async fn overrun_is_an_error() {
        let req = ExecRequest::shell("head -c 4096 /dev/zero").max_output(ByteSize::kib(1));
        let err = SystemHost.exec(&req).await;
        assert_matches!(err, Err(Error::OutputLimitExceeded { limit }) if limit == ByteSize::kib(1));
    }

    #[tokio::test]
    async fn output_at_limit_is_fine() {
        let req = ExecRequest::shell("head -c 1024 /dev/zero").max_output(ByteSize::kib(1));
        let out = SystemHost.exec(&req).await.unwrap();
        assert_eq!(out.stdout.len(), 1024);
    }

    #[test]
    fn random_is_filled() {
        let mut buf = [0u8; 64];
        SystemHost.fill_random(&mut buf).unwrap();
        assert!(buf.iter().any(|&b| b != 0));
    }
}
