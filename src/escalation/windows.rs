//! UAC through PowerShell's `Start-Process -Verb runAs`. The elevated process
//! is detached from us, so its exit code and streams come back through files
//! and we poll for them.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tracing::{debug, info, trace};

use super::{
    cleanup::IsolatedContext,
    identity::Identity,
    result,
    script::{Dialect, Script},
    Output, Strategy,
};
use crate::{
    config::Config,
    error::Error,
    host::{ExecRequest, FileStat, Host},
    request::ElevationRequest,
};

/// State of the status file as seen by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Waiting,
    Done,
}

impl Poll {
    /// A status file that is missing or shorter than `min_len` is still being
    /// written.
    pub fn classify(stat: io::Result<FileStat>, min_len: u64) -> io::Result<Poll> {
        match stat {
            Ok(s) if s.len >= min_len => Ok(Poll::Done),
            Ok(_) => Ok(Poll::Waiting),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Poll::Waiting),
            Err(e) => Err(e),
        }
    }
}

pub struct Windows<'a> {
    request: &'a ElevationRequest,
    config: &'a Config,
    cwd: String,
    ctx: IsolatedContext,
}

impl<'a> Windows<'a> {
    pub fn new(
        request: &'a ElevationRequest,
        config: &'a Config,
        host: &dyn Host,
    ) -> Result<Self, Error> {
        let identity = Identity::generate(request.name(), request.command(), |buf| {
            host.fill_random(buf)
        })?;
        let ctx = IsolatedContext::new(&host.temp_dir(), identity, Dialect::Batch)?;
        Ok(Self {
            request,
            config,
            cwd: host.current_dir()?.to_string_lossy().into_owned(),
            ctx,
        })
    }

    fn execute_path(&self) -> PathBuf {
        self.ctx.join("execute.bat")
    }

    fn command_path(&self) -> PathBuf {
        self.ctx.join("command.bat")
    }

    fn stdout_path(&self) -> PathBuf {
        self.ctx.join("stdout")
    }

    fn stderr_path(&self) -> PathBuf {
        self.ctx.join("stderr")
    }

    fn status_path(&self) -> PathBuf {
        self.ctx.join("status")
    }

    /// Runs the command script with its streams and exit code sent to files.
    fn execute_script(&self) -> String {
        [
            "@echo off".to_owned(),
            format!(
                "call \"{}\" > \"{}\" 2> \"{}\"",
                self.command_path().display(),
                self.stdout_path().display(),
                self.stderr_path().display()
            ),
            format!("(echo %ERRORLEVEL%) > \"{}\"", self.status_path().display()),
        ]
        .join(Dialect::Batch.line_ending())
    }

    fn elevate_command(&self) -> String {
        // Double quotes for cmd, single quotes for PowerShell, and a backtick
        // before any single quote inside.
        let execute = self.execute_path().to_string_lossy().replace('\'', "`'");
        format!("powershell.exe Start-Process -FilePath \"'{execute}'\" -WindowStyle hidden -Verb runAs")
    }

    #[tracing::instrument(skip_all)]
    async fn wait_for_status(&self, host: &dyn Host) -> Result<(), Error> {
        let status = self.status_path();
        let stdout = self.stdout_path();
        loop {
            let stat = host.stat(&status).await;
            match Poll::classify(stat, self.config.min_status_len)? {
                Poll::Done => return Ok(()),
                Poll::Waiting => trace!("Status not written yet"),
            }

            host.sleep(self.config.poll_interval).await;

            // An administrator without a password who clicks Yes gets no
            // error from PowerShell, yet the script never runs. The stdout
            // redirect is the first thing it does, so its absence means the
            // command never started.
            if let Err(e) = host.stat(&stdout).await {
                debug!(?e, "Command never started");
                return Err(Error::permission_denied(format!(
                    "{} was never created",
                    stdout.display()
                )));
            }
        }
    }
}

async fn write(host: &dyn Host, path: &Path, contents: &str) -> Result<(), Error> {
    trace!(?path, "Writing script");
    host.write(path, contents.as_bytes()).await?;
    Ok(())
}

#[async_trait::async_trait]
impl Strategy for Windows<'_> {
    fn context(&self) -> Option<&IsolatedContext> {
        Some(&self.ctx)
    }

    #[tracing::instrument(skip_all, fields(id = %self.ctx.identity()))]
    async fn stage(&mut self, host: &dyn Host) -> Result<(), Error> {
        self.ctx.create(host).await?;
        write(host, &self.execute_path(), &self.execute_script()).await?;

        let command = Script {
            dialect: Dialect::Batch,
            cwd: &self.cwd,
            env: self.request.env(),
            command: self.request.command(),
        }
        .render()?;
        write(host, &self.command_path(), &command).await
    }

    #[tracing::instrument(skip_all)]
    async fn invoke(&mut self, host: &dyn Host) -> Result<(), Error> {
        let request = ExecRequest::shell(self.elevate_command());
        debug!(%request, "Invoking");
        // Error text here is localized, so every failure counts as a denial.
        match host.exec(&request).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(Error::permission_denied(result::describe_failure(
                out.code,
                &out.stderr,
            ))),
            Err(e) => Err(Error::permission_denied(e)),
        }
    }

    async fn recover_result(&mut self, host: &dyn Host) -> Result<Output, Error> {
        self.wait_for_status(host).await?;
        info!("Status written");

        let status = host.read_to_string(&self.status_path()).await?;
        let stdout = host.read_to_string(&self.stdout_path()).await?;
        let stderr = host.read_to_string(&self.stderr_path()).await?;
        result::from_triad(self.request.command(), &status, stdout, stderr)
    }
}
