//! The narrow interface through which the elevation strategies touch the
//! operating system. Strategies only sequence these calls and interpret their
//! results; all I/O lives behind [`Host`].

use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use bytesize::ByteSize;

use crate::error::Error;

mod system;

pub use self::system::SystemHost;

/// What to run. Stdin of the spawned process is always closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A full command line, handed to `/bin/sh -c` or `cmd.exe /c` verbatim.
    Shell(String),
    /// A program started directly, without a shell in between.
    Program { program: PathBuf, args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub invocation: Invocation,
    pub cwd: Option<PathBuf>,
    /// Cap on each of stdout and stderr. Exceeding it is an error, never a
    /// silent truncation.
    pub max_output: Option<ByteSize>,
}

impl ExecRequest {
    pub fn shell(line: impl Into<String>) -> Self {
        Self {
            invocation: Invocation::Shell(line.into()),
            cwd: None,
            max_output: None,
        }
    }

    pub fn program(program: impl Into<PathBuf>) -> Self {
        Self {
            invocation: Invocation::Program {
                program: program.into(),
                args: vec![],
            },
            cwd: None,
            max_output: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn max_output(mut self, limit: ByteSize) -> Self {
        self.max_output = Some(limit);
        self
    }

    /// Short name for logs and errors.
    pub fn program_name(&self) -> String {
        match &self.invocation {
            Invocation::Shell(line) => line.split_whitespace().next().unwrap_or("sh").to_owned(),
            Invocation::Program { program, .. } => program.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for ExecRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.invocation {
            Invocation::Shell(line) => f.write_str(line),
            Invocation::Program { program, args } => {
                write!(f, "{}", program.display())?;
                for a in args {
                    write!(f, " {a}")?;
                }
                Ok(())
            }
        }
    }
}

/// Result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero exit into [`Error::Process`]. For helper processes
    /// whose failure is an internal error rather than a classified outcome.
    pub fn check(self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::Process {
                program: request.program_name(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub len: u64,
    pub is_dir: bool,
}

/// Process spawning, filesystem access, and the few bits of ambient state the
/// strategies need.
#[async_trait::async_trait]
pub trait Host: Send + Sync {
    /// Runs a process to completion, capturing both streams as UTF-8.
    ///
    /// A non-zero exit is reported through [`ExecOutput::code`], not as an
    /// error. Errors are reserved for spawn failures and output overruns.
    async fn exec(&self, request: &ExecRequest) -> Result<ExecOutput, Error>;

    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    async fn create_dir(&self, path: &Path) -> io::Result<()>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Reads a file as UTF-8, replacing invalid sequences like
    /// [`exec`](Self::exec) does for captured streams.
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    async fn sleep(&self, duration: Duration);

    fn temp_dir(&self) -> PathBuf;

    fn current_dir(&self) -> io::Result<PathBuf>;

    /// Login name of the invoking user.
    fn user(&self) -> Option<String>;

    /// Fills `buf` from a cryptographically secure source.
    fn fill_random(&self, buf: &mut [u8]) -> io::Result<()>;
}
