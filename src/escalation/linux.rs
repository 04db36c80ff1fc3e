//! kdesudo/pkexec. The mechanism's own stdout carries the result, so no
//! temporary files are needed.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::{
    cleanup::IsolatedContext,
    result,
    script::{escape_double_quotes, Dialect, Script},
    Output, Strategy,
};
use crate::{
    config::Config,
    error::Error,
    host::{ExecOutput, ExecRequest, Host},
    request::ElevationRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    /// Shows a custom message in its dialog.
    Kdesudo,
    Pkexec,
    Unknown,
}

impl Frontend {
    pub fn of(binary: &Path) -> Self {
        let name = binary
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("kdesudo") {
            Frontend::Kdesudo
        } else if name.contains("pkexec") {
            Frontend::Pkexec
        } else {
            Frontend::Unknown
        }
    }

    fn args(self, name: &str) -> Vec<String> {
        match self {
            Frontend::Kdesudo => vec![
                "--comment".into(),
                format!("\"{name} wants to make changes. Enter your password to allow this.\""),
                // Don't show the wrapped command in the dialog.
                "-d".into(),
                "--".into(),
            ],
            Frontend::Pkexec => vec!["--disable-internal-agent".into()],
            Frontend::Unknown => vec![],
        }
    }
}

/// Returns the first candidate that exists. Missing paths are skipped; any
/// other filesystem error stops the search.
#[tracing::instrument(skip_all)]
pub async fn select_binary(host: &dyn Host, candidates: &[PathBuf]) -> Result<PathBuf, Error> {
    for path in candidates {
        match host.stat(path).await {
            Ok(_) => {
                info!(?path, "Found elevation front-end");
                return Ok(path.clone());
            }
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                debug!(?path, "Not present");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::MechanismNotFound(
        "Unable to find pkexec or kdesudo.".into(),
    ))
}

pub struct Linux<'a> {
    request: &'a ElevationRequest,
    config: &'a Config,
    cwd: String,
    binary: Option<PathBuf>,
    invoked: Option<ExecOutput>,
}

impl<'a> Linux<'a> {
    pub fn new(
        request: &'a ElevationRequest,
        config: &'a Config,
        host: &dyn Host,
    ) -> Result<Self, Error> {
        Ok(Self {
            request,
            config,
            cwd: host.current_dir()?.to_string_lossy().into_owned(),
            binary: None,
            invoked: None,
        })
    }

    fn command_line(&self, binary: &Path) -> Result<String, Error> {
        let script = Script {
            dialect: Dialect::Posix,
            cwd: &self.cwd,
            env: self.request.env(),
            command: self.request.command(),
        };
        let mut parts: Vec<String> = script
            .prelude()?
            .into_iter()
            .map(|line| format!("{line};"))
            .collect();

        parts.push(format!(
            "\"{}\"",
            escape_double_quotes(&binary.to_string_lossy())
        ));
        parts.extend(Frontend::of(binary).args(self.request.name()));
        parts.push(format!(
            "/bin/bash -c \"echo {}; {}\"",
            escape_double_quotes(&self.config.success_token),
            escape_double_quotes(self.request.command())
        ));
        Ok(parts.join(" "))
    }
}

#[async_trait::async_trait]
impl Strategy for Linux<'_> {
    fn context(&self) -> Option<&IsolatedContext> {
        None
    }

    async fn stage(&mut self, host: &dyn Host) -> Result<(), Error> {
        self.binary = Some(select_binary(host, &self.config.linux_candidates).await?);
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn invoke(&mut self, host: &dyn Host) -> Result<(), Error> {
        let Some(binary) = &self.binary else {
            return Err(Error::MechanismNotFound("No front-end selected.".into()));
        };
        let request = ExecRequest::shell(self.command_line(binary)?).max_output(self.config.max_output);
        debug!(%request, "Invoking");

        match host.exec(&request).await {
            Ok(out) => {
                self.invoked = Some(out);
                Ok(())
            }
            Err(e @ Error::OutputLimitExceeded { .. }) => Err(e),
            // Nothing ran, so the token can't be there either.
            Err(e) => Err(Error::permission_denied(e)),
        }
    }

    async fn recover_result(&mut self, _host: &dyn Host) -> Result<Output, Error> {
        let out = self.invoked.take().unwrap_or_default();
        result::from_inline(&self.config.success_token, self.request.command(), out)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("/usr/bin/kdesudo", Frontend::Kdesudo)]
    #[test_case("/usr/bin/pkexec", Frontend::Pkexec)]
    #[test_case("/opt/PKEXEC", Frontend::Pkexec)]
    #[test_case("/usr/bin/doas", Frontend::Unknown)]
    fn frontend_from_path(path: &str, expected: Frontend) {
        assert_eq!(Frontend::of(Path::new(path)), expected);
    }

    fn linux<'a>(request: &'a ElevationRequest, config: &'a Config) -> Linux<'a> {
        Linux {
            request,
            config,
            cwd: "/work dir".into(),
            binary: None,
            invoked: None,
        }
    }

    #[test]
    fn pkexec_command_line() {
        let request = ElevationRequest::builder("echo \"$FOO\"")
            .name("My App")
            .env("FOO", "bar baz")
            .build()
            .unwrap();
        let config = Config::default();
        let line = linux(&request, &config)
            .command_line(Path::new("/usr/bin/pkexec"))
            .unwrap();
        assert_eq!(
            line,
            "cd \"/work dir\"; export FOO=\"bar baz\"; \"/usr/bin/pkexec\" \
             --disable-internal-agent /bin/bash -c \"echo SUDOPROMPT; echo \\\"$FOO\\\"\""
        );
    }

    #[test]
    fn kdesudo_command_line() {
        let request = ElevationRequest::builder("id -u")
            .name("My App")
            .build()
            .unwrap();
        let config = Config::default();
        let line = linux(&request, &config)
            .command_line(Path::new("/usr/bin/kdesudo"))
            .unwrap();
        assert_eq!(
            line,
            "cd \"/work dir\"; \"/usr/bin/kdesudo\" --comment \"My App wants to make changes. \
             Enter your password to allow this.\" -d -- /bin/bash -c \"echo SUDOPROMPT; id -u\""
        );
    }
}
