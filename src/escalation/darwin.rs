//! macOS. A prebuilt applet bundle shows the password prompt, runs our script
//! as root, and leaves the exit code and streams next to its executable.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::{
    cleanup::IsolatedContext,
    identity::Identity,
    result,
    script::{escape_double_quotes, Dialect, Script},
    Output, Strategy,
};
use crate::{
    config::Config,
    error::Error,
    host::{ExecRequest, Host},
    request::ElevationRequest,
};

/// Name of the applet's executable inside `Contents/MacOS`.
const APPLET_BINARY: &str = "applet";
/// The applet runs this script, from its own directory.
const COMMAND_SCRIPT: &str = "sudo-prompt-command";

/// Applet zip compiled in from the path in `SUDO_PROMPT_APPLET_ZIP`.
#[cfg(feature = "bundled-applet")]
const BUNDLED_APPLET: Option<&[u8]> = Some(include_bytes!(env!("SUDO_PROMPT_APPLET_ZIP")));
#[cfg(not(feature = "bundled-applet"))]
const BUNDLED_APPLET: Option<&[u8]> = None;

/// Where the applet zip comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AppletSource {
    File(PathBuf),
    Bundled(&'static [u8]),
}

impl AppletSource {
    /// A configured file wins over the bundled copy.
    fn select(configured: Option<&Path>, bundled: Option<&'static [u8]>) -> Result<Self, Error> {
        match (configured, bundled) {
            (Some(path), _) => Ok(AppletSource::File(path.to_owned())),
            (None, Some(bytes)) => Ok(AppletSource::Bundled(bytes)),
            (None, None) => Err(Error::MechanismNotFound(
                "No prompt applet bundle configured.".into(),
            )),
        }
    }
}

pub struct Darwin<'a> {
    request: &'a ElevationRequest,
    applet: AppletSource,
    cwd: String,
    ctx: IsolatedContext,
    /// `<context>/<name>.app`
    app: PathBuf,
}

impl<'a> Darwin<'a> {
    pub fn new(
        request: &'a ElevationRequest,
        config: &'a Config,
        host: &dyn Host,
    ) -> Result<Self, Error> {
        let applet = AppletSource::select(config.applet.as_deref(), BUNDLED_APPLET)?;
        // The applet's shell scripts need $USER.
        host.user().ok_or(Error::MissingUser)?;

        let identity = Identity::generate(request.name(), request.command(), |buf| {
            host.fill_random(buf)
        })?;
        let ctx = IsolatedContext::new(&host.temp_dir(), identity, Dialect::Posix)?;
        let app = ctx.join(format!("{}.app", request.name()));
        Ok(Self {
            request,
            applet,
            cwd: host.current_dir()?.to_string_lossy().into_owned(),
            ctx,
            app,
        })
    }

    fn macos_dir(&self) -> PathBuf {
        self.app.join("Contents").join("MacOS")
    }

    async fn unpack_applet(&self, host: &dyn Host) -> Result<(), Error> {
        let zip = self.ctx.join("sudo-prompt-applet.zip");
        match &self.applet {
            AppletSource::File(path) => {
                let bundle = host.read(path).await?;
                host.write(&zip, &bundle).await?;
            }
            AppletSource::Bundled(bytes) => host.write(&zip, bytes).await?,
        }

        let request = ExecRequest::shell(format!(
            "/usr/bin/unzip -o \"{}\" -d \"{}\"",
            escape_double_quotes(&zip.to_string_lossy()),
            escape_double_quotes(&self.app.to_string_lossy())
        ));
        host.exec(&request).await?.check(&request)?;
        debug!(app = ?self.app, "Unpacked applet");
        Ok(())
    }

    async fn copy_icon(&self, host: &dyn Host) -> Result<(), Error> {
        let Some(icon) = self.request.icon() else {
            return Ok(());
        };
        let bytes = host.read(icon).await?;
        let dest = self.app.join("Contents").join("Resources").join("applet.icns");
        host.write(&dest, &bytes).await?;
        Ok(())
    }

    /// The prompt is titled after the bundle name.
    async fn set_bundle_name(&self, host: &dyn Host) -> Result<(), Error> {
        let plist = self.app.join("Contents").join("Info.plist");
        let value = format!("{} Password Prompt", self.request.name());
        // `defaults` wants the value single-quoted.
        if value.contains('\'') {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "bundle name should not contain single quotes",
            )
            .into());
        }
        let request = ExecRequest::shell(format!(
            "/usr/bin/defaults write \"{}\" \"CFBundleName\" '{value}'",
            escape_double_quotes(&plist.to_string_lossy())
        ));
        host.exec(&request).await?.check(&request)?;
        Ok(())
    }

    async fn write_command(&self, host: &dyn Host) -> Result<(), Error> {
        // Runs in a subshell of the applet, so the cd doesn't affect it.
        let script = Script {
            dialect: Dialect::Posix,
            cwd: &self.cwd,
            env: self.request.env(),
            command: self.request.command(),
        }
        .render()?;
        host.write(&self.macos_dir().join(COMMAND_SCRIPT), script.as_bytes())
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Strategy for Darwin<'_> {
    fn context(&self) -> Option<&IsolatedContext> {
        Some(&self.ctx)
    }

    #[tracing::instrument(skip_all, fields(id = %self.ctx.identity()))]
    async fn stage(&mut self, host: &dyn Host) -> Result<(), Error> {
        self.ctx.create(host).await?;
        self.unpack_applet(host).await?;
        self.copy_icon(host).await?;
        self.set_bundle_name(host).await?;
        self.write_command(host).await
    }

    #[tracing::instrument(skip_all)]
    async fn invoke(&mut self, host: &dyn Host) -> Result<(), Error> {
        // Started directly from its own directory: the app path may contain
        // spaces, and the applet finds its scripts relative to the cwd.
        let request =
            ExecRequest::program(Path::new(".").join(APPLET_BINARY)).cwd(self.macos_dir());
        debug!(%request, "Launching applet");
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
        let dir = self.macos_dir();
        let status = match host.read_to_string(&dir.join("code")).await {
            Ok(s) => s,
            // The applet only writes this after the user authenticated.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No exit status, prompt was declined");
                return Err(Error::permission_denied("applet wrote no exit status"));
            }
            Err(e) => return Err(e.into()),
        };
        let stdout = host.read_to_string(&dir.join("stdout")).await?;
        let stderr = host.read_to_string(&dir.join("stderr")).await?;
        result::from_triad(self.request.command(), &status, stdout, stderr)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    static ZIP: &[u8] = b"PK\x03\x04";

    #[test]
    fn configured_applet_wins() {
        let source = AppletSource::select(Some(Path::new("/opt/applet.zip")), Some(ZIP)).unwrap();
        assert_eq!(source, AppletSource::File("/opt/applet.zip".into()));
    }

    #[test]
    fn bundled_applet_is_fallback() {
        assert_eq!(AppletSource::select(None, Some(ZIP)).unwrap(), AppletSource::Bundled(ZIP));
    }

    #[test]
    fn no_applet_at_all() {
        assert_matches!(AppletSource::select(None, None), Err(Error::MechanismNotFound(_)));
    }
}
