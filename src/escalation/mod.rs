mod cleanup;
mod darwin;
mod identity;
mod linux;
mod result;
mod script;
mod windows;

use tracing::{info, warn};

pub use self::{
    cleanup::IsolatedContext,
    identity::{Identity, IDENTITY_LEN},
    script::{escape_batch, escape_double_quotes, Dialect, Script},
};
use crate::{
    config::Config,
    error::Error,
    host::{Host, SystemHost},
    request::ElevationRequest,
};

/// A token that is used to detect if a process has been escalated.
///
/// If the elevated shell prints this first on stdout, elevation succeeded and
/// any later failure belongs to the command itself.
pub const SUCCESS_TOKEN: &str = "SUDOPROMPT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Result<Self, Error> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Result<Self, Error> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(Error::UnsupportedPlatform(other.to_owned())),
        }
    }
}

/// Streams of an elevated command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

/// One platform's way of getting a command run elevated. The steps run in
/// order, and the orchestrator stops at the first error.
#[async_trait::async_trait]
trait Strategy: Send {
    /// Temporary directory to remove once the attempt is over.
    fn context(&self) -> Option<&IsolatedContext>;

    /// Locates the mechanism and writes everything it needs.
    async fn stage(&mut self, host: &dyn Host) -> Result<(), Error>;

    /// Asks the OS to elevate. Failures here are permission failures.
    async fn invoke(&mut self, host: &dyn Host) -> Result<(), Error>;

    async fn recover_result(&mut self, host: &dyn Host) -> Result<Output, Error>;
}

/// Runs commands elevated on one platform through one [`Host`].
#[derive(Debug, Clone)]
pub struct Elevator<H = SystemHost> {
    host: H,
    config: Config,
    platform: Platform,
}

impl Elevator<SystemHost> {
    /// An elevator for the real machine this process runs on.
    pub fn system(config: Config) -> Result<Self, Error> {
        Ok(Self::new(SystemHost, config, Platform::current()?))
    }
}

impl<H: Host> Elevator<H> {
    pub fn new(host: H, config: Config, platform: Platform) -> Self {
        Self {
            host,
            config,
            platform,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the request's command with administrator privileges and waits for
    /// it to finish. Any temporary files are gone by the time this returns.
    ///
    /// There is no timeout. Wrap the future to impose one; an abandoned
    /// attempt may leave its elevated process and temporary directory behind.
    #[tracing::instrument(skip_all, fields(platform = ?self.platform, name = request.name()))]
    pub async fn exec(&self, request: &ElevationRequest) -> Result<Output, Error> {
        let host: &dyn Host = &self.host;
        info!("Requesting elevation");
        let outcome = match self.platform {
            Platform::Linux => {
                let mut s = linux::Linux::new(request, &self.config, host)?;
                attempt(&mut s, host).await
            }
            Platform::MacOs => {
                let mut s = darwin::Darwin::new(request, &self.config, host)?;
                attempt(&mut s, host).await
            }
            Platform::Windows => {
                let mut s = windows::Windows::new(request, &self.config, host)?;
                attempt(&mut s, host).await
            }
        };
        match &outcome {
            Ok(_) => info!("Command succeeded"),
            Err(e) => info!(%e, "Elevation attempt failed"),
        }
        outcome
    }
}

async fn attempt(strategy: &mut dyn Strategy, host: &dyn Host) -> Result<Output, Error> {
    let outcome = run_steps(strategy, host).await;

    let removed = match strategy.context() {
        Some(ctx) if ctx.is_created() => ctx.remove(host).await,
        _ => Ok(()),
    };
    if let Err(e) = &removed {
        warn!(%e, "Failed to remove context");
    }
    cleanup::merge(outcome, removed)
}

async fn run_steps(strategy: &mut dyn Strategy, host: &dyn Host) -> Result<Output, Error> {
    strategy.stage(host).await?;
    strategy.invoke(host).await?;
    strategy.recover_result(host).await
}
