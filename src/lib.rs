//! Run a command as administrator/root behind the operating system's own
//! password prompt, and get its stdout, stderr and exit status back.
//!
//! ```no_run
//! # async fn demo() -> Result<(), sudo_prompt::Error> {
//! let request = sudo_prompt::ElevationRequest::builder("echo hello")
//!     .name("Electron")
//!     .build()?;
//! let output = sudo_prompt::exec(&request).await?;
//! assert_eq!(output.stdout.trim(), "hello");
//! # Ok(())
//! # }
//! ```
//!
//! A declined prompt is reported as [`Error::PermissionDenied`] (or
//! [`Error::NoPolkitAgent`]), and never confused with the command itself
//! failing, which is [`Error::CommandFailed`].

pub mod config;
pub mod error;
pub mod escalation;
pub mod host;
pub mod request;

pub use self::{
    config::Config,
    error::Error,
    escalation::{Elevator, Output, Platform},
    host::{Host, SystemHost},
    request::ElevationRequest,
};

/// Runs `request` elevated on this machine with the default [`Config`].
pub async fn exec(request: &ElevationRequest) -> Result<Output, Error> {
    exec_with(request, Config::default()).await
}

pub async fn exec_with(request: &ElevationRequest, config: Config) -> Result<Output, Error> {
    Elevator::system(config)?.exec(request).await
}
