use std::{
    io,
    path::{Path, PathBuf},
};

use path_absolutize::Absolutize;
use tracing::{debug, info};

use super::{identity::Identity, script::escape_double_quotes, script::Dialect};
use crate::{
    error::Error,
    host::{ExecRequest, Host},
};

/// The temporary directory owned by one attempt. Nothing else writes into it,
/// and it is removed before the attempt reports its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedContext {
    identity: Identity,
    root: PathBuf,
    dialect: Dialect,
    created: bool,
}

impl IsolatedContext {
    pub fn new(temp_dir: &Path, identity: Identity, dialect: Dialect) -> Result<Self, Error> {
        if temp_dir.as_os_str().is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "temp directory not defined").into());
        }
        let root = temp_dir.join(identity.as_str());
        if dialect == Dialect::Batch && root.to_string_lossy().contains('"') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "context path cannot contain double-quotes",
            )
            .into());
        }
        Ok(Self {
            identity,
            root,
            dialect,
            created: false,
        })
    }

    /// Creates the directory. It must not exist yet: an existing directory
    /// belongs to another attempt and is never adopted.
    pub async fn create(&mut self, host: &dyn Host) -> Result<(), Error> {
        host.create_dir(&self.root).await?;
        self.created = true;
        Ok(())
    }

    /// Whether [`create`](Self::create) succeeded. Only then is there
    /// anything of ours to remove.
    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    fn removal_command(&self) -> Result<String, Error> {
        let path = self.root.to_string_lossy();
        if path.trim().is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "path not defined").into());
        }
        // Never delete anything but the directory named after this attempt.
        if self.root.file_name().and_then(|n| n.to_str()) != Some(self.identity.as_str()) {
            return Err(Error::InvalidIdentity(path.into_owned()));
        }
        match self.dialect {
            Dialect::Batch => {
                if path.contains('"') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "path cannot contain double-quotes",
                    )
                    .into());
                }
                Ok(format!("rmdir /s /q \"{path}\""))
            }
            Dialect::Posix => {
                // Lexical only: symlinks are left alone.
                let normalized = self.root.absolutize()?;
                Ok(format!(
                    "/bin/rm -rf \"{}\"",
                    escape_double_quotes(&normalized.to_string_lossy())
                ))
            }
        }
    }

    /// Recursively deletes the context directory.
    #[tracing::instrument(skip_all, fields(root = %self.root.display()))]
    pub async fn remove(&self, host: &dyn Host) -> Result<(), Error> {
        let request = ExecRequest::shell(self.removal_command()?);
        debug!(%request, "Removing context");
        host.exec(&request).await?.check(&request)?;
        info!("Removed context");
        Ok(())
    }
}

/// Picks which error the caller sees once both the attempt and its cleanup
/// have finished. The attempt's own error always wins.
pub fn merge<T>(outcome: Result<T, Error>, cleanup: Result<(), Error>) -> Result<T, Error> {
    match (outcome, cleanup) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(v), Ok(())) => Ok(v),
    }
}
