//! The caller's side of an elevation: the command, the name shown in the
//! prompt, and the environment to run it with. Everything here is checked
//! before any process is spawned or any file is touched.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::Error;

/// Longest accepted display name. Leaves room for Unicode normalization to
/// grow the app bundle name without hitting filesystem limits.
pub const MAX_NAME_LEN: usize = 70;

pub type Env = BTreeMap<String, String>;

/// A validated request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationRequest {
    command: String,
    name: String,
    icon: Option<PathBuf>,
    env: Env,
}

impl ElevationRequest {
    pub fn builder(command: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            command: command.into(),
            name: None,
            icon: None,
            env: None,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> Option<&Path> {
        self.icon.as_deref()
    }

    pub fn env(&self) -> &Env {
        &self.env
    }
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    command: String,
    name: Option<String>,
    icon: Option<PathBuf>,
    env: Option<Env>,
}

impl RequestBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// An `.icns` file shown in the macOS prompt. Ignored elsewhere.
    pub fn icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(Env::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replaces the whole environment mapping. An empty mapping is rejected
    /// by [`build`](Self::build); leave it unset instead.
    pub fn envs(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    pub fn build(self) -> Result<ElevationRequest, Error> {
        if self
            .command
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sudo"))
        {
            return Err(Error::Validation(
                "Command should not be prefixed with \"sudo\".".into(),
            ));
        }

        let name = match self.name {
            Some(name) if valid_name(&name) => name,
            Some(_) => {
                return Err(Error::Validation(format!(
                    "name must be alphanumeric only (spaces are allowed) and <= {MAX_NAME_LEN} characters."
                )))
            }
            None => default_name().ok_or_else(|| {
                Error::Validation("The executable name cannot be used as a valid name.".into())
            })?,
        };

        if let Some(icon) = &self.icon {
            if icon.as_os_str().to_string_lossy().trim().is_empty() {
                return Err(Error::Validation(
                    "icon must not be empty if provided.".into(),
                ));
            }
        }

        let env = match self.env {
            Some(env) if env.is_empty() => {
                return Err(Error::Validation("env must not be empty if provided.".into()))
            }
            Some(env) => env,
            None => Env::new(),
        };
        for (key, value) in &env {
            if !valid_env_key(key) {
                return Err(Error::Validation(format!(
                    "env has an invalid environment variable name: {key:?}"
                )));
            }
            if value.contains(['\r', '\n']) {
                return Err(Error::Validation(format!(
                    "env has an invalid environment variable value: {value:?}"
                )));
            }
        }

        Ok(ElevationRequest {
            command: self.command,
            name,
            icon: self.icon,
            env,
        })
    }
}

/// Letters, digits and spaces, not blank, at most [`MAX_NAME_LEN`] long.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b' ')
        && !name.trim().is_empty()
}

/// POSIX portable environment variable name.
pub fn valid_env_key(key: &str) -> bool {
    let mut bytes = key.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn default_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let stem = exe.file_stem()?.to_str()?.to_owned();
    debug!(?stem, "No name given, falling back to executable name");
    valid_name(&stem).then_some(stem)
}
