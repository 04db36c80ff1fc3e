use bytesize::ByteSize;

/// Shown to the caller whenever the elevation step itself fails. OS messages
/// are localized, so they are never used as the primary message.
pub const PERMISSION_DENIED: &str = "User did not grant permission.";

/// Shown when polkit reports that no authentication agent is running.
pub const NO_POLKIT_AGENT: &str = "No polkit authentication agent found.";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Platform not yet supported: {0}")]
    UnsupportedPlatform(String),

    #[error("{0}")]
    MechanismNotFound(String),

    /// The user declined the prompt, cancelled it, or the mechanism failed
    /// before the inner command started. `cause` keeps whatever the mechanism
    /// reported, for diagnostics only.
    #[error("User did not grant permission.")]
    PermissionDenied { cause: Option<String> },

    #[error("No polkit authentication agent found.")]
    NoPolkitAgent,

    /// The inner command ran elevated and exited non-zero.
    #[error("Command failed: {command}\n{stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Process output exceeded the limit of {limit}")]
    OutputLimitExceeded { limit: ByteSize },

    #[error("Unexpected exit status contents: {0:?}")]
    MalformedStatus(String),

    #[error("Expected a valid attempt identity, got {0:?}")]
    InvalidIdentity(String),

    #[error("env['USER'] not defined.")]
    MissingUser,

    /// A helper process used while staging or cleaning up exited non-zero.
    #[error("{program} exited with {code:?}: {stderr}")]
    Process {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn permission_denied(cause: impl ToString) -> Self {
        Error::PermissionDenied {
            cause: Some(cause.to_string()),
        }
    }

    /// True for every outcome where the elevation itself did not happen.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::PermissionDenied { .. } | Error::NoPolkitAgent)
    }

    /// Exit code of the inner command, when it ran and failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
