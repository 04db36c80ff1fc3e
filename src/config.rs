use std::{path::PathBuf, time::Duration};

use bytesize::ByteSize;
use serde::Deserialize;

use crate::escalation::SUCCESS_TOKEN;

/// Knobs for an [`Elevator`](crate::Elevator). Every field has a default, so a
/// config file only needs to name the ones it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// How long to wait between checks of the status file on Windows.
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Smallest status file that can hold a complete exit code: one digit plus
    /// a line terminator.
    pub min_status_len: u64,

    /// Cap on captured output of the elevation mechanism.
    pub max_output: ByteSize,

    /// Elevation front-ends probed on Linux, in order of preference.
    pub linux_candidates: Vec<PathBuf>,

    /// Zip of the prebuilt macOS prompt applet. Its root must be the
    /// `Contents` directory of the app bundle. Overrides the copy compiled in
    /// with the `bundled-applet` feature.
    pub applet: Option<PathBuf>,

    /// Printed by the elevated shell before the command runs.
    pub success_token: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            min_status_len: 2,
            max_output: ByteSize::mib(128),
            linux_candidates: vec!["/usr/bin/kdesudo".into(), "/usr/bin/pkexec".into()],
            applet: None,
            success_token: SUCCESS_TOKEN.into(),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
