use std::{
    fmt, io,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::Error;

/// Length of an identity, in hex characters.
pub const IDENTITY_LEN: usize = 32;

const RANDOM_BYTES: usize = 256;
const DOMAIN_TAG: &[u8] = b"sudo-prompt-attempt-v1";

/// Names one elevation attempt's temporary directory. Always exactly
/// [`IDENTITY_LEN`] lowercase hex characters; cleanup relies on that before it
/// deletes anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Hashes fresh random bytes together with the name and command. The name
    /// and command only add entropy.
    ///
    /// If `entropy` fails, a time-seeded pseudorandom value is used instead so
    /// the attempt can still go ahead.
    pub fn generate(
        name: &str,
        command: &str,
        entropy: impl FnOnce(&mut [u8]) -> io::Result<()>,
    ) -> Result<Self, Error> {
        let mut random = vec![0u8; RANDOM_BYTES];
        if let Err(e) = entropy(&mut random) {
            warn!(?e, "Secure random source failed, using weak fallback");
            random = weak_entropy().into_bytes();
        }

        let digest = Sha256::new()
            .chain_update(DOMAIN_TAG)
            .chain_update(name)
            .chain_update(command)
            .chain_update(&random)
            .finalize();
        let hex = base16::encode_lower(&digest);
        Self::parse(&hex[hex.len().saturating_sub(IDENTITY_LEN)..])
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        let valid = s.len() == IDENTITY_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if valid {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::InvalidIdentity(s.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn weak_entropy() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seed = now.as_nanos() as u64 ^ u64::from(std::process::id()).rotate_left(32);
    let pseudo: f64 = StdRng::seed_from_u64(seed).gen();
    format!("{}{pseudo}", now.as_millis())
}
