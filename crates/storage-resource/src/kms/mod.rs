//! Key derivation from the site passphrase and IV generation.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::encryption::{IV_LEN, KEY_LEN};

/// Symmetric key derived for the duration of one operation.
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Site-wide secret. Zeroized on drop and never printed.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<Vec<u8>>);

impl Passphrase {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Passphrase {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl<'de> Deserialize<'de> for Passphrase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secret = Zeroizing::new(String::deserialize(deserializer)?);
        Ok(Self::new(secret.as_bytes()))
    }
}

/// SHA-256 of the passphrase: deterministic, one-way, and exactly the AES-256
/// key size. Never cached; each handler operation derives its own copy.
pub fn derive_key(passphrase: &Passphrase) -> DerivedKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    let digest = Sha256::digest(passphrase.as_bytes());
    key.copy_from_slice(&digest);
    key
}

#[derive(Debug, Error)]
#[error("secure random source unavailable: {0}")]
pub struct EntropyError(pub String);

/// Source of per-object IVs.
pub trait IvSource: Send + Sync {
    fn fill(&self, iv: &mut [u8]) -> Result<(), EntropyError>;
}

/// Operating-system CSPRNG. Errors are surfaced, never replaced by a weaker source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsIvSource;

impl IvSource for OsIvSource {
    fn fill(&self, iv: &mut [u8]) -> Result<(), EntropyError> {
        OsRng
            .try_fill_bytes(iv)
            .map_err(|e| EntropyError(e.to_string()))
    }
}

/// Draw a fresh IV for a new object.
pub fn new_iv(source: &dyn IvSource) -> Result<[u8; IV_LEN], EntropyError> {
    let mut iv = [0u8; IV_LEN];
    source.fill(&mut iv)?;
    Ok(iv)
}
