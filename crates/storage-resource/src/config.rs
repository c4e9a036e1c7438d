//! Store configuration, supplied once at construction.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::StoreError;
use crate::kms::Passphrase;

const DEFAULT_INDEX_FILE: &str = "res_storage.json";

/// Which object handler physical storage goes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[serde(alias = "RSFile")]
    Plain,
    #[default]
    #[serde(alias = "RSFileEncrypted")]
    Encrypted,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Encrypted => "encrypted",
        })
    }
}

impl FromStr for HandlerKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" | "RSFile" => Ok(Self::Plain),
            "encrypted" | "RSFileEncrypted" => Ok(Self::Encrypted),
            other => Err(StoreError::Config(format!("unknown handler {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Root under which blobs are written.
    pub storage_dir: PathBuf,
    /// Site secret keys are derived from. Required for the encrypted handler.
    #[serde(default)]
    pub passphrase: Passphrase,
    #[serde(default)]
    pub handler: HandlerKind,
    /// Location of a file-backed index; defaults to a file in `storage_dir`.
    #[serde(default)]
    pub index_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn encrypted(storage_dir: impl Into<PathBuf>, passphrase: impl Into<Passphrase>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            passphrase: passphrase.into(),
            handler: HandlerKind::Encrypted,
            index_path: None,
        }
    }

    pub fn plain(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            passphrase: Passphrase::default(),
            handler: HandlerKind::Plain,
            index_path: None,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, StoreError> {
        toml::from_str(raw).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join(DEFAULT_INDEX_FILE))
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(StoreError::Config("storage_dir must be set".into()));
        }
        if self.handler == HandlerKind::Encrypted && self.passphrase.is_empty() {
            return Err(StoreError::Config(
                "encrypted handler requires a non-empty passphrase".into(),
            ));
        }
        Ok(())
    }
}
