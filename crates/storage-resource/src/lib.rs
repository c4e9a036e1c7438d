//! Encrypted at-rest resource store.
//!
//! [`ResourceStore`] copies files under a random id, optionally encrypting
//! them with AES-256-CBC under a key derived from a site passphrase, and keeps
//! a [`storage_index::MetadataIndex`] in step with the blobs on disk.

pub mod config;
pub mod encryption;
pub mod error;
pub mod handler;
pub mod kms;
pub mod store;

pub use config::{HandlerKind, StoreConfig};
pub use error::{Operation, StoreError};
pub use handler::{Download, ObjectHandler};
pub use kms::Passphrase;
pub use store::{DeleteOutcome, ReconcileReport, ResourceStore, ResourceStoreBuilder};
