//! At-rest encryption for stored blobs: AES-256 in CBC mode with PKCS#7
//! padding, applied as a chunked stream transform.

pub mod transform;

pub use transform::{decrypt, decrypt_stream, encrypt, encrypt_stream};

use thiserror::Error;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// AES block length; CBC IVs are exactly one block.
pub const BLOCK_LEN: usize = 16;
pub const IV_LEN: usize = BLOCK_LEN;
/// Read size for the streaming transform. Must be a multiple of [`BLOCK_LEN`].
pub const CHUNK_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("key must be {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },
    #[error("IV must be {expected} bytes, got {actual}")]
    IvLength { expected: usize, actual: usize },
    #[error("IV is not valid base64: {0}")]
    IvEncoding(String),
    #[error("object has no IV on record")]
    MissingIv,
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    Malformed(u64),
    #[error("invalid padding after decryption")]
    Padding,
    #[error("decrypted content does not match the recorded hash")]
    Integrity,
    #[error("cipher rejected the key or IV length")]
    InvalidLength,
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn check_lengths(key: &[u8], iv: &[u8]) -> Result<(), CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::KeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        });
    }
    if iv.len() != IV_LEN {
        return Err(CipherError::IvLength {
            expected: IV_LEN,
            actual: iv.len(),
        });
    }
    Ok(())
}
