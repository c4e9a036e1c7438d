//! Chunked AES-256-CBC stream transform.
//!
//! Input is consumed in [`CHUNK_LEN`] reads. Complete blocks are transformed
//! as soon as they arrive and the CBC chaining state lives in the
//! encryptor/decryptor, so memory use is bounded by one chunk regardless of
//! object size. Output is identical to a one-shot PKCS#7 CBC transform.

use std::io::{self, Read, Write};

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::{check_lengths, CipherError, BLOCK_LEN, CHUNK_LEN};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

fn init<C: KeyIvInit>(key: &[u8], iv: &[u8]) -> Result<C, CipherError> {
    check_lengths(key, iv)?;
    C::new_from_slices(key, iv).map_err(|_| CipherError::InvalidLength)
}

fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Encrypt everything `reader` yields into `writer`. Returns the number of
/// ciphertext bytes written, always a positive multiple of [`BLOCK_LEN`].
pub fn encrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    key: &[u8],
    iv: &[u8],
) -> Result<u64, CipherError> {
    let mut enc: Aes256CbcEnc = init(key, iv)?;

    let mut buf = vec![0u8; CHUNK_LEN];
    let mut pending = 0usize;
    let mut written = 0u64;
    loop {
        let n = read_some(&mut reader, &mut buf[pending..])?;
        if n == 0 {
            break;
        }
        pending += n;
        let ready = pending - pending % BLOCK_LEN;
        for block in buf[..ready].chunks_exact_mut(BLOCK_LEN) {
            enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        writer.write_all(&buf[..ready])?;
        written += ready as u64;
        buf.copy_within(ready..pending, 0);
        pending -= ready;
    }

    let tail = enc.encrypt_padded_vec_mut::<Pkcs7>(&buf[..pending]);
    writer.write_all(&tail)?;
    writer.flush()?;
    Ok(written + tail.len() as u64)
}

/// Decrypt everything `reader` yields into `writer`. Returns the number of
/// plaintext bytes written.
///
/// The final block is held back until EOF so the padding check runs exactly
/// once. On error `writer` may already hold a prefix of the plaintext; callers
/// must discard it.
pub fn decrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    key: &[u8],
    iv: &[u8],
) -> Result<u64, CipherError> {
    let mut dec: Aes256CbcDec = init(key, iv)?;

    let mut buf = vec![0u8; CHUNK_LEN];
    let mut pending = 0usize;
    let mut consumed = 0u64;
    let mut written = 0u64;
    loop {
        let n = read_some(&mut reader, &mut buf[pending..])?;
        if n == 0 {
            break;
        }
        pending += n;
        consumed += n as u64;
        if pending <= BLOCK_LEN {
            continue;
        }
        let ready = (pending - 1) / BLOCK_LEN * BLOCK_LEN;
        for block in buf[..ready].chunks_exact_mut(BLOCK_LEN) {
            dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        writer.write_all(&buf[..ready])?;
        written += ready as u64;
        buf.copy_within(ready..pending, 0);
        pending -= ready;
    }

    if pending != BLOCK_LEN {
        return Err(CipherError::Malformed(consumed));
    }
    let tail = dec
        .decrypt_padded_vec_mut::<Pkcs7>(&buf[..BLOCK_LEN])
        .map_err(|_| CipherError::Padding)?;
    writer.write_all(&tail)?;
    writer.flush()?;
    Ok(written + tail.len() as u64)
}

pub fn encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut out = Vec::with_capacity(plaintext.len() + BLOCK_LEN);
    encrypt_stream(plaintext, &mut out, key, iv)?;
    Ok(out)
}

pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut out = Vec::with_capacity(ciphertext.len());
    decrypt_stream(ciphertext, &mut out, key, iv)?;
    Ok(out)
}
