use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use crate::{
    encoding::decode_token,
    error::{CodecError, Result},
};

/// Key size shared by every supported cipher (256-bit).
pub const KEY_SIZE: usize = 32;

const KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// Largest multiple of the charset size that fits in a byte; anything above is rejected
// so every character is equally likely.
const ACCEPT_BELOW: usize = 256 - 256 % KEY_CHARSET.len();

/// True when the trimmed key is exactly [`KEY_SIZE`] bytes.
pub fn is_key_valid(key: &[u8]) -> bool {
    key.trim_ascii().len() == KEY_SIZE
}

/// Random alphanumeric key of [`KEY_SIZE`] characters.
pub fn generate_key() -> Result<Zeroizing<Vec<u8>>> {
    generate_key_with_length(KEY_SIZE)
}

/// Random alphanumeric key of `length` characters.
///
/// The result must still pass [`is_key_valid`], so any length other than
/// [`KEY_SIZE`] is reported as [`CodecError::InvalidKey`].
pub fn generate_key_with_length(length: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut key = Zeroizing::new(Vec::with_capacity(length));
    let mut pool = [0u8; 64];

    while key.len() < length {
        OsRng
            .try_fill_bytes(&mut pool)
            .map_err(|err| CodecError::Random {
                reason: err.to_string(),
            })?;
        for &byte in pool.iter().filter(|&&b| usize::from(b) < ACCEPT_BELOW) {
            if key.len() == length {
                break;
            }
            key.push(KEY_CHARSET[usize::from(byte) % KEY_CHARSET.len()]);
        }
    }
    pool.zeroize();

    if !is_key_valid(&key) {
        return Err(CodecError::InvalidKey {
            reason: format!("generated key has {length} bytes, cipher needs {KEY_SIZE}"),
        });
    }
    Ok(key)
}

/// `len` bytes from the OS random source.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut out)
        .map_err(|err| CodecError::Random {
            reason: err.to_string(),
        })?;
    Ok(out)
}

/// Resolves a caller-supplied key to cipher key bytes.
///
/// A key may arrive Base64-encoded, as raw bytes, or Base64-encoded twice by
/// an upstream layer; the interpretations are tried in that order. At most
/// one of them can be [`KEY_SIZE`] bytes long: a 32-byte decode needs 43 or
/// more input characters, while a 32-character key decodes to 24 bytes.
pub(crate) fn cipher_key(key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let decoded_once = decode_token(key).map(Zeroizing::new);
    let decoded_twice = decoded_once
        .as_ref()
        .and_then(|once| decode_token(once))
        .map(Zeroizing::new);
    let raw = Zeroizing::new(key.trim_ascii().to_vec());

    [decoded_once, Some(raw), decoded_twice]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.len() == KEY_SIZE)
        .ok_or_else(|| CodecError::InvalidKey {
            reason: format!("key must be {KEY_SIZE} bytes, raw or Base64-encoded"),
        })
}
