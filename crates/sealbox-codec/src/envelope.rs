//! Sealed payload layout.
//!
//! Current payloads: `SBX1 ‖ algorithm ‖ nonce ‖ ciphertext‖tag`.
//! Legacy payloads carry no header: `nonce ‖ ciphertext‖tag` under
//! XChaCha20-Poly1305.

use std::{fmt, str::FromStr};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::{CodecError, Result},
    keys::{random_bytes, KEY_SIZE},
};

/// Format marker prefixed to every payload this crate seals.
pub const MAGIC: &[u8; 4] = b"SBX1";

/// Authentication tag size of both supported ciphers.
pub const TAG_SIZE: usize = 16;

const HEADER_LEN: usize = MAGIC.len() + 1;

/// AEAD cipher used for a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl Algorithm {
    pub const fn nonce_len(self) -> usize {
        match self {
            Algorithm::XChaCha20Poly1305 => 24,
            Algorithm::Aes256Gcm => 12,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::XChaCha20Poly1305 => "xchacha20-poly1305",
            Algorithm::Aes256Gcm => "aes-256-gcm",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Algorithm::XChaCha20Poly1305 => 0x01,
            Algorithm::Aes256Gcm => 0x02,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Algorithm::XChaCha20Poly1305),
            0x02 => Some(Algorithm::Aes256Gcm),
            _ => None,
        }
    }

    const fn min_body_len(self) -> usize {
        self.nonce_len() + TAG_SIZE
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "xchacha20-poly1305" | "xchacha" => Ok(Algorithm::XChaCha20Poly1305),
            "aes-256-gcm" | "aes" => Ok(Algorithm::Aes256Gcm),
            other => Err(CodecError::Decode {
                reason: format!("unknown algorithm: {other}"),
            }),
        }
    }
}

/// A payload split into its parts, borrowing the decoded buffer.
#[derive(Debug)]
pub(crate) struct Envelope<'a> {
    algorithm: Algorithm,
    nonce: &'a [u8],
    ciphertext: &'a [u8],
}

impl<'a> Envelope<'a> {
    pub(crate) fn parse(payload: &'a [u8]) -> Result<Self> {
        let (algorithm, body) = match payload.strip_prefix(MAGIC.as_slice()) {
            Some(rest) => {
                let Some((&tag, body)) = rest.split_first() else {
                    return Err(CodecError::PayloadTooShort {
                        len: payload.len(),
                        min: HEADER_LEN + Algorithm::default().min_body_len(),
                    });
                };
                let algorithm = Algorithm::from_tag(tag).ok_or_else(|| CodecError::Decode {
                    reason: format!("unsupported envelope algorithm tag {tag:#04x}"),
                })?;
                (algorithm, body)
            }
            None => (Algorithm::XChaCha20Poly1305, payload),
        };

        let min = algorithm.min_body_len();
        if body.len() < min {
            return Err(CodecError::PayloadTooShort {
                len: body.len(),
                min,
            });
        }

        let (nonce, ciphertext) = body.split_at(algorithm.nonce_len());
        Ok(Self {
            algorithm,
            nonce,
            ciphertext,
        })
    }

    pub(crate) fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn open(&self, key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let opened = match self.algorithm {
            Algorithm::XChaCha20Poly1305 => XChaCha20Poly1305::new_from_slice(key)
                .map_err(invalid_key)?
                .decrypt(XNonce::from_slice(self.nonce), self.ciphertext),
            Algorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(invalid_key)?
                .decrypt(Nonce::from_slice(self.nonce), self.ciphertext),
        };
        opened
            .map(Zeroizing::new)
            .map_err(|_| CodecError::AuthenticationFailure)
    }
}

/// Seals `plaintext` under a fresh random nonce and prefixes the header.
pub(crate) fn seal(algorithm: Algorithm, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = random_bytes(algorithm.nonce_len())?;
    let sealed = match algorithm {
        Algorithm::XChaCha20Poly1305 => XChaCha20Poly1305::new_from_slice(key)
            .map_err(invalid_key)?
            .encrypt(XNonce::from_slice(&nonce), plaintext),
        Algorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(invalid_key)?
            .encrypt(Nonce::from_slice(&nonce), plaintext),
    }
    .map_err(|err| CodecError::Encode {
        reason: format!("seal failed: {err}"),
    })?;

    let mut payload = Vec::with_capacity(HEADER_LEN + nonce.len() + sealed.len());
    payload.extend_from_slice(MAGIC);
    payload.push(algorithm.tag());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&sealed);
    Ok(payload)
}

/// True when `payload` starts with a known header and has room for nonce and tag.
pub(crate) fn is_tagged(payload: &[u8]) -> bool {
    payload
        .strip_prefix(MAGIC.as_slice())
        .and_then(<[u8]>::split_first)
        .and_then(|(&tag, body)| {
            Algorithm::from_tag(tag).map(|algorithm| body.len() >= algorithm.min_body_len())
        })
        .unwrap_or(false)
}

/// Shape-only check for headerless payloads: long enough to hold a
/// key-sized prefix followed by a nonce, and a cipher accepts that prefix.
/// Random blobs of the right length pass too; treat the answer as a hint.
pub(crate) fn looks_like_legacy(payload: &[u8]) -> bool {
    let nonce_len = Algorithm::XChaCha20Poly1305.nonce_len();
    if payload.len() < nonce_len || payload.len() < TAG_SIZE + 1 {
        return false;
    }
    match payload.split_at_checked(KEY_SIZE) {
        Some((prefix, rest)) => {
            rest.len() >= nonce_len && XChaCha20Poly1305::new_from_slice(prefix).is_ok()
        }
        None => false,
    }
}

fn invalid_key(err: impl fmt::Display) -> CodecError {
    CodecError::InvalidKey {
        reason: err.to_string(),
    }
}
