use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::{
    encoding::{decode_if_encoded, encode_base64, encode_if_decoded},
    envelope::{self, is_tagged, looks_like_legacy, Algorithm, Envelope},
    error::{CodecError, Result},
    keys::cipher_key,
};

/// Marker identifying plaintext key material (PEM blocks) that must never be unsealed.
const PLAINTEXT_MARKER: &[u8] = b"BEGIN ";

/// Codec settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Cipher used for newly sealed payloads. Decryption follows the payload header.
    pub algorithm: Algorithm,
    /// Also treat headerless buffers of ciphertext shape as already encrypted.
    pub legacy_detection: bool,
}

/// Result of [`Codec::encrypt`].
pub struct Sealed {
    /// Bytes that were actually sealed (after Base64 decoding, if any).
    pub plaintext: Zeroizing<Vec<u8>>,
    /// Base64 payload.
    pub ciphertext: String,
}

/// Result of [`Codec::decrypt`].
pub struct Opened {
    pub plaintext: Zeroizing<Vec<u8>>,
    /// `plaintext` as Base64, or unchanged when it already was a Base64 token.
    pub encoded: Zeroizing<String>,
}

impl fmt::Debug for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealed")
            .field("plaintext", &"[REDACTED]")
            .field("ciphertext", &self.ciphertext)
            .finish()
    }
}

impl fmt::Debug for Opened {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opened")
            .field("plaintext", &"[REDACTED]")
            .field("encoded", &"[REDACTED]")
            .finish()
    }
}

/// Authenticated encryption of byte buffers with Base64 handling on both sides.
///
/// Holds configuration only; every call builds its cipher from the key it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Encrypts `data` with `key`, returning the sealed bytes and the Base64 payload.
    ///
    /// Already-encrypted input is returned as is, so layering callers never
    /// double-wrap. A Base64 token is decoded before sealing, so text that
    /// merely looks like Base64 comes back from [`Codec::decrypt`] as the
    /// decoded bytes in [`Opened::plaintext`], with the original text only in
    /// [`Opened::encoded`]. Use [`Codec::seal`] when the exact bytes matter.
    pub fn encrypt(&self, data: &[u8], key: &[u8]) -> Result<Sealed> {
        if data.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        if self.is_encrypted(data) {
            debug!("input is already sealed; skipping encryption");
            return Ok(Sealed {
                plaintext: Zeroizing::new(data.to_vec()),
                ciphertext: encode_if_decoded(data.trim_ascii())?,
            });
        }

        let plaintext = Zeroizing::new(decode_if_encoded(data).into_owned());
        let ciphertext = self.seal(&plaintext, key)?;
        Ok(Sealed {
            plaintext,
            ciphertext,
        })
    }

    /// Seals `plaintext` exactly as given, without any Base64 sniffing.
    pub fn seal(&self, plaintext: &[u8], key: &[u8]) -> Result<String> {
        if plaintext.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let key = cipher_key(key)?;
        let payload = envelope::seal(self.config.algorithm, &key, plaintext)?;
        Ok(encode_base64(&payload))
    }

    /// Decrypts a Base64 (or raw) payload.
    ///
    /// Buffers carrying a PEM-style `BEGIN ` marker are plaintext and come
    /// back unchanged. If the first open fails and the decoded payload is
    /// itself a Base64 token (double-wrapped by an upstream layer), one more
    /// attempt is made on the payload decoded once more; there is no further
    /// retry.
    pub fn decrypt(&self, encrypted: &[u8], key: &[u8]) -> Result<Opened> {
        let trimmed = encrypted.trim_ascii();
        if trimmed.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let payload = decode_if_encoded(trimmed);
        if contains_plaintext_marker(&payload) {
            debug!("payload is plaintext key material; passing through");
            return pass_through(&payload);
        }

        let key = cipher_key(key)?;
        match open(&payload, &key) {
            Err(CodecError::AuthenticationFailure) => {}
            other => return other,
        }

        let Cow::Owned(resplit) = decode_if_encoded(&payload) else {
            return Err(CodecError::AuthenticationFailure);
        };

        warn!("open failed; retrying once on the double-wrapped payload");
        if contains_plaintext_marker(&resplit) {
            return pass_through(&resplit);
        }

        open(&resplit, &key).inspect_err(|err| {
            if *err == CodecError::AuthenticationFailure {
                warn!("retry on the double-wrapped payload failed; payload rejected");
            }
        })
    }

    /// Whether `data` already looks sealed.
    ///
    /// Decodes the input as is and then once more (upstream layers sometimes
    /// double-wrap). A recognised envelope header decides deterministically;
    /// headerless shapes count only with [`CodecConfig::legacy_detection`].
    pub fn is_encrypted(&self, data: &[u8]) -> bool {
        let trimmed = data.trim_ascii();
        if trimmed.is_empty() {
            return false;
        }

        let once = decode_if_encoded(trimmed);
        let twice = decode_if_encoded(&once);
        let sealed = [&*once, &*twice].into_iter().any(|candidate| {
            is_tagged(candidate) || (self.config.legacy_detection && looks_like_legacy(candidate))
        });
        sealed
    }
}

fn open(payload: &[u8], key: &[u8]) -> Result<Opened> {
    let plaintext = Envelope::parse(payload)?.open(key)?;
    let encoded = Zeroizing::new(encode_if_decoded(&plaintext)?);
    Ok(Opened { plaintext, encoded })
}

fn pass_through(payload: &[u8]) -> Result<Opened> {
    Ok(Opened {
        plaintext: Zeroizing::new(payload.to_vec()),
        encoded: Zeroizing::new(encode_base64(payload)),
    })
}

fn contains_plaintext_marker(payload: &[u8]) -> bool {
    payload
        .windows(PLAINTEXT_MARKER.len())
        .any(|window| window == PLAINTEXT_MARKER)
}
