use std::sync::{Arc, Mutex};

use sealbox_codec::CodecError;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::identity::SecretIdentity;

/// Errors produced by secret store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    /// Refused to store an empty secret.
    #[error("secret cannot be empty")]
    EmptyInput,
    /// Nothing has been stored for this identity.
    #[error("no secret stored at {path}")]
    NotFound { path: String },
    /// Underlying file-system failure.
    #[error("i/o failure on {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("encryption failed: {0}")]
    Encryption(#[source] CodecError),
    /// Includes authentication failures (wrong key or tampered file).
    #[error("decryption failed: {0}")]
    Decryption(#[source] CodecError),
}

impl SecretStoreError {
    /// True when the stored payload failed authentication.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            SecretStoreError::Decryption(CodecError::AuthenticationFailure)
        )
    }
}

/// A store bound to a single [`SecretIdentity`].
pub trait SecretStore: Send + Sync {
    fn identity(&self) -> &SecretIdentity;

    /// Encrypt and persist `secret`, replacing any previous value.
    fn store_password(&self, secret: &str) -> Result<(), SecretStoreError>;

    /// Read back the secret; [`SecretStoreError::NotFound`] if none was stored.
    fn retrieve_password(&self) -> Result<Zeroizing<String>, SecretStoreError>;

    /// Remove the secret (idempotent).
    fn delete_password(&self) -> Result<(), SecretStoreError>;
}

/// In-memory store that simulates encryption for tests and smoke runs.
/// Not cryptographically secure.
#[derive(Debug, Clone)]
pub struct InMemorySecretStore {
    identity: SecretIdentity,
    inner: Arc<Mutex<Option<Zeroizing<Vec<u8>>>>>,
}

impl InMemorySecretStore {
    pub fn new(identity: SecretIdentity) -> Self {
        Self {
            identity,
            inner: Arc::default(),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<Zeroizing<Vec<u8>>>>, SecretStoreError> {
        self.inner.lock().map_err(|err| SecretStoreError::Io {
            path: self.identity.file_name(),
            reason: format!("lock poisoned: {err}"),
        })
    }
}

impl SecretStore for InMemorySecretStore {
    fn identity(&self) -> &SecretIdentity {
        &self.identity
    }

    fn store_password(&self, secret: &str) -> Result<(), SecretStoreError> {
        if secret.is_empty() {
            return Err(SecretStoreError::EmptyInput);
        }
        // XOR keeps plaintext out of the map in tests.
        *self.lock()? = Some(Zeroizing::new(mask(secret.as_bytes())));
        Ok(())
    }

    fn retrieve_password(&self) -> Result<Zeroizing<String>, SecretStoreError> {
        let guard = self.lock()?;
        let masked = guard.as_ref().ok_or_else(|| SecretStoreError::NotFound {
            path: self.identity.file_name(),
        })?;
        String::from_utf8(mask(masked))
            .map(Zeroizing::new)
            .map_err(|err| {
                SecretStoreError::Decryption(CodecError::Decode {
                    reason: err.to_string(),
                })
            })
    }

    fn delete_password(&self) -> Result<(), SecretStoreError> {
        *self.lock()? = None;
        Ok(())
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}
