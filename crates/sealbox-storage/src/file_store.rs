use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sealbox_codec::{Codec, CodecError};
use sealbox_core::{SecretIdentity, SecretStore, SecretStoreError};
use tracing::{debug, error, instrument, warn};
use zeroize::Zeroizing;

use crate::{
    key_provider::{FileKeyProvider, KeyProvider, MasterKey, MasterKeySource},
    persist::{create_private_dir, write_private, PathLock},
    settings::{resolve_secrets_dir, StoreSettings},
};

/// Encrypted file-backed store implementing the shared `SecretStore` contract.
///
/// One secret per identity, kept at `{dir}/{service}_{name}.secret` as the
/// Base64 payload produced by [`Codec::seal`]. The cipher key is the SHA-256
/// of the master key, resolved once at construction.
pub struct FileSecretStore {
    dir: PathBuf,
    identity: SecretIdentity,
    master_key: MasterKey,
    codec: Codec,
}

impl FileSecretStore {
    /// Builds a store from environment-style settings. Never fails.
    ///
    /// An unusable directory falls back to the temp-dir location and an
    /// unusable master key to an ephemeral one; both are logged.
    #[instrument(skip_all, fields(identity = %identity))]
    pub fn bootstrap(identity: SecretIdentity, settings: &StoreSettings) -> Self {
        let dir = resolve_secrets_dir(settings.secrets_dir.as_deref());
        let provider = FileKeyProvider::new(&dir).with_explicit_key(settings.master_key.clone());
        let master_key = provider.resolve().unwrap_or_else(|err| {
            error!(
                %err,
                "master key unavailable; secrets stored by this process will not be readable after it exits"
            );
            MasterKey::ephemeral().unwrap_or_else(|err| {
                error!(%err, "OS random source failed; seeding ephemeral key from the thread RNG");
                MasterKey::ephemeral_from_thread_rng()
            })
        });
        debug!(dir = %dir.display(), source = ?master_key.source(), "secret store ready");

        Self {
            dir,
            identity,
            master_key,
            codec: Codec::default(),
        }
    }

    /// Strict constructor: the directory must be creatable and the provider must succeed.
    pub fn open(
        identity: SecretIdentity,
        dir: impl Into<PathBuf>,
        provider: &dyn KeyProvider,
    ) -> Result<Self, SecretStoreError> {
        let dir = dir.into();
        create_private_dir(&dir).map_err(io_error(&dir))?;
        let master_key = provider.resolve().map_err(|err| SecretStoreError::Io {
            path: dir.display().to_string(),
            reason: format!("key provider: {err}"),
        })?;

        Ok(Self {
            dir,
            identity,
            master_key,
            codec: Codec::default(),
        })
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn secret_path(&self) -> PathBuf {
        self.dir.join(self.identity.file_name())
    }

    pub fn exists(&self) -> bool {
        self.secret_path().is_file()
    }

    pub fn master_key_source(&self) -> &MasterKeySource {
        self.master_key.source()
    }
}

impl SecretStore for FileSecretStore {
    fn identity(&self) -> &SecretIdentity {
        &self.identity
    }

    #[instrument(skip_all, fields(identity = %self.identity))]
    fn store_password(&self, secret: &str) -> Result<(), SecretStoreError> {
        if secret.is_empty() {
            return Err(SecretStoreError::EmptyInput);
        }

        let key = self.master_key.derive_cipher_key();
        let payload = self
            .codec
            .seal(secret.as_bytes(), key.as_bytes())
            .map_err(SecretStoreError::Encryption)?;

        let path = self.secret_path();
        let _lock = PathLock::exclusive(&path).map_err(io_error(&path))?;
        write_private(&path, payload.as_bytes()).map_err(io_error(&path))?;
        debug!(path = %path.display(), "secret stored");
        Ok(())
    }

    #[instrument(skip_all, fields(identity = %self.identity))]
    fn retrieve_password(&self) -> Result<Zeroizing<String>, SecretStoreError> {
        let path = self.secret_path();
        if !path.exists() {
            return Err(not_found(&path));
        }

        let payload = {
            let _lock = PathLock::shared(&path).map_err(io_error(&path))?;
            read_payload(&path)?
        };

        let key = self.master_key.derive_cipher_key();
        let opened = self
            .codec
            .decrypt(payload.as_bytes(), key.as_bytes())
            .inspect_err(|err| {
                if *err == CodecError::AuthenticationFailure {
                    warn!(path = %path.display(), "stored secret failed authentication");
                }
            })
            .map_err(SecretStoreError::Decryption)?;

        String::from_utf8(opened.plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|err| {
                SecretStoreError::Decryption(CodecError::Decode {
                    reason: format!("secret is not valid UTF-8: {err}"),
                })
            })
    }

    #[instrument(skip_all, fields(identity = %self.identity))]
    fn delete_password(&self) -> Result<(), SecretStoreError> {
        let path = self.secret_path();
        if !path.exists() {
            return Ok(());
        }

        let _lock = PathLock::exclusive(&path).map_err(io_error(&path))?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "secret deleted");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&path)(err)),
        }
    }
}

fn read_payload(path: &Path) -> Result<Zeroizing<String>, SecretStoreError> {
    fs::read_to_string(path)
        .map(Zeroizing::new)
        .map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                not_found(path)
            } else {
                io_error(path)(err)
            }
        })
}

fn not_found(path: &Path) -> SecretStoreError {
    SecretStoreError::NotFound {
        path: path.display().to_string(),
    }
}

fn io_error(path: &Path) -> impl Fn(io::Error) -> SecretStoreError + '_ {
    move |err| SecretStoreError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
