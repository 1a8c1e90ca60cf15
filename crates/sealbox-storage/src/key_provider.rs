use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use sealbox_codec::{keys::random_bytes, KEY_SIZE};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};
use zeroize::{Zeroize, Zeroizing};

use crate::{
    persist::{write_private, PathLock},
    settings::{MASTER_KEY_ENV, MASTER_KEY_FILE},
};

/// Where a [`MasterKey`] came from. Used for logging and diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterKeySource {
    Environment,
    KeyFile(PathBuf),
    /// Freshly generated and persisted at this path.
    Generated(PathBuf),
    Keyring,
    /// Process-local; secrets sealed with it do not survive a restart.
    Ephemeral,
}

/// 256-bit master key. Zeroed on drop and never printed.
#[derive(Clone)]
pub struct MasterKey {
    bytes: Zeroizing<Vec<u8>>,
    source: MasterKeySource,
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

impl MasterKey {
    /// Fresh key from the OS random source.
    pub fn generate(source: MasterKeySource) -> Result<Self, KeyError> {
        let bytes = random_bytes(KEY_SIZE).map_err(|err| KeyError::Generation(err.to_string()))?;
        Ok(Self {
            bytes: Zeroizing::new(bytes),
            source,
        })
    }

    /// Process-local key from the OS random source.
    pub fn ephemeral() -> Result<Self, KeyError> {
        Self::generate(MasterKeySource::Ephemeral)
    }

    /// Last resort when the OS random source itself fails: the thread RNG
    /// keeps producing bytes from its existing seed.
    pub(crate) fn ephemeral_from_thread_rng() -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            bytes,
            source: MasterKeySource::Ephemeral,
        }
    }

    /// Accepts standard or URL-safe Base64 of 32 bytes, or 32 raw characters.
    pub fn parse(text: &str, source: MasterKeySource) -> Result<Self, KeyError> {
        let trimmed = text.trim();
        let decoded = general_purpose::STANDARD
            .decode(trimmed)
            .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
            .ok()
            .map(Zeroizing::new);

        let bytes = match decoded {
            Some(bytes) if bytes.len() == KEY_SIZE => bytes,
            _ if trimmed.len() == KEY_SIZE => Zeroizing::new(trimmed.as_bytes().to_vec()),
            Some(bytes) => {
                return Err(KeyError::Decode(format!(
                    "expected {KEY_SIZE} bytes, got {}",
                    bytes.len()
                )))
            }
            None => {
                return Err(KeyError::Decode(format!(
                    "expected Base64 of {KEY_SIZE} bytes or {KEY_SIZE} raw characters"
                )))
            }
        };
        Ok(Self { bytes, source })
    }

    pub fn source(&self) -> &MasterKeySource {
        &self.source
    }

    /// Standard Base64 text, the on-disk and keyring representation.
    pub fn encode(&self) -> Zeroizing<String> {
        Zeroizing::new(general_purpose::STANDARD.encode(self.bytes.as_slice()))
    }

    /// SHA-256 of the master key as Base64 text, ready for the codec.
    pub fn derive_cipher_key(&self) -> Zeroizing<String> {
        let mut digest = Sha256::digest(self.bytes.as_slice());
        let encoded = Zeroizing::new(general_purpose::STANDARD.encode(digest.as_slice()));
        digest.as_mut_slice().zeroize();
        encoded
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("key file {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Provides the master key (key file or OS keychain in production; memory in tests).
pub trait KeyProvider: Send + Sync {
    fn resolve(&self) -> Result<MasterKey, KeyError>;
}

/// Key kept as `master.key` inside the secrets directory.
///
/// An explicit value (normally from [`MASTER_KEY_ENV`]) wins when it parses;
/// otherwise the key file is read, or generated under an exclusive lock so
/// concurrent first runs agree on a single key.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    dir: PathBuf,
    explicit: Option<Zeroizing<String>>,
}

impl FileKeyProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            explicit: None,
        }
    }

    /// Key text, or a path to a file containing it.
    pub fn with_explicit_key(mut self, value: Option<Zeroizing<String>>) -> Self {
        self.explicit = value;
        self
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(MASTER_KEY_FILE)
    }

    fn from_explicit(&self, value: &str) -> Result<MasterKey, KeyError> {
        let candidate = Path::new(value.trim());
        if candidate.is_file() {
            let contents = Zeroizing::new(fs::read_to_string(candidate).map_err(io_err(candidate))?);
            return MasterKey::parse(&contents, MasterKeySource::Environment);
        }
        MasterKey::parse(value, MasterKeySource::Environment)
    }

    fn load_or_generate(&self) -> Result<MasterKey, KeyError> {
        let path = self.key_path();
        let _lock = PathLock::exclusive(&path).map_err(io_err(&path))?;

        // Re-read under the lock: another process may have won the race.
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let contents = Zeroizing::new(contents);
                debug!(path = %path.display(), "loaded master key");
                return MasterKey::parse(&contents, MasterKeySource::KeyFile(path.clone()));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(&path)(err)),
        }

        let key = MasterKey::generate(MasterKeySource::Generated(path.clone()))?;
        write_private(&path, key.encode().as_bytes()).map_err(io_err(&path))?;
        info!(path = %path.display(), "generated new master key");
        Ok(key)
    }
}

impl KeyProvider for FileKeyProvider {
    fn resolve(&self) -> Result<MasterKey, KeyError> {
        if let Some(value) = &self.explicit {
            match self.from_explicit(value) {
                Ok(key) => {
                    debug!("using master key from {MASTER_KEY_ENV}");
                    return Ok(key);
                }
                Err(err) => error!(%err, "ignoring {MASTER_KEY_ENV}, using the key file instead"),
            }
        }
        self.load_or_generate()
    }
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the key.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl KeyringProvider {
    /// Reads `key` back through a fresh entry. Backends that keep nothing
    /// beyond the entry object (such as the mock store) fail here instead of
    /// silently handing out a new key on every run.
    fn verify_persisted(&self, key: &MasterKey) -> Result<(), KeyError> {
        let not_persisted = |reason: String| {
            KeyError::Keyring(format!(
                "master key for {}/{} was not persisted: {reason}",
                self.service, self.account
            ))
        };

        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| not_persisted(e.to_string()))?;
        let stored = Zeroizing::new(entry.get_password().map_err(|e| not_persisted(e.to_string()))?);
        if stored.as_str() != key.encode().as_str() {
            return Err(not_persisted("read-back does not match".to_string()));
        }
        Ok(())
    }
}

impl KeyProvider for KeyringProvider {
    fn resolve(&self) -> Result<MasterKey, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;

        match entry.get_password() {
            Ok(secret) => MasterKey::parse(&Zeroizing::new(secret), MasterKeySource::Keyring),
            Err(keyring::Error::NoEntry) => {
                let key = MasterKey::generate(MasterKeySource::Keyring)?;
                entry
                    .set_password(&key.encode())
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                self.verify_persisted(&key)?;
                info!(service = %self.service, "stored new master key in keyring");
                Ok(key)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<MasterKey>>>,
}

impl InMemoryKeyProvider {
    /// Provider that always hands out `key`.
    pub fn with_key(key: MasterKey) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(key))),
        }
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn resolve(&self) -> Result<MasterKey, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let key = MasterKey::generate(MasterKeySource::Ephemeral)?;
        *guard = Some(key.clone());
        Ok(key)
    }
}

fn io_err(path: &Path) -> impl Fn(io::Error) -> KeyError + '_ {
    move |err| KeyError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW_KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn memory_provider_returns_same_key() {
        let provider = InMemoryKeyProvider::default();
        let first = provider.resolve().unwrap();
        let second = provider.resolve().unwrap();

        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.source(), &MasterKeySource::Ephemeral);
    }

    #[test]
    fn ephemeral_keys_are_distinct() {
        let first = MasterKey::ephemeral().unwrap();
        let second = MasterKey::ephemeral().unwrap();
        assert_eq!(first.source(), &MasterKeySource::Ephemeral);
        assert_ne!(first.bytes, second.bytes);
        assert_eq!(
            MasterKey::ephemeral_from_thread_rng().source(),
            &MasterKeySource::Ephemeral
        );
    }

    #[test]
    fn keyring_without_persistence_is_an_error() {
        // Mock entries keep their password only on the entry object itself.
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let provider = KeyringProvider::new("sealbox-test", "master-key");
        let err = provider.resolve().expect_err("mock keyring must not pass read-back");
        match err {
            KeyError::Keyring(reason) => assert!(reason.contains("not persisted"), "{reason}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = MasterKey::parse("abcd", MasterKeySource::Environment)
            .expect_err("should reject wrong length");
        assert!(matches!(err, KeyError::Decode(_)));
    }

    #[test]
    fn parse_accepts_base64_and_raw() {
        let generated = MasterKey::generate(MasterKeySource::Ephemeral).unwrap();
        let parsed = MasterKey::parse(&generated.encode(), MasterKeySource::Keyring).unwrap();
        assert_eq!(parsed.bytes, generated.bytes);

        let raw = MasterKey::parse(RAW_KEY, MasterKeySource::Environment).unwrap();
        assert_eq!(raw.bytes.as_slice(), RAW_KEY.as_bytes());
    }

    #[test]
    fn derived_key_is_stable_and_distinct_from_master() {
        let key = MasterKey::parse(RAW_KEY, MasterKeySource::Environment).unwrap();
        let derived = key.derive_cipher_key();
        assert_eq!(derived, key.derive_cipher_key());
        assert_ne!(derived.as_str(), key.encode().as_str());
        let bytes = general_purpose::STANDARD.decode(derived.as_bytes()).unwrap();
        assert_eq!(bytes.len(), KEY_SIZE);
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let key = MasterKey::parse(RAW_KEY, MasterKeySource::Environment).unwrap();
        let printed = format!("{key:?}");
        assert!(!printed.contains(RAW_KEY));
        assert!(printed.contains("REDACTED"));
    }

    #[test]
    fn file_provider_generates_once_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path());

        let first = provider.resolve().unwrap();
        assert!(matches!(first.source(), MasterKeySource::Generated(_)));
        assert!(provider.key_path().is_file());

        let second = provider.resolve().unwrap();
        assert!(matches!(second.source(), MasterKeySource::KeyFile(_)));
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn explicit_key_wins_and_skips_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path())
            .with_explicit_key(Some(Zeroizing::new(RAW_KEY.to_string())));
        let key = provider.resolve().unwrap();
        assert_eq!(key.source(), &MasterKeySource::Environment);
        assert!(!provider.key_path().exists());
    }

    #[test]
    fn explicit_value_may_be_a_path() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("external.key");
        fs::write(&key_file, format!("{RAW_KEY}\n")).unwrap();

        let provider = FileKeyProvider::new(dir.path()).with_explicit_key(Some(Zeroizing::new(
            key_file.display().to_string(),
        )));
        let key = provider.resolve().unwrap();
        assert_eq!(key.bytes.as_slice(), RAW_KEY.as_bytes());
    }

    #[test]
    fn invalid_explicit_key_falls_back_to_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path())
            .with_explicit_key(Some(Zeroizing::new("too-short".to_string())));
        let key = provider.resolve().unwrap();
        assert!(matches!(key.source(), MasterKeySource::Generated(_)));
    }

    #[test]
    fn corrupt_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path());
        fs::write(provider.key_path(), "not a key").unwrap();
        assert!(matches!(provider.resolve(), Err(KeyError::Decode(_))));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path().join("absent"));
        assert!(matches!(provider.resolve(), Err(KeyError::Io { .. })));
    }
}
