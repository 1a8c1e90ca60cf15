use color_eyre::{eyre::WrapErr, Result};
use sealbox_codec::Codec;
use sealbox_core::SecretIdentity;
use sealbox_storage::{
    settings::resolve_secrets_dir, FileSecretStore, KeyringProvider, StoreSettings,
};
use tracing::debug;

use crate::config::{Config, KeySource};

const KEYRING_SERVICE: &str = "sealbox";
const KEYRING_ACCOUNT: &str = "master-key";

/// Build a store for `identity`; environment variables override the config file.
pub fn store_from_config(config: &Config, identity: SecretIdentity) -> Result<FileSecretStore> {
    let settings = StoreSettings::from_env().or(config.store_settings());
    store_from_settings(config, identity, &settings)
}

fn store_from_settings(
    config: &Config,
    identity: SecretIdentity,
    settings: &StoreSettings,
) -> Result<FileSecretStore> {
    let codec = Codec::new(config.codec);
    // An explicit master key always takes the key-file path.
    if config.key_source == KeySource::File || settings.master_key.is_some() {
        return Ok(FileSecretStore::bootstrap(identity, settings).with_codec(codec));
    }

    let dir = resolve_secrets_dir(settings.secrets_dir.as_deref());
    debug!(dir = %dir.display(), "initializing encrypted store (keyring key)");
    let provider = KeyringProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT);
    let store = FileSecretStore::open(identity, dir, &provider)
        .wrap_err("opening keyring-backed secret store")?;
    Ok(store.with_codec(codec))
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_store(dir: &std::path::Path, identity: SecretIdentity) -> FileSecretStore {
    FileSecretStore::open(
        identity,
        dir,
        &sealbox_storage::InMemoryKeyProvider::default(),
    )
    .expect("test store")
}
