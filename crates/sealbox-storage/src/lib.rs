//! File-backed secret storage with encryption at rest.
//! Master keys come from the environment, a key file, or the OS keyring (or test doubles).

pub mod file_store;
pub mod key_provider;
mod persist;
pub mod settings;

pub use file_store::FileSecretStore;
pub use key_provider::{
    FileKeyProvider, InMemoryKeyProvider, KeyError, KeyProvider, KeyringProvider, MasterKey,
    MasterKeySource,
};
pub use settings::StoreSettings;
