//! Core contracts for sealbox: secret identities and the secret store interface.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod identity;
pub mod storage;

pub use identity::{OwnerTag, SecretIdentity};
pub use storage::{InMemorySecretStore, SecretStore, SecretStoreError};
