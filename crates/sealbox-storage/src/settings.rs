use std::{
    env, fmt,
    path::{Path, PathBuf},
};

use tracing::{error, warn};
use zeroize::Zeroizing;

use crate::persist::create_private_dir;

/// Master key override: Base64 or raw key text, or a path to a file holding it.
pub const MASTER_KEY_ENV: &str = "APP_MASTER_KEY";
/// Secrets directory override.
pub const SECRETS_DIR_ENV: &str = "APP_SECRETS_DIR";
/// Used when the platform reports no per-user data directory.
pub const SYSTEM_SECRETS_DIR: &str = "/var/lib/sealbox/secrets";
pub const MASTER_KEY_FILE: &str = "master.key";

/// Store inputs gathered from the environment or configuration.
#[derive(Clone, Default)]
pub struct StoreSettings {
    pub secrets_dir: Option<PathBuf>,
    pub master_key: Option<Zeroizing<String>>,
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("secrets_dir", &self.secrets_dir)
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StoreSettings {
    /// Read [`SECRETS_DIR_ENV`] and [`MASTER_KEY_ENV`] from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`StoreSettings::from_env`] with an injectable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            secrets_dir: non_empty(SECRETS_DIR_ENV).map(PathBuf::from),
            master_key: non_empty(MASTER_KEY_ENV).map(Zeroizing::new),
        }
    }

    /// Fields left unset here are taken from `fallback`.
    pub fn or(self, fallback: StoreSettings) -> Self {
        Self {
            secrets_dir: self.secrets_dir.or(fallback.secrets_dir),
            master_key: self.master_key.or(fallback.master_key),
        }
    }
}

pub fn default_secrets_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("sealbox").join("secrets"))
        .unwrap_or_else(|| PathBuf::from(SYSTEM_SECRETS_DIR))
}

pub fn fallback_secrets_dir() -> PathBuf {
    env::temp_dir().join("sealbox-secrets")
}

/// Creates the requested (or default) directory, dropping to the temp-dir
/// fallback when that fails. Never errors; later writes surface any problem.
pub fn resolve_secrets_dir(requested: Option<&Path>) -> PathBuf {
    let primary = requested
        .map(Path::to_path_buf)
        .unwrap_or_else(default_secrets_dir);
    match create_private_dir(&primary) {
        Ok(()) => return primary,
        Err(err) => warn!(
            dir = %primary.display(),
            %err,
            "cannot use secrets directory, falling back to temp dir"
        ),
    }

    let fallback = fallback_secrets_dir();
    if let Err(err) = create_private_dir(&fallback) {
        error!(dir = %fallback.display(), %err, "fallback secrets directory unavailable");
    }
    fallback
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_both_variables() {
        let settings = StoreSettings::from_lookup(lookup(&[
            (SECRETS_DIR_ENV, "/srv/secrets"),
            (MASTER_KEY_ENV, "key-material"),
        ]));
        assert_eq!(settings.secrets_dir, Some(PathBuf::from("/srv/secrets")));
        assert_eq!(
            settings.master_key.as_deref().map(String::as_str),
            Some("key-material")
        );
    }

    #[test]
    fn blank_values_are_unset() {
        let settings = StoreSettings::from_lookup(lookup(&[(SECRETS_DIR_ENV, "  ")]));
        assert!(settings.secrets_dir.is_none());
        assert!(settings.master_key.is_none());
    }

    #[test]
    fn environment_wins_over_fallback() {
        let env = StoreSettings::from_lookup(lookup(&[(SECRETS_DIR_ENV, "/from/env")]));
        let config = StoreSettings {
            secrets_dir: Some(PathBuf::from("/from/config")),
            master_key: Some(Zeroizing::new("cfg".into())),
        };
        let merged = env.or(config);
        assert_eq!(merged.secrets_dir, Some(PathBuf::from("/from/env")));
        assert!(merged.master_key.is_some());
    }

    #[test]
    fn debug_hides_master_key() {
        let settings = StoreSettings {
            secrets_dir: None,
            master_key: Some(Zeroizing::new("hunter2".into())),
        };
        let printed = format!("{settings:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn resolve_creates_requested_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wanted = dir.path().join("nested").join("secrets");
        assert_eq!(resolve_secrets_dir(Some(&wanted)), wanted);
        assert!(wanted.is_dir());
    }

    #[test]
    fn resolve_falls_back_when_dir_cannot_be_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("plain-file");
        std::fs::write(&blocker, b"x").expect("write blocker");
        let resolved = resolve_secrets_dir(Some(&blocker.join("secrets")));
        assert_eq!(resolved, fallback_secrets_dir());
    }
}
