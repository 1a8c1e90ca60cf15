use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use sealbox_codec::CodecConfig;
use sealbox_storage::StoreSettings;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/sealbox/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the secrets directory. `APP_SECRETS_DIR` wins over this.
    pub secrets_dir: Option<PathBuf>,
    /// Where the master key lives when `APP_MASTER_KEY` is unset.
    #[serde(default)]
    pub key_source: KeySource,
    #[serde(default)]
    pub codec: CodecConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// `master.key` in the secrets directory.
    #[default]
    File,
    /// OS keychain.
    Keyring,
}

impl Config {
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            secrets_dir: self.secrets_dir.clone(),
            master_key: None,
        }
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("sealbox").join("config.toml"))
}

/// Write `config` to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use sealbox_codec::Algorithm;

    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.key_source, KeySource::File);
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            secrets_dir = "/srv/sealbox"
            key_source = "keyring"
            [codec]
            algorithm = "aes-256-gcm"
            legacy_detection = true
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                secrets_dir: Some(PathBuf::from("/srv/sealbox")),
                key_source: KeySource::Keyring,
                codec: CodecConfig {
                    algorithm: Algorithm::Aes256Gcm,
                    legacy_detection: true,
                },
            }
        );
    }

    #[test]
    fn partial_codec_table_keeps_defaults() {
        let cfg: Config = toml::from_str("[codec]\nlegacy_detection = true\n").expect("parse");
        assert_eq!(cfg.codec.algorithm, Algorithm::XChaCha20Poly1305);
        assert!(cfg.codec.legacy_detection);
    }

    #[test]
    fn rejects_unknown_key_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "key_source = \"vault\"\n").expect("write temp config");
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            secrets_dir: Some(PathBuf::from("/tmp/sealbox-data")),
            ..Config::default()
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config::default();
        let second = write_to_path_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);
        assert_eq!(load_from_path(&path).expect("load"), cfg);
    }

    #[test]
    fn store_settings_carry_secrets_dir_only() {
        let cfg = Config {
            secrets_dir: Some(PathBuf::from("/srv/sealbox")),
            ..Config::default()
        };
        let settings = cfg.store_settings();
        assert_eq!(settings.secrets_dir, Some(PathBuf::from("/srv/sealbox")));
        assert!(settings.master_key.is_none());
    }
}
