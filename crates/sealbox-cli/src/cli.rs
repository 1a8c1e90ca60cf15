use clap::{Args, Parser, Subcommand};
use sealbox_codec::KEY_SIZE;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "sealbox",
    about = "Encrypted local secret storage",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Encrypt and persist a secret. Reads it from stdin when --value is omitted.
    Store {
        #[command(flatten)]
        target: SecretTarget,
        #[arg(long)]
        value: Option<String>,
    },
    /// Print a stored secret.
    Retrieve {
        #[command(flatten)]
        target: SecretTarget,
    },
    /// Remove a stored secret (no error if absent).
    Delete {
        #[command(flatten)]
        target: SecretTarget,
    },
    /// Encrypt data with a caller-supplied key and print the Base64 payload.
    Encrypt {
        #[arg(long)]
        key: String,
        data: String,
    },
    /// Decrypt a Base64 payload with a caller-supplied key.
    Decrypt {
        #[arg(long)]
        key: String,
        data: String,
    },
    /// Generate a random key.
    Keygen {
        #[arg(long, default_value_t = KEY_SIZE)]
        length: usize,
    },
    /// List Base64 tokens found in free text.
    Detect {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Run a health check against the codec and the secret store.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

/// Which secret a command addresses.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SecretTarget {
    #[arg(long)]
    pub service: String,
    #[arg(long)]
    pub name: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> SecretTarget {
        SecretTarget {
            service: "billing".into(),
            name: "db".into(),
        }
    }

    #[test]
    fn parses_store_with_value() {
        let cli = Cli::try_parse_from([
            "sealbox", "store", "--service", "billing", "--name", "db", "--value", "pw",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Store {
                target: target(),
                value: Some("pw".into()),
            }
        );
    }

    #[test]
    fn store_value_is_optional() {
        let cli = Cli::try_parse_from(["sealbox", "store", "--service", "billing", "--name", "db"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Store {
                target: target(),
                value: None,
            }
        );
    }

    #[test]
    fn retrieve_requires_both_labels() {
        assert!(Cli::try_parse_from(["sealbox", "retrieve", "--service", "billing"]).is_err());
    }

    #[test]
    fn parses_encrypt() {
        let cli = Cli::try_parse_from(["sealbox", "encrypt", "--key", "k", "hello"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Encrypt {
                key: "k".into(),
                data: "hello".into(),
            }
        );
    }

    #[test]
    fn keygen_defaults_to_key_size() {
        let cli = Cli::try_parse_from(["sealbox", "keygen"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Keygen { length: KEY_SIZE });
    }

    #[test]
    fn detect_collects_words() {
        let cli = Cli::try_parse_from(["sealbox", "detect", "token", "is", "here"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Detect {
                text: vec!["token".into(), "is".into(), "here".into()],
            }
        );
        assert!(Cli::try_parse_from(["sealbox", "detect"]).is_err());
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["sealbox", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Health);
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["sealbox", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }
}
