mod cli;
mod config;
mod storage;

use std::io::{self, BufRead};

use crate::cli::{Command, ConfigCommand, SecretTarget};
use clap::Parser;
use color_eyre::{eyre::bail, Result};
use sealbox_codec::{detect_base64_in_string, generate_key, generate_key_with_length, Codec};
use sealbox_core::{SecretIdentity, SecretStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Store { target, value } => run_store(&config, target, value)?,
        Command::Retrieve { target } => {
            let store = storage::store_from_config(&config, identity(target))?;
            println!("{}", store.retrieve_password()?.as_str());
        }
        Command::Delete { target } => {
            let store = storage::store_from_config(&config, identity(target))?;
            store.delete_password()?;
            println!("Deleted {}", store.identity());
        }
        Command::Encrypt { key, data } => {
            println!("{}", encrypt_text(&Codec::new(config.codec), &data, &key)?);
        }
        Command::Decrypt { key, data } => {
            println!("{}", decrypt_text(&Codec::new(config.codec), &data, &key)?.as_str());
        }
        Command::Keygen { length } => {
            let key = generate_key_with_length(length)?;
            println!("{}", String::from_utf8_lossy(&key));
        }
        Command::Detect { text } => {
            for token in detect_base64_in_string(&text.join(" ")) {
                println!("{token}");
            }
        }
        Command::Health => run_health_check(&config)?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr so
    // stdout stays clean for secrets and payloads.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("sealbox {}", env!("CARGO_PKG_VERSION"));
}

fn identity(target: SecretTarget) -> SecretIdentity {
    SecretIdentity::new(target.service, target.name)
}

fn run_store(config: &config::Config, target: SecretTarget, value: Option<String>) -> Result<()> {
    let secret = match value {
        Some(value) => Zeroizing::new(value),
        None => read_secret_line(io::stdin().lock())?,
    };
    let store = storage::store_from_config(config, identity(target))?;
    store.store_password(&secret)?;
    println!("Stored {}", store.identity());
    Ok(())
}

/// First line of `reader`, without the line terminator.
fn read_secret_line(mut reader: impl BufRead) -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    reader.read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    if line.is_empty() {
        bail!("no secret given on stdin");
    }
    Ok(line)
}

/// Seals `data` byte for byte, so `decrypt_text` gives back exactly what was typed.
fn encrypt_text(codec: &Codec, data: &str, key: &str) -> Result<String> {
    Ok(codec.seal(data.as_bytes(), key.as_bytes())?)
}

/// Plaintext as UTF-8 when it is text, otherwise its Base64 form.
fn decrypt_text(codec: &Codec, data: &str, key: &str) -> Result<Zeroizing<String>> {
    let opened = codec.decrypt(data.as_bytes(), key.as_bytes())?;
    Ok(match std::str::from_utf8(&opened.plaintext) {
        Ok(text) => Zeroizing::new(text.to_owned()),
        Err(_) => opened.encoded.clone(),
    })
}

/// Runs a quick health check of the codec and the encrypted storage path.
fn run_health_check(config: &config::Config) -> Result<()> {
    run_codec_health(&Codec::new(config.codec))?;
    println!("Codec: ok");
    let identity = SecretIdentity::new("sealbox", "health-check");
    let store = storage::store_from_config(config, identity)?;
    run_store_health(&store)?;
    println!("Storage: ok ({})", store.dir().display());
    Ok(())
}

fn run_codec_health(codec: &Codec) -> Result<()> {
    let key = generate_key()?;
    let sealed = codec.encrypt(b"health check", &key)?;
    let opened = codec.decrypt(sealed.ciphertext.as_bytes(), &key)?;
    let sealed_ok = codec.is_encrypted(sealed.ciphertext.as_bytes());
    if !sealed_ok || opened.plaintext.as_slice() != b"health check" {
        bail!("codec round-trip failed");
    }
    Ok(())
}

fn run_store_health(store: &dyn SecretStore) -> Result<()> {
    let payload = "ok";
    store.store_password(payload)?;
    let round_trip = store.retrieve_password()?;
    store.delete_password()?;

    if round_trip.as_str() != payload {
        bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
